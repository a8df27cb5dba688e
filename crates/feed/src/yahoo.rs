use crate::http::{build_client, network, parse, status_error};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use chrono_tz::US::Eastern;
use crush_core::common::HistoryPeriod;
use crush_core::market::entity::{OptionChain, OptionQuote, PriceBar};
use crush_core::market::error::MarketError;
use crush_core::market::port::{OptionsProvider, PriceHistoryProvider};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart/";
const OPTIONS_URL: &str = "https://query2.finance.yahoo.com/v7/finance/options/";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const COOKIE_URL: &str = "https://fc.yahoo.com";

/// # Summary
/// Yahoo Finance 数据源：日线历史行情与期权链。
///
/// # Invariants
/// - 期权接口需要 cookie + crumb，crumb 懒加载并缓存，遇到 401 时刷新一次。
/// - Yahoo 不提供 Delta，期权报价的 `delta` 恒为 None。
pub struct YahooProvider {
    // 开启 cookie 存储的 HTTP 客户端
    client: Client,
    // 缓存的 crumb
    crumb: RwLock<Option<String>>,
}

impl YahooProvider {
    /// # Summary
    /// 创建 YahooProvider。
    ///
    /// # Logic
    /// 1. 配置 10 秒超时与浏览器 Header。
    /// 2. 开启 cookie 存储以支持 crumb 校验。
    pub fn new() -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(10), true)?,
            crumb: RwLock::new(None),
        })
    }

    /// # Summary
    /// 获取 crumb。
    ///
    /// # Logic
    /// 1. 非强制刷新且已有缓存时直接返回。
    /// 2. 访问 fc.yahoo.com 获取会话 cookie（该地址返回 404 属正常）。
    /// 3. 请求 getcrumb 并缓存。
    async fn crumb(&self, refresh: bool) -> Result<String, MarketError> {
        if !refresh {
            if let Some(crumb) = self.crumb.read().await.clone() {
                return Ok(crumb);
            }
        }

        let mut cached = self.crumb.write().await;
        self.client.get(COOKIE_URL).send().await.map_err(network)?;
        let resp = self.client.get(CRUMB_URL).send().await.map_err(network)?;
        if !resp.status().is_success() {
            return Err(MarketError::Network(format!(
                "crumb HTTP {}",
                resp.status()
            )));
        }
        let crumb = resp.text().await.map_err(network)?.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(MarketError::Parse("invalid crumb".to_string()));
        }
        debug!("Yahoo crumb refreshed");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    /// 请求 v7 期权接口，`date` 为空时只取到期日列表与最近一期
    async fn fetch_options(
        &self,
        symbol: &str,
        date: Option<NaiveDate>,
    ) -> Result<Option<OptionResult>, MarketError> {
        for refresh in [false, true] {
            let crumb = self.crumb(refresh).await?;
            let mut req = self
                .client
                .get(format!("{}{}", OPTIONS_URL, symbol))
                .query(&[("crumb", crumb.as_str())]);
            if let Some(date) = date {
                req = req.query(&[("date", expiration_timestamp(date).to_string())]);
            }

            let resp = req.send().await.map_err(network)?;
            if resp.status() == StatusCode::UNAUTHORIZED && !refresh {
                debug!("Yahoo rejected crumb for {}, refreshing", symbol);
                continue;
            }
            if !resp.status().is_success() {
                return Err(status_error("yahoo", resp.status()));
            }

            let body: OptionsResponse = resp.json().await.map_err(parse)?;
            return first_option_result(body);
        }
        Err(MarketError::Network("Yahoo crumb rejected".to_string()))
    }
}

/// # Summary
/// Yahoo chart 接口响应顶层结构。
#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Deserialize, Debug)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

/// Yahoo 原始报价数据，各列与 timestamp 按下标对齐
#[derive(Deserialize, Debug)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Yahoo v7 期权接口响应
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OptionsResponse {
    option_chain: OptionsEnvelope,
}

#[derive(Deserialize, Debug)]
struct OptionsEnvelope {
    result: Option<Vec<OptionResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OptionResult {
    #[serde(default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<OptionBlock>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OptionBlock {
    expiration_date: i64,
    #[serde(default)]
    calls: Vec<YahooContract>,
    #[serde(default)]
    puts: Vec<YahooContract>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YahooContract {
    strike: f64,
    bid: Option<f64>,
    ask: Option<f64>,
    implied_volatility: Option<f64>,
    open_interest: Option<u64>,
}

impl From<&YahooContract> for OptionQuote {
    fn from(c: &YahooContract) -> Self {
        OptionQuote {
            strike: c.strike,
            bid: c.bid.unwrap_or(0.0),
            ask: c.ask.unwrap_or(0.0),
            implied_volatility: c.implied_volatility.unwrap_or(0.0),
            open_interest: c.open_interest.unwrap_or(0),
            delta: None,
        }
    }
}

/// 到期日对应的 Yahoo 时间戳 (UTC 零点)
fn expiration_timestamp(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn expiration_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

fn first_option_result(body: OptionsResponse) -> Result<Option<OptionResult>, MarketError> {
    if let Some(err) = body.option_chain.error {
        return Err(MarketError::Unknown(err.description));
    }
    Ok(body
        .option_chain
        .result
        .and_then(|mut results| results.pop()))
}

/// # Summary
/// 将 chart 响应转换为日线序列。
///
/// # Logic
/// 1. 接口报错时返回 Unknown。
/// 2. 按下标对齐各列，任一列缺值的行被跳过。
/// 3. 时间戳换算为美东交易日。
fn bars_from_chart(body: ChartResponse) -> Result<Vec<PriceBar>, MarketError> {
    if let Some(err) = body.chart.error {
        return Err(MarketError::Unknown(err.description));
    }
    let Some(result) = body.chart.result.and_then(|mut r| r.pop()) else {
        return Ok(Vec::new());
    };
    let quote = result
        .indicators
        .quote
        .first()
        .ok_or(MarketError::Parse("No quote data".into()))?;

    let bars = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let at = |col: &Vec<Option<f64>>| col.get(i).copied().flatten();
            Some(PriceBar {
                date: DateTime::from_timestamp(ts, 0)?
                    .with_timezone(&Eastern)
                    .date_naive(),
                open: at(&quote.open)?,
                high: at(&quote.high)?,
                low: at(&quote.low)?,
                close: at(&quote.close)?,
                volume: at(&quote.volume)?,
            })
        })
        .collect();
    Ok(bars)
}

/// 从期权接口结果中取出指定到期日的期权链
fn chain_from_result(result: &OptionResult, expiration: NaiveDate) -> Option<OptionChain> {
    let block = result
        .options
        .iter()
        .find(|b| expiration_date(b.expiration_date) == Some(expiration))?;

    let side = |contracts: &[YahooContract]| {
        let mut quotes: Vec<OptionQuote> = contracts.iter().map(OptionQuote::from).collect();
        quotes.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        quotes.dedup_by(|a, b| a.strike == b.strike);
        quotes
    };
    Some(OptionChain {
        expiration,
        calls: side(&block.calls),
        puts: side(&block.puts),
    })
}

#[async_trait]
impl PriceHistoryProvider for YahooProvider {
    /// # Summary
    /// 抓取日线历史数据。
    ///
    /// # Logic
    /// 1. 按周期的自然日天数换算 period1 / period2。
    /// 2. 以 1d 粒度请求 v8 chart 接口并解析。
    async fn get_history(
        &self,
        ticker: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<PriceBar>, MarketError> {
        let end = Utc::now();
        let start = end - ChronoDuration::days(period.calendar_days());

        let resp = self
            .client
            .get(format!("{}{}", CHART_URL, ticker))
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await
            .map_err(network)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(status_error("yahoo", resp.status()));
        }

        let body: ChartResponse = resp.json().await.map_err(parse)?;
        bars_from_chart(body)
    }
}

#[async_trait]
impl OptionsProvider for YahooProvider {
    async fn list_expirations(&self, ticker: &str) -> Result<Vec<NaiveDate>, MarketError> {
        let Some(result) = self.fetch_options(ticker, None).await? else {
            return Ok(Vec::new());
        };
        let mut dates: Vec<NaiveDate> = result
            .expiration_dates
            .iter()
            .filter_map(|&ts| expiration_date(ts))
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    async fn get_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<OptionChain, MarketError> {
        let result = self
            .fetch_options(ticker, Some(expiration))
            .await?
            .ok_or(MarketError::NotFound)?;
        chain_from_result(&result, expiration).ok_or(MarketError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_from_chart_skips_incomplete_rows() {
        // 2025-03-03 / 2025-03-04 / 2025-03-05 美东 09:30
        let json = r#"{"chart":{"result":[{"timestamp":[1741012200,1741098600,1741185000],
            "indicators":{"quote":[{"open":[10.0,null,12.0],"high":[11.0,11.5,12.5],
            "low":[9.5,10.5,11.5],"close":[10.5,11.0,12.2],"volume":[1000,2000,3000]}]}}],
            "error":null}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let bars = bars_from_chart(body).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(bars[1].close, 12.2);
        assert_eq!(bars[1].volume, 3000.0);
    }

    #[test]
    fn test_chart_error_is_reported() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            bars_from_chart(body),
            Err(MarketError::Unknown(
                "No data found, symbol may be delisted".to_string()
            ))
        );
    }

    #[test]
    fn test_option_chain_parsing() {
        // 1741305600 = 2025-03-07 00:00 UTC
        let json = r#"{"optionChain":{"result":[{"underlyingSymbol":"ACME",
            "expirationDates":[1741910400,1741305600],
            "options":[{"expirationDate":1741305600,
              "calls":[{"strike":12.5,"bid":0.4,"ask":0.5,"impliedVolatility":0.61,"openInterest":120},
                       {"strike":10.0,"bid":2.1,"ask":2.3,"impliedVolatility":0.7}],
              "puts":[{"strike":12.5,"bid":0.9,"ask":1.0,"impliedVolatility":0.65,"openInterest":80}]}]}],
            "error":null}}"#;
        let body: OptionsResponse = serde_json::from_str(json).unwrap();
        let result = first_option_result(body).unwrap().unwrap();

        let exp = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let chain = chain_from_result(&result, exp).unwrap();
        assert_eq!(chain.calls.len(), 2);
        assert_eq!(chain.calls[0].strike, 10.0);
        assert_eq!(chain.calls[0].open_interest, 0);
        assert_eq!(chain.puts[0].implied_volatility, 0.65);
        assert_eq!(chain.total_open_interest(), 200);
        assert!(chain.calls.iter().all(|q| q.delta.is_none()));

        assert!(chain_from_result(&result, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()).is_none());
        assert_eq!(expiration_timestamp(exp), 1_741_305_600);
    }
}
