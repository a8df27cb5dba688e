//! 内存版行情替身与测试数据构造器，仅在 `test-utils` feature 下编译。

use crate::analysis::entity::AnalysisResult;
use crate::analysis::error::AnalysisError;
use crate::analysis::port::VolatilityAnalyzer;
use crate::common::HistoryPeriod;
use crate::market::entity::{EarningsEvent, OptionChain, OptionQuote, PriceBar, WinRate};
use crate::market::error::MarketError;
use crate::market::port::{
    EarningsCalendarProvider, OptionsProvider, PriceHistoryProvider, SentimentSignalProvider,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use dashmap::DashMap;
use std::time::Duration;

/// # Summary
/// 基于 DashMap 的内存行情替身，同时实现全部行情端口。
///
/// # Invariants
/// - 未预置的数据按“空”处理：历史与到期日返回空列表，期权链与胜率返回 `NotFound`。
/// - 通过 `fail_ticker` 注入的错误对该 ticker 的所有查询生效。
/// - 每次调用都会累加对应方法的计数器，用于断言调用次数。
#[derive(Default)]
pub struct MockMarket {
    histories: DashMap<(String, HistoryPeriod), Vec<PriceBar>>,
    chains: DashMap<(String, NaiveDate), OptionChain>,
    expirations: DashMap<String, Vec<NaiveDate>>,
    win_rates: DashMap<String, WinRate>,
    earnings: DashMap<NaiveDate, Vec<EarningsEvent>>,
    failing: DashMap<String, MarketError>,
    delays: DashMap<String, Duration>,
    calls: DashMap<&'static str, usize>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为单个周期预置日线
    pub fn set_history(&self, ticker: &str, period: HistoryPeriod, bars: Vec<PriceBar>) {
        self.histories.insert((ticker.to_string(), period), bars);
    }

    /// # Summary
    /// 以一条完整日线序列同时预置三个周期。
    ///
    /// # Logic
    /// 1. 1d 取最后 1 根。
    /// 2. 1mo 取最后 21 根。
    /// 3. 3mo 取全部。
    pub fn set_full_history(&self, ticker: &str, bars: Vec<PriceBar>) {
        let tail = |n: usize| bars[bars.len().saturating_sub(n)..].to_vec();
        self.set_history(ticker, HistoryPeriod::OneDay, tail(1));
        self.set_history(ticker, HistoryPeriod::OneMonth, tail(21));
        self.set_history(ticker, HistoryPeriod::ThreeMonths, bars);
    }

    /// 预置一条期权链，并把到期日登记到有序到期日列表中
    pub fn set_chain(&self, ticker: &str, chain: OptionChain) {
        let mut dates = self.expirations.entry(ticker.to_string()).or_default();
        if !dates.contains(&chain.expiration) {
            dates.push(chain.expiration);
            dates.sort();
        }
        self.chains
            .insert((ticker.to_string(), chain.expiration), chain);
    }

    /// 只登记到期日而不提供期权链
    pub fn set_expirations(&self, ticker: &str, mut dates: Vec<NaiveDate>) {
        dates.sort();
        self.expirations.insert(ticker.to_string(), dates);
    }

    pub fn set_win_rate(&self, ticker: &str, win_rate: WinRate) {
        self.win_rates.insert(ticker.to_string(), win_rate);
    }

    pub fn set_earnings(&self, date: NaiveDate, events: Vec<EarningsEvent>) {
        self.earnings.insert(date, events);
    }

    /// 让该 ticker 的所有查询返回指定错误
    pub fn fail_ticker(&self, ticker: &str, err: MarketError) {
        self.failing.insert(ticker.to_string(), err);
    }

    /// 让该 ticker 的所有查询先等待指定时长
    pub fn delay_ticker(&self, ticker: &str, delay: Duration) {
        self.delays.insert(ticker.to_string(), delay);
    }

    /// 读取某个方法的累计调用次数
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.get(method).map(|v| *v).unwrap_or(0)
    }

    async fn enter(&self, method: &'static str, ticker: &str) -> Result<(), MarketError> {
        *self.calls.entry(method).or_default() += 1;
        let delay = self.delays.get(ticker).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failing.get(ticker) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PriceHistoryProvider for MockMarket {
    async fn get_history(
        &self,
        ticker: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<PriceBar>, MarketError> {
        self.enter("get_history", ticker).await?;
        Ok(self
            .histories
            .get(&(ticker.to_string(), period))
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl OptionsProvider for MockMarket {
    async fn list_expirations(&self, ticker: &str) -> Result<Vec<NaiveDate>, MarketError> {
        self.enter("list_expirations", ticker).await?;
        Ok(self
            .expirations
            .get(ticker)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn get_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<OptionChain, MarketError> {
        self.enter("get_chain", ticker).await?;
        self.chains
            .get(&(ticker.to_string(), expiration))
            .map(|c| c.clone())
            .ok_or(MarketError::NotFound)
    }
}

#[async_trait]
impl SentimentSignalProvider for MockMarket {
    async fn get_win_rate(&self, ticker: &str) -> Result<WinRate, MarketError> {
        self.enter("get_win_rate", ticker).await?;
        self.win_rates
            .get(ticker)
            .map(|w| *w)
            .ok_or(MarketError::NotFound)
    }
}

#[async_trait]
impl EarningsCalendarProvider for MockMarket {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_earnings(&self, date: NaiveDate) -> Result<Vec<EarningsEvent>, MarketError> {
        *self.calls.entry("get_earnings").or_default() += 1;
        Ok(self
            .earnings
            .get(&date)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}

/// # Summary
/// 预置结果的分析器替身，未预置的标的返回 `NoOptions`。
#[derive(Default)]
pub struct StubAnalyzer {
    results: DashMap<String, Result<AnalysisResult, AnalysisError>>,
    calls: DashMap<String, usize>,
}

impl StubAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticker: &str, result: Result<AnalysisResult, AnalysisError>) {
        self.results.insert(ticker.to_string(), result);
    }

    /// 某个标的被分析的次数
    pub fn call_count(&self, ticker: &str) -> usize {
        self.calls.get(ticker).map(|v| *v).unwrap_or(0)
    }
}

#[async_trait]
impl VolatilityAnalyzer for StubAnalyzer {
    async fn compute(&self, ticker: &str) -> Result<AnalysisResult, AnalysisError> {
        *self.calls.entry(ticker.to_string()).or_default() += 1;
        self.results
            .get(ticker)
            .map(|r| r.clone())
            .unwrap_or_else(|| Err(AnalysisError::NoOptions(ticker.to_string())))
    }
}

/// # Summary
/// 构造一个各项指标合格的分析结果，测试按需覆盖字段。
///
/// # Logic
/// 现价 12，IV30 0.65 / RV 0.50 = 1.30，斜率 -0.0045，跨式 1.20 (10%)，无 Delta。
pub fn sample_analysis(ticker: &str, nearest_expiration: NaiveDate) -> AnalysisResult {
    AnalysisResult {
        ticker: ticker.to_string(),
        current_price: 12.0,
        hist_vol: 0.50,
        iv30: 0.65,
        term_slope: -0.0045,
        iv_rv_ratio: 1.30,
        expected_move_pct: "10.00%".to_string(),
        expected_move_dollars: Some(1.20),
        straddle_price: Some(1.20),
        avg_volume: Some(2_000_000.0),
        avg_volume_ok: true,
        nearest_expiration,
        atm_call_delta: None,
        atm_put_delta: None,
        term_points: Vec::new(),
    }
}

/// # Summary
/// 构造价格恒定的日线序列（开高低收相同），其波动率为 0。
pub fn flat_bars(start: NaiveDate, count: usize, price: f64, volume: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| PriceBar {
            date: start + ChronoDuration::days(i64::try_from(i).unwrap_or(i64::MAX)),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        })
        .collect()
}

/// # Summary
/// 由收盘价序列构造日线：开盘价等于前收，高低点在开收之外各放宽 `range` 比例。
pub fn bars_from_closes(start: NaiveDate, closes: &[f64], range: f64, volume: f64) -> Vec<PriceBar> {
    let mut bars = Vec::with_capacity(closes.len());
    let mut prev = closes.first().copied().unwrap_or(0.0);
    for (i, &close) in closes.iter().enumerate() {
        let open = prev;
        bars.push(PriceBar {
            date: start + ChronoDuration::days(i64::try_from(i).unwrap_or(i64::MAX)),
            open,
            high: open.max(close) * (1.0 + range),
            low: open.min(close) * (1.0 - range),
            close,
            volume,
        });
        prev = close;
    }
    bars
}

/// 构造单个期权报价
pub fn quote(strike: f64, bid: f64, ask: f64, iv: f64, open_interest: u64) -> OptionQuote {
    OptionQuote {
        strike,
        bid,
        ask,
        implied_volatility: iv,
        open_interest,
        delta: None,
    }
}

/// # Summary
/// 构造一条看涨看跌对称的期权链。
///
/// # Logic
/// 1. 每个行权价生成一对看涨看跌合约，隐含波动率均为 `iv`。
/// 2. 报价为 `premium ± 0.05`，未平仓量为 `open_interest`。
pub fn symmetric_chain(
    expiration: NaiveDate,
    strikes: &[f64],
    iv: f64,
    premium: f64,
    open_interest: u64,
) -> OptionChain {
    let side = || {
        strikes
            .iter()
            .map(|&k| quote(k, premium - 0.05, premium + 0.05, iv, open_interest))
            .collect::<Vec<_>>()
    };
    OptionChain {
        expiration,
        calls: side(),
        puts: side(),
    }
}
