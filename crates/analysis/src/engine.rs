use crate::term::TermStructure;
use crate::volatility::VolatilityEstimator;
use chrono::{Duration as ChronoDuration, NaiveDate};
use crush_core::analysis::entity::{AnalysisResult, VolatilityPoint};
use crush_core::analysis::error::AnalysisError;
use crush_core::analysis::port::VolatilityAnalyzer;
use crush_core::common::time::TimeProvider;
use crush_core::common::{HistoryPeriod, normalize_symbol};
use crush_core::market::entity::{OptionChain, OptionQuote};
use crush_core::market::port::{OptionsProvider, PriceHistoryProvider};
use futures::future::join_all;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// 期限结构斜率的远端 (天)
pub const TERM_HORIZON_DAYS: i64 = 45;
/// IV30 的目标天数
pub const IV_TARGET_DAYS: i64 = 30;
/// 成交量均线窗口
pub const VOLUME_WINDOW: usize = 30;
/// 平均成交量合格线
pub const MIN_AVG_VOLUME: f64 = 1_500_000.0;
/// 历史波动率非正时的 IV/RV 哨兵值
pub const IV_RV_SENTINEL: f64 = 9999.0;

/// # Summary
/// 挑选参与期限结构计算的到期日。
///
/// # Logic
/// 1. 升序排序后，取到第一个不早于 today + 45 天的到期日为止（含）。
/// 2. 若首个保留日期就是今天且保留不止一个，去掉它以避开当日到期的噪音。
/// 3. 没有任何到期日达到 45 天时保留全部。
pub fn filter_expirations(dates: &[NaiveDate], today: NaiveDate) -> Vec<NaiveDate> {
    let cutoff = today + ChronoDuration::days(TERM_HORIZON_DAYS);
    let mut sorted = dates.to_vec();
    sorted.sort();
    sorted.dedup();

    match sorted.iter().position(|d| *d >= cutoff) {
        Some(i) => {
            let mut retained = sorted[..=i].to_vec();
            if retained.len() > 1 && retained[0] == today {
                retained.remove(0);
            }
            retained
        }
        None => sorted,
    }
}

/// # Summary
/// 选出行权价最接近标的现价的合约。
///
/// # Logic
/// 按行权价升序比较距离，距离相同时取行权价较小（先出现）的一个。
pub fn nearest_strike(quotes: &[OptionQuote], price: f64) -> Option<&OptionQuote> {
    let mut by_strike: Vec<&OptionQuote> = quotes.iter().collect();
    by_strike.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    by_strike
        .into_iter()
        .min_by(|a, b| (a.strike - price).abs().total_cmp(&(b.strike - price).abs()))
}

/// IV30 / RV30，历史波动率非正时返回哨兵值
pub fn iv_rv_ratio(iv30: f64, hist_vol: f64) -> f64 {
    if hist_vol > 0.0 {
        iv30 / hist_vol
    } else {
        IV_RV_SENTINEL
    }
}

/// 预期波动百分比字符串，如 "5.20%"；无跨式价格时为 "N/A"
pub fn format_expected_move(straddle: Option<f64>, current_price: f64) -> String {
    match straddle {
        Some(s) if current_price > 0.0 => format!("{:.2}%", s / current_price * 100.0),
        _ => "N/A".to_string(),
    }
}

/// # Summary
/// 解析 "5.20%" 形式的预期波动字符串。
///
/// # Returns
/// 成功返回小数形式（0.052），无法解析时返回 `AnalysisError::Parse`。
pub fn parse_expected_move(raw: &str) -> Result<f64, AnalysisError> {
    raw.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map(|pct| pct / 100.0)
        .map_err(|e| AnalysisError::Parse(format!("expected move '{}': {}", raw, e)))
}

/// 简单移动平均的最后一个值，数据不足窗口长度时返回 None
#[allow(clippy::cast_precision_loss)]
pub fn moving_average_last(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// 单个到期日的 ATM 读数
struct AtmReading {
    expiration: NaiveDate,
    days: i64,
    iv: f64,
    straddle: f64,
    call_delta: Option<f64>,
    put_delta: Option<f64>,
}

fn read_atm(chain: &OptionChain, price: f64, today: NaiveDate) -> Option<AtmReading> {
    if !chain.is_usable() {
        return None;
    }
    let call = nearest_strike(&chain.calls, price)?;
    let put = nearest_strike(&chain.puts, price)?;
    Some(AtmReading {
        expiration: chain.expiration,
        days: (chain.expiration - today).num_days(),
        iv: (call.implied_volatility + put.implied_volatility) / 2.0,
        straddle: call.mid() + put.mid(),
        call_delta: call.delta,
        put_delta: put.delta,
    })
}

/// # Summary
/// 单标的波动率分析引擎：ATM 隐含波动率期限结构 + Yang-Zhang 历史波动率 + 跨式预期波动。
///
/// # Invariants
/// - 除估计器的一次性告警闩锁外不持有可变状态，相同输入快照得到相同结果。
/// - 所有失败都以 `AnalysisError` 返回，不会越过本组件边界。
pub struct RecommendationEngine {
    // 日线行情数据源
    history: Arc<dyn PriceHistoryProvider>,
    // 期权链数据源
    options: Arc<dyn OptionsProvider>,
    // 时钟，用于计算到期天数
    clock: Arc<dyn TimeProvider>,
    // 历史波动率估计器
    estimator: VolatilityEstimator,
}

impl RecommendationEngine {
    pub fn new(
        history: Arc<dyn PriceHistoryProvider>,
        options: Arc<dyn OptionsProvider>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            history,
            options,
            clock,
            estimator: VolatilityEstimator::default(),
        }
    }

    /// 替换默认的历史波动率估计器
    pub fn with_estimator(mut self, estimator: VolatilityEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn estimator(&self) -> &VolatilityEstimator {
        &self.estimator
    }

    /// # Summary
    /// 计算单个标的的分析结果。
    ///
    /// # Logic
    /// 1. 列出到期日并过滤到 45 天视界；无期权直接失败。
    /// 2. 拉取保留到期日的期权链与最新价；单个期权链失败时跳过该到期日，全部失败才报错。
    /// 3. 逐个到期日取 ATM 看涨/看跌 IV 均值；最近可用到期日额外计算跨式价格。
    /// 4. 构建期限结构，读取 IV30 与到 45 天的斜率。
    /// 5. 基于 3 个月日线计算历史波动率与 30 日均量。
    /// 6. 计算 IV/RV 与预期波动。
    ///
    /// # Arguments
    /// * `ticker`: 证券代码（大小写、空白不敏感）。
    ///
    /// # Returns
    /// 成功返回 `AnalysisResult`，任一步骤数据缺失返回对应的 `AnalysisError`。
    pub async fn compute(&self, ticker: &str) -> Result<AnalysisResult, AnalysisError> {
        let symbol = normalize_symbol(ticker).ok_or(AnalysisError::EmptySymbol)?;
        let today = self.clock.market_today();

        let expirations = self.options.list_expirations(&symbol).await?;
        if expirations.is_empty() {
            return Err(AnalysisError::NoOptions(symbol));
        }
        let retained = filter_expirations(&expirations, today);
        let fetched = join_all(
            retained
                .iter()
                .map(|exp| self.options.get_chain(&symbol, *exp)),
        )
        .await;
        let mut chains = Vec::with_capacity(fetched.len());
        let mut first_error = None;
        for (exp, outcome) in retained.iter().zip(fetched) {
            match outcome {
                Ok(chain) => chains.push(chain),
                Err(e) => {
                    warn!("{}: skipping {} (chain unavailable: {})", symbol, exp, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        // 全部期权链都拉取失败时按数据源错误处理
        if let (true, Some(e)) = (chains.is_empty(), first_error) {
            return Err(e.into());
        }

        let current_price = self
            .history
            .get_history(&symbol, HistoryPeriod::OneDay)
            .await?
            .last()
            .map(|bar| bar.close)
            .ok_or(AnalysisError::NoPriceData)?;

        let readings: Vec<AtmReading> = chains
            .iter()
            .filter_map(|chain| {
                let reading = read_atm(chain, current_price, today);
                if reading.is_none() {
                    debug!("{}: skipping {} (empty side)", symbol, chain.expiration);
                }
                reading
            })
            .filter(|r| r.days >= 0 && r.iv.is_finite() && r.iv > 0.0)
            .collect();
        let nearest = readings.first().ok_or(AnalysisError::NoUsableExpirations)?;

        let term = TermStructure::build(
            readings
                .iter()
                .map(|r| VolatilityPoint::new(r.days, r.iv)),
        )?;
        let iv30 = term.at(IV_TARGET_DAYS);
        let term_slope = term.slope_to(TERM_HORIZON_DAYS);

        let bars = self
            .history
            .get_history(&symbol, HistoryPeriod::ThreeMonths)
            .await?;
        if bars.is_empty() {
            return Err(AnalysisError::NoPriceData);
        }
        let hist_vol = self
            .estimator
            .estimate(&bars)
            .ok_or(AnalysisError::InsufficientHistory)?;

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let avg_volume = moving_average_last(&volumes, VOLUME_WINDOW);
        let straddle_price = Some(nearest.straddle);

        debug!(
            "{}: iv30={:.4} rv={:.4} slope={:.5} straddle={:.2}",
            symbol, iv30, hist_vol, term_slope, nearest.straddle
        );

        Ok(AnalysisResult {
            current_price,
            hist_vol,
            iv30,
            term_slope,
            iv_rv_ratio: iv_rv_ratio(iv30, hist_vol),
            expected_move_pct: format_expected_move(straddle_price, current_price),
            expected_move_dollars: straddle_price,
            straddle_price,
            avg_volume,
            avg_volume_ok: avg_volume.is_some_and(|v| v >= MIN_AVG_VOLUME),
            nearest_expiration: nearest.expiration,
            atm_call_delta: nearest.call_delta,
            atm_put_delta: nearest.put_delta,
            term_points: term.points().to_vec(),
            ticker: symbol,
        })
    }
}

#[async_trait]
impl VolatilityAnalyzer for RecommendationEngine {
    async fn compute(&self, ticker: &str) -> Result<AnalysisResult, AnalysisError> {
        RecommendationEngine::compute(self, ticker).await
    }
}
