use crush_analysis::engine::parse_expected_move;
use crush_core::analysis::entity::AnalysisResult;
use crush_core::analysis::error::AnalysisError;
use crush_core::analysis::port::VolatilityAnalyzer;
use crush_core::common::time::TimeProvider;
use crush_core::common::{HistoryPeriod, format_count, normalize_symbol};
use crush_core::market::entity::WinRate;
use crush_core::market::error::MarketError;
use crush_core::market::port::{OptionsProvider, PriceHistoryProvider, SentimentSignalProvider};
use crush_core::screen::entity::{Metrics, ThresholdState, Tier, ValidationResult};
use std::sync::Arc;
use tracing::{debug, warn};

// 硬性条件
pub const MIN_PRICE: f64 = 10.0;
pub const MAX_DAYS_TO_EXPIRY: i64 = 9;
pub const MIN_OPEN_INTEREST: u64 = 2_000;
pub const MAX_TERM_SLOPE: f64 = -0.004;
pub const MAX_ATM_DELTA: f64 = 0.57;
pub const MIN_EXPECTED_MOVE: f64 = 0.90;

// 软性条件 (失败线 / near-miss 线)
pub const SOFT_PRICE_FAIL: f64 = 5.0;
pub const SOFT_PRICE_NEAR: f64 = 7.0;
pub const VOLUME_FAIL: f64 = 1_000_000.0;
pub const VOLUME_NEAR: f64 = 1_500_000.0;
pub const WIN_RATE_FAIL: f64 = 40.0;
pub const WIN_RATE_NEAR: f64 = 50.0;

/// Tier 2 要求的更陡期限结构
pub const TIER2_MAX_SLOPE: f64 = -0.006;

/// # Summary
/// 软性条件的输入信号。
///
/// # Invariants
/// - `win_rate == None` 表示胜率检查被跳过（数据源未启用）。
#[derive(Debug, Clone, PartialEq)]
pub struct SoftSignals {
    pub price: f64,
    pub avg_volume: f64,
    pub win_rate: Option<WinRate>,
    pub iv_rv_ratio: f64,
    pub term_slope: f64,
}

#[derive(Debug, Default)]
struct SoftGates {
    failed: Vec<String>,
    near_miss: Vec<String>,
}

impl SoftGates {
    fn price(&mut self, price: f64) {
        if price < SOFT_PRICE_FAIL {
            self.failed.push(format!("Price ${:.2} < $5.00", price));
        } else if price < SOFT_PRICE_NEAR {
            self.near_miss.push(format!("Price ${:.2} < $7.00", price));
        }
    }

    fn volume(&mut self, avg_volume: f64) {
        if avg_volume < VOLUME_FAIL {
            self.failed
                .push(format!("Volume {} < 1M", format_count(avg_volume)));
        } else if avg_volume < VOLUME_NEAR {
            self.near_miss
                .push(format!("Volume {} < 1.5M", format_count(avg_volume)));
        }
    }

    fn win_rate(&mut self, w: &WinRate) {
        if w.win_rate < WIN_RATE_FAIL {
            self.failed.push(format!(
                "Winrate {:.1}% < 40% (over {} earnings)",
                w.win_rate, w.quarters
            ));
        } else if w.win_rate < WIN_RATE_NEAR {
            self.near_miss.push(format!(
                "Winrate {:.1}% < 50% (over {} earnings)",
                w.win_rate, w.quarters
            ));
        }
    }

    fn iv_rv(&mut self, ratio: f64, thresholds: &ThresholdState) {
        if ratio < thresholds.iv_rv_near_miss {
            self.failed.push(format!(
                "IV/RV ratio {:.2} < {:.2}",
                ratio, thresholds.iv_rv_near_miss
            ));
        } else if ratio < thresholds.iv_rv_pass {
            self.near_miss.push(format!(
                "IV/RV ratio {:.2} < {:.2}",
                ratio, thresholds.iv_rv_pass
            ));
        }
    }
}

/// 价格或成交量已触发软性失败时，不再查询胜率
pub fn fails_liquidity(price: f64, avg_volume: f64) -> bool {
    price < SOFT_PRICE_FAIL || avg_volume < VOLUME_FAIL
}

/// # Summary
/// 执行软性条件并完成分级。
///
/// # Logic
/// 1. 价格、成交量检查，累积失败与 near-miss。
/// 2. 前面没有失败时才检查胜率，否则记录 0/0 占位。
/// 3. 按当前阈值对检查 IV/RV。
/// 4. 无失败无 near-miss 为 Tier 1；无失败、有 near-miss 且斜率 <= -0.006 为 Tier 2；
///    其余无失败者为 near-miss，有失败者为 Fail。
///
/// # Arguments
/// * `ticker`: 证券代码。
/// * `signals`: 软性条件输入。
/// * `thresholds`: 本周期的 IV/RV 阈值。
/// * `metrics`: 硬性条件阶段已累积的指标，会被继续补充。
pub fn assess(
    ticker: &str,
    signals: &SoftSignals,
    thresholds: &ThresholdState,
    mut metrics: Metrics,
) -> ValidationResult {
    let mut gates = SoftGates::default();

    metrics.insert("price", signals.price);
    gates.price(signals.price);
    metrics.insert("volume", signals.avg_volume);
    gates.volume(signals.avg_volume);

    match (&signals.win_rate, gates.failed.is_empty()) {
        (Some(w), true) => {
            metrics.insert("win_rate", w.win_rate);
            metrics.insert("win_quarters", w.quarters);
            gates.win_rate(w);
        }
        _ => {
            metrics.insert("win_rate", 0.0);
            metrics.insert("win_quarters", 0_i64);
        }
    }

    metrics.insert("iv_rv_ratio", signals.iv_rv_ratio);
    gates.iv_rv(signals.iv_rv_ratio, thresholds);

    let tier = if gates.failed.is_empty() && gates.near_miss.is_empty() {
        Tier::One
    } else if gates.failed.is_empty() && signals.term_slope <= TIER2_MAX_SLOPE {
        Tier::Two
    } else {
        Tier::None
    };
    metrics.insert("tier", i64::from(tier.as_u8()));
    let near_miss = tier == Tier::None && gates.failed.is_empty();

    let reason = if !gates.failed.is_empty() {
        gates.failed.join(" | ")
    } else if !gates.near_miss.is_empty() {
        gates.near_miss.join(" | ")
    } else {
        "Tier 1 Trade".to_string()
    };

    ValidationResult {
        ticker: ticker.to_string(),
        pass: tier != Tier::None,
        tier,
        near_miss,
        reason,
        metrics,
    }
}

/// # Summary
/// 由分析结果得到预期波动金额。
///
/// # Logic
/// 1. 百分比字符串可解析时，金额 = 现价 × 百分比。
/// 2. 不可解析（含 "N/A"）时退回最近到期日的跨式价格；两者都没有则返回 None，跳过该条件。
pub fn expected_move_dollars(analysis: &AnalysisResult, price: f64) -> Option<f64> {
    match parse_expected_move(&analysis.expected_move_pct) {
        Ok(pct) => Some(price * pct),
        Err(e) => {
            if analysis.expected_move_pct != "N/A" {
                warn!(
                    "Could not parse expected move for {}: {}",
                    analysis.ticker, e
                );
            }
            analysis.straddle_price
        }
    }
}

fn delta_violation(call: Option<f64>, put: Option<f64>) -> Option<String> {
    let call_bad = call.is_some_and(|d| d > MAX_ATM_DELTA);
    let put_bad = put.is_some_and(|d| d.abs() > MAX_ATM_DELTA);
    if !(call_bad || put_bad) {
        return None;
    }
    let show = |d: Option<f64>| d.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v));
    Some(format!(
        "ATM options have delta > 0.57 (call: {}, put: {})",
        show(call),
        show(put)
    ))
}

/// # Summary
/// 候选标的分层校验器。
///
/// # Invariants
/// - 阈值以值的形式随每次调用传入，校验器本身不持有可变状态。
/// - 任何失败都体现在 `ValidationResult.reason` 上，且保留退出前已计算的指标。
pub struct CandidateValidator {
    // 日线行情
    history: Arc<dyn PriceHistoryProvider>,
    // 期权链
    options: Arc<dyn OptionsProvider>,
    // 波动率分析
    analyzer: Arc<dyn VolatilityAnalyzer>,
    // 历史胜率信号，未启用时跳过该检查
    sentiment: Option<Arc<dyn SentimentSignalProvider>>,
    // 时钟
    clock: Arc<dyn TimeProvider>,
}

impl CandidateValidator {
    pub fn new(
        history: Arc<dyn PriceHistoryProvider>,
        options: Arc<dyn OptionsProvider>,
        analyzer: Arc<dyn VolatilityAnalyzer>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            history,
            options,
            analyzer,
            sentiment: None,
            clock,
        }
    }

    /// 启用胜率检查
    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentSignalProvider>) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    /// # Summary
    /// 校验单个候选标的。
    ///
    /// # Logic
    /// 1. 依次执行硬性条件，首个失败即返回 Fail。
    /// 2. 通过后执行软性条件并分级。
    /// 3. 数据源异常转为 "Validation error" 失败结果。
    ///
    /// # Arguments
    /// * `ticker`: 证券代码。
    /// * `thresholds`: 本周期的 IV/RV 阈值。
    pub async fn validate(&self, ticker: &str, thresholds: &ThresholdState) -> ValidationResult {
        let Some(symbol) = normalize_symbol(ticker) else {
            return ValidationResult::fail(
                ticker,
                AnalysisError::EmptySymbol.to_string(),
                Metrics::new(),
            );
        };

        let mut metrics = Metrics::new();
        let result = match self.run_gates(&symbol, thresholds, &mut metrics).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Error validating {}: {}", symbol, e);
                ValidationResult::fail(&symbol, format!("Validation error: {}", e), metrics)
            }
        };
        debug!(
            "{}: tier={} pass={} reason={}",
            symbol,
            result.tier.as_u8(),
            result.pass,
            result.reason
        );
        result
    }

    async fn run_gates(
        &self,
        symbol: &str,
        thresholds: &ThresholdState,
        metrics: &mut Metrics,
    ) -> Result<ValidationResult, MarketError> {
        let fail = |reason: String, metrics: &Metrics| {
            ValidationResult::fail(symbol, reason, metrics.clone())
        };

        let Some(price) = self.latest_close(symbol).await? else {
            return Ok(fail(AnalysisError::NoPriceData.to_string(), metrics));
        };
        metrics.insert("price", price);
        if price < MIN_PRICE {
            return Ok(fail(format!("Price ${:.2} < $10.00", price), metrics));
        }

        let expirations = self.options.list_expirations(symbol).await?;
        let Some(first) = expirations.iter().min().copied() else {
            return Ok(fail("No options available".to_string(), metrics));
        };
        let days_to_expiry = (first - self.clock.market_today()).num_days();
        metrics.insert("days_to_expiry", days_to_expiry);
        if days_to_expiry > MAX_DAYS_TO_EXPIRY {
            return Ok(fail(
                format!("Next expiration too far: {} days", days_to_expiry),
                metrics,
            ));
        }

        let open_interest = self.options.get_chain(symbol, first).await?.total_open_interest();
        metrics.insert("open_interest", open_interest);
        if open_interest < MIN_OPEN_INTEREST {
            return Ok(fail(
                format!("Insufficient open interest: {}", open_interest),
                metrics,
            ));
        }

        let analysis = match self.analyzer.compute(symbol).await {
            Ok(analysis) => analysis,
            Err(e) => return Ok(fail(format!("Analysis error - {}", e), metrics)),
        };

        metrics.insert("term_structure", analysis.term_slope);
        if analysis.term_slope > MAX_TERM_SLOPE {
            return Ok(fail(
                format!("Term structure {:.4} > -0.004", analysis.term_slope),
                metrics,
            ));
        }

        if let Some(reason) = delta_violation(analysis.atm_call_delta, analysis.atm_put_delta) {
            return Ok(fail(reason, metrics));
        }

        if let Some(dollars) = expected_move_dollars(&analysis, price) {
            metrics.insert("expected_move_dollars", dollars);
            if dollars < MIN_EXPECTED_MOVE {
                return Ok(fail(
                    format!("Expected move ${:.2} < $0.90", dollars),
                    metrics,
                ));
            }
        }

        let avg_volume = self.monthly_volume(symbol).await?;
        let win_rate = if fails_liquidity(price, avg_volume) {
            None
        } else {
            self.win_rate(symbol).await
        };

        let signals = SoftSignals {
            price,
            avg_volume,
            win_rate,
            iv_rv_ratio: analysis.iv_rv_ratio,
            term_slope: analysis.term_slope,
        };
        Ok(assess(symbol, &signals, thresholds, metrics.clone()))
    }

    async fn latest_close(&self, symbol: &str) -> Result<Option<f64>, MarketError> {
        Ok(self
            .history
            .get_history(symbol, HistoryPeriod::OneDay)
            .await?
            .last()
            .map(|bar| bar.close))
    }

    /// 近一个月日均成交量，无数据时为 0
    #[allow(clippy::cast_precision_loss)]
    async fn monthly_volume(&self, symbol: &str) -> Result<f64, MarketError> {
        let bars = self
            .history
            .get_history(symbol, HistoryPeriod::OneMonth)
            .await?;
        if bars.is_empty() {
            return Ok(0.0);
        }
        Ok(bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64)
    }

    /// 数据源失败时以 0/0 兜底；未启用时返回 None
    async fn win_rate(&self, symbol: &str) -> Option<WinRate> {
        let provider = self.sentiment.as_ref()?;
        match provider.get_win_rate(symbol).await {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("{}: win rate unavailable ({}), defaulting to 0/0", symbol, e);
                Some(WinRate::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> SoftSignals {
        SoftSignals {
            price: 12.0,
            avg_volume: 2_000_000.0,
            win_rate: Some(WinRate {
                win_rate: 55.0,
                quarters: 12,
            }),
            iv_rv_ratio: 1.30,
            term_slope: -0.0045,
        }
    }

    #[test]
    fn test_delta_violation() {
        assert!(delta_violation(None, None).is_none());
        assert!(delta_violation(Some(0.55), Some(-0.45)).is_none());
        let reason = delta_violation(Some(0.60), None).unwrap();
        assert_eq!(reason, "ATM options have delta > 0.57 (call: 0.60, put: N/A)");
        assert!(delta_violation(Some(0.40), Some(-0.58)).is_some());
    }

    #[test]
    fn test_soft_price_and_volume_near_miss() {
        let mut s = signals();
        s.price = 6.5;
        s.avg_volume = 1_200_000.0;
        s.term_slope = -0.0065;
        let r = assess("ACME", &s, &ThresholdState::default(), Metrics::new());
        assert_eq!(r.tier, Tier::Two);
        assert_eq!(r.reason, "Price $6.50 < $7.00 | Volume 1,200,000 < 1.5M");
    }

    #[test]
    fn test_low_volume_skips_win_rate() {
        let mut s = signals();
        s.avg_volume = 900_000.0;
        let r = assess("ACME", &s, &ThresholdState::default(), Metrics::new());
        assert_eq!(r.tier, Tier::None);
        assert!(!r.near_miss);
        assert_eq!(r.metrics.number("win_rate"), Some(0.0));
        assert_eq!(r.metrics.number("win_quarters"), Some(0.0));
        assert!(!r.reason.contains("Winrate"));
    }

    #[test]
    fn test_disabled_win_rate_is_skipped() {
        let mut s = signals();
        s.win_rate = None;
        let r = assess("ACME", &s, &ThresholdState::default(), Metrics::new());
        assert_eq!(r.tier, Tier::One);
        assert_eq!(r.metrics.number("win_rate"), Some(0.0));
    }

    #[test]
    fn test_near_miss_when_slope_not_steep_enough() {
        let mut s = signals();
        s.iv_rv_ratio = 1.10;
        let r = assess("ACME", &s, &ThresholdState::default(), Metrics::new());
        assert_eq!(r.tier, Tier::None);
        assert!(r.near_miss);
        assert!(!r.pass);
        assert_eq!(r.reason, "IV/RV ratio 1.10 < 1.25");
    }

    #[test]
    fn test_iv_rv_below_near_miss_fails() {
        let mut s = signals();
        s.iv_rv_ratio = 0.90;
        let r = assess("ACME", &s, &ThresholdState::default(), Metrics::new());
        assert!(!r.near_miss);
        assert_eq!(r.reason, "IV/RV ratio 0.90 < 1.00");
        // 放宽后的阈值下同一比值只是 near-miss
        let relaxed = ThresholdState::for_market_ratio(0.80);
        let r = assess("ACME", &s, &relaxed, Metrics::new());
        assert!(r.near_miss);
    }
}
