use crush_core::market::entity::PriceBar;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::warn;

/// 默认滚动窗口 (交易日)
pub const DEFAULT_WINDOW: usize = 30;
/// 年化交易日数
pub const TRADING_PERIODS: u32 = 252;

/// Yang-Zhang 估计失败的原因，触发简单波动率兜底。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VolatilityError {
    #[error("insufficient data: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("non-positive or non-finite price at bar {0}")]
    InvalidPrice(usize),
    #[error("degenerate variance {variance} at bar {index}")]
    Degenerate { index: usize, variance: f64 },
}

/// # Summary
/// 历史波动率估计器：Yang-Zhang 为主，收盘价收益率标准差为兜底。
///
/// # Invariants
/// - `window >= 2`。
/// - 兜底告警在每个实例上至多输出一次（闩锁只置位，不复位）。
#[derive(Debug)]
pub struct VolatilityEstimator {
    window: usize,
    annualization_periods: u32,
    fallback_warned: AtomicBool,
}

impl Default for VolatilityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, TRADING_PERIODS)
    }
}

impl VolatilityEstimator {
    pub fn new(window: usize, annualization_periods: u32) -> Self {
        Self {
            window: window.max(2),
            annualization_periods,
            fallback_warned: AtomicBool::new(false),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 兜底是否已被触发过
    pub fn fallback_used(&self) -> bool {
        self.fallback_warned.load(Ordering::Relaxed)
    }

    /// # Summary
    /// 返回窗口末端的最新波动率。
    ///
    /// # Returns
    /// 数据不足以完成任何一种估计，或最后一个窗口无法计算时返回 None。
    pub fn estimate(&self, bars: &[PriceBar]) -> Option<f64> {
        self.estimate_series(bars)
            .last()
            .copied()
            .filter(|v| v.is_finite())
    }

    /// # Summary
    /// 返回完整的滚动波动率序列（已去掉窗口未满的前导项）。
    /// 兜底序列中无法计算的窗口为 NaN，下标与窗口末端一一对应。
    ///
    /// # Logic
    /// 1. 优先计算 Yang-Zhang 序列。
    /// 2. 失败时首次告警并置位闩锁，然后改用简单波动率。
    pub fn estimate_series(&self, bars: &[PriceBar]) -> Vec<f64> {
        match yang_zhang_series(bars, self.window, self.annualization_periods) {
            Ok(series) => series,
            Err(e) => {
                if !self.fallback_warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        "Error in volatility calculation: {}. Using simple volatility.",
                        e
                    );
                }
                simple_series(bars, self.window, self.annualization_periods)
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(n: usize) -> f64 {
    n as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = as_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

/// # Summary
/// Yang-Zhang 滚动波动率。
///
/// # Logic
/// 1. 对每根 K 线（从第二根起）计算 ln(h/o), ln(l/o), ln(c/o), ln(o/前收), ln(c/前收)。
/// 2. Rogers-Satchell 项 rs = ln(h/o)(ln(h/o)-ln(c/o)) + ln(l/o)(ln(l/o)-ln(c/o))。
/// 3. 窗口内隔夜方差与收盘到收盘方差取样本方差，rs 取 Σrs/(w-1)。
/// 4. k = 0.34 / (1.34 + (w+1)/(w-1))，方差 = 隔夜 + k·收盘 + (1-k)·rs。
/// 5. 年化：sqrt(方差)·sqrt(periods)。
///
/// # Returns
/// 长度为 `bars.len() - window` 的序列；K 线不足 `window + 1` 根、价格非法或方差退化时返回错误。
pub fn yang_zhang_series(
    bars: &[PriceBar],
    window: usize,
    annualization_periods: u32,
) -> Result<Vec<f64>, VolatilityError> {
    let needed = window + 1;
    if window < 2 || bars.len() < needed {
        return Err(VolatilityError::InsufficientData {
            needed,
            got: bars.len(),
        });
    }

    let valid = |p: f64| p.is_finite() && p > 0.0;
    let mut overnight = Vec::with_capacity(bars.len() - 1);
    let mut close_to_close = Vec::with_capacity(bars.len() - 1);
    let mut rs = Vec::with_capacity(bars.len() - 1);

    for (i, pair) in bars.windows(2).enumerate() {
        let (prev, bar) = (&pair[0], &pair[1]);
        if ![prev.close, bar.open, bar.high, bar.low, bar.close]
            .into_iter()
            .all(valid)
        {
            return Err(VolatilityError::InvalidPrice(i + 1));
        }
        let ho = (bar.high / bar.open).ln();
        let lo = (bar.low / bar.open).ln();
        let co = (bar.close / bar.open).ln();
        overnight.push((bar.open / prev.close).ln());
        close_to_close.push((bar.close / prev.close).ln());
        rs.push(ho * (ho - co) + lo * (lo - co));
    }

    let w = as_f64(window);
    let k = 0.34 / (1.34 + (w + 1.0) / (w - 1.0));
    let scale = f64::from(annualization_periods).sqrt();

    let mut series = Vec::with_capacity(overnight.len() + 1 - window);
    for end in window..=overnight.len() {
        let span = end - window..end;
        let open_var = sample_variance(&overnight[span.clone()]);
        let close_var = sample_variance(&close_to_close[span.clone()]);
        let rs_term = rs[span].iter().sum::<f64>() / (w - 1.0);

        let variance = open_var + k * close_var + (1.0 - k) * rs_term;
        if !variance.is_finite() || variance < 0.0 {
            return Err(VolatilityError::Degenerate {
                index: end,
                variance,
            });
        }
        series.push(variance.sqrt() * scale);
    }

    Ok(series)
}

/// # Summary
/// 简单波动率：窗口内日收益率的样本标准差，年化。
///
/// # Logic
/// 1. 日收益率 r = c / 前收 - 1。
/// 2. 含非有限收益率的窗口记为 NaN，不从序列中移除。
///
/// # Returns
/// 长度为 `bars.len() - window` 的序列；K 线不足 `window + 1` 根时返回空序列。
pub fn simple_series(bars: &[PriceBar], window: usize, annualization_periods: u32) -> Vec<f64> {
    if window < 2 || bars.len() < window + 1 {
        return Vec::new();
    }
    let returns: Vec<f64> = bars
        .windows(2)
        .map(|pair| pair[1].close / pair[0].close - 1.0)
        .collect();
    let scale = f64::from(annualization_periods).sqrt();

    returns
        .windows(window)
        .map(|span| {
            if span.iter().all(|r| r.is_finite()) {
                sample_variance(span).sqrt() * scale
            } else {
                f64::NAN
            }
        })
        .collect()
}
