use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use crush_analysis::volatility::{VolatilityEstimator, simple_series, yang_zhang_series};
use crush_core::test_utils::{bars_from_closes, flat_bars};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
}

/// # Summary
/// 价格恒定的序列，波动率必须恰好为 0，而不是 NaN 或错误。
#[test]
fn test_constant_prices_give_zero_volatility() {
    let estimator = VolatilityEstimator::default();
    let bars = flat_bars(start(), 63, 50.0, 2_000_000.0);

    assert_eq!(estimator.estimate(&bars), Some(0.0));
    assert!(!estimator.fallback_used());
}

/// # Summary
/// 每日收益率恒定（方差为 0）的序列，Yang-Zhang 结果为 0。
///
/// # Logic
/// 1. 构造每日 +1% 的收盘价，开盘等于前收，日内无额外振幅。
/// 2. 隔夜收益恒为 0，收盘收益恒为 1%，RS 项恒为 0。
#[test]
fn test_constant_returns_give_zero_volatility() {
    let closes: Vec<f64> = (0..40_i32).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
    let bars = bars_from_closes(start(), &closes, 0.0, 1_000_000.0);

    let vol = VolatilityEstimator::default().estimate(&bars).unwrap();
    assert_abs_diff_eq!(vol, 0.0, epsilon = 1e-9);
}

/// # Summary
/// 滚动序列长度为 `bars - window`，最后一个值与 `estimate` 一致。
#[test]
fn test_series_length_and_last_value() {
    let closes: Vec<f64> = (0..45_i32)
        .map(|i| {
            let sign = if i % 2 == 0 { 1.5 } else { -1.0 };
            100.0 + sign * f64::from(i % 5)
        })
        .collect();
    let bars = bars_from_closes(start(), &closes, 0.01, 1_000_000.0);
    let estimator = VolatilityEstimator::new(30, 252);

    let series = estimator.estimate_series(&bars);
    assert_eq!(series.len(), 45 - 30);
    assert!(series.iter().all(|v| v.is_finite() && *v > 0.0));
    assert_eq!(estimator.estimate(&bars), series.last().copied());
    assert_eq!(
        yang_zhang_series(&bars, 30, 252).unwrap(),
        series,
        "valid data must not use the fallback"
    );
}

/// # Summary
/// 更大的日内振幅应得到更高的 Yang-Zhang 波动率。
#[test]
fn test_wider_ranges_raise_volatility() {
    let closes: Vec<f64> = (0..40_i32)
        .map(|i| 100.0 + f64::from(i % 3) - 1.0)
        .collect();
    let calm = bars_from_closes(start(), &closes, 0.005, 1.0);
    let wild = bars_from_closes(start(), &closes, 0.03, 1.0);

    let estimator = VolatilityEstimator::default();
    let calm_vol = estimator.estimate(&calm).unwrap();
    let wild_vol = estimator.estimate(&wild).unwrap();
    assert!(wild_vol > calm_vol, "{} <= {}", wild_vol, calm_vol);
}

/// # Summary
/// 非法价格触发兜底，兜底结果与简单波动率一致，闩锁只置位一次。
///
/// # Logic
/// 1. 在序列早期放入一个最低价为 0 的 K 线，Yang-Zhang 无法计算对数。
/// 2. 连续调用两次，均返回简单波动率；闩锁保持置位。
#[test]
fn test_invalid_bar_falls_back_to_simple_volatility() {
    let closes: Vec<f64> = (0..40_i32).map(|i| 100.0 + f64::from(i % 4)).collect();
    let mut bars = bars_from_closes(start(), &closes, 0.01, 1.0);
    bars[3].low = 0.0;

    let estimator = VolatilityEstimator::default();
    let expected = simple_series(&bars, 30, 252);
    assert!(!expected.is_empty());

    assert_eq!(estimator.estimate(&bars), expected.last().copied());
    assert!(estimator.fallback_used());
    assert_eq!(estimator.estimate(&bars), expected.last().copied());
    assert!(estimator.fallback_used());
}

/// # Summary
/// 最后一个窗口无法计算时不应退回更早窗口的值。
///
/// # Logic
/// 1. 倒数第二根收盘为 0：Yang-Zhang 失败，兜底序列中只有最后一个窗口含 inf 收益率。
/// 2. 序列长度不变，最后一项为 NaN，`estimate` 返回 None。
#[test]
fn test_broken_last_window_is_not_available() {
    let closes: Vec<f64> = (0..40_i32).map(|i| 100.0 + f64::from(i % 4)).collect();
    let mut bars = bars_from_closes(start(), &closes, 0.01, 1.0);
    bars[38].close = 0.0;

    let estimator = VolatilityEstimator::default();
    let series = estimator.estimate_series(&bars);
    assert_eq!(series.len(), 40 - 30);
    assert!(series[..9].iter().all(|v| v.is_finite()));
    assert!(series[9].is_nan());
    assert_eq!(estimator.estimate(&bars), None);
    assert!(estimator.fallback_used());
}

/// # Summary
/// 数据连兜底都不够时返回“不可用”，而不是 0。
#[test]
fn test_insufficient_bars_not_available() {
    let bars = flat_bars(start(), 30, 20.0, 1.0);
    let estimator = VolatilityEstimator::default();

    assert_eq!(estimator.estimate(&bars), None);
    assert!(estimator.estimate_series(&bars).is_empty());
}
