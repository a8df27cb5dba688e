use crush_core::common::format_count;
use crush_core::screen::entity::{MetricValue, Tier, ValidationResult};
use crush_scanner::TickerAnalysis;

/// 在 CORE METRICS 中单独展示的指标
const CORE_KEYS: [&str; 6] = [
    "price",
    "volume",
    "term_structure",
    "iv_rv_ratio",
    "win_rate",
    "win_quarters",
];

fn status(result: &ValidationResult) -> String {
    match (result.pass, result.tier) {
        (true, Tier::One | Tier::Two) => format!("PASS - TIER {}", result.tier.as_u8()),
        (true, Tier::None) => "PASS".to_string(),
        (false, _) if result.near_miss => "NEAR MISS".to_string(),
        _ => "FAIL".to_string(),
    }
}

/// # Summary
/// 渲染 `--analyze` 的输出。
///
/// # Logic
/// 1. 参考标的比值与本次使用的阈值。
/// 2. 状态与原因。
/// 3. 核心指标，其余指标按键名列在 ADDITIONAL METRICS 下。
pub fn render_analysis(analysis: &TickerAnalysis, reference_symbol: &str) -> String {
    let result = &analysis.result;
    let thresholds = analysis.adjustment.thresholds;
    let m = &result.metrics;
    let mut out = format!("\n=== ANALYZING {} ===\n\n", result.ticker);

    match analysis.adjustment.reference_ratio {
        Some(ratio) => out.push_str(&format!("{} IV/RV: {:.2}\n", reference_symbol, ratio)),
        None => out.push_str(&format!("{} IV/RV: N/A\n", reference_symbol)),
    }
    out.push_str(&format!(
        "Current thresholds - Pass: {:.2}, Near Miss: {:.2}\n\n",
        thresholds.iv_rv_pass, thresholds.iv_rv_near_miss
    ));
    out.push_str(&format!("Status: {}\n", status(result)));
    out.push_str(&format!("Reason: {}\n\n", result.reason));

    out.push_str("CORE METRICS:\n");
    if let Some(price) = m.number("price") {
        out.push_str(&format!("  Price: ${:.2}\n", price));
    }
    if let Some(volume) = m.number("volume") {
        out.push_str(&format!("  Volume: {}\n", format_count(volume)));
    }
    if let Some(slope) = m.number("term_structure") {
        out.push_str(&format!("  Term Structure: {:.4}\n", slope));
    }
    if let Some(ratio) = m.number("iv_rv_ratio") {
        out.push_str(&format!("  IV/RV Ratio: {:.2}\n", ratio));
    }
    if let (Some(rate), Some(quarters)) = (m.number("win_rate"), m.get("win_quarters")) {
        out.push_str(&format!(
            "  Winrate: {:.1}% over the last {} earnings\n",
            rate, quarters
        ));
    }

    let extras: Vec<(&String, &MetricValue)> = m
        .iter()
        .filter(|(k, _)| !CORE_KEYS.contains(&k.as_str()))
        .collect();
    if !extras.is_empty() {
        out.push_str("\nADDITIONAL METRICS:\n");
        for (key, value) in extras {
            out.push_str(&format!("  {}: {}\n", key, value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crush_core::screen::entity::{Metrics, ThresholdState};
    use crush_scanner::Adjustment;

    fn analysis(result: ValidationResult, ratio: Option<f64>) -> TickerAnalysis {
        TickerAnalysis {
            result,
            adjustment: Adjustment {
                thresholds: ThresholdState::for_market_ratio(0.8),
                reference_ratio: ratio,
            },
        }
    }

    #[test]
    fn test_render_passing_ticker() {
        let mut metrics = Metrics::new();
        metrics.insert("price", 23.456);
        metrics.insert("volume", 1_750_000.0);
        metrics.insert("term_structure", -0.00512);
        metrics.insert("iv_rv_ratio", 1.318);
        metrics.insert("win_rate", 62.5);
        metrics.insert("win_quarters", 8u32);
        metrics.insert("days_to_expiry", 3i64);
        metrics.insert("tier", 1u32);
        let result = ValidationResult {
            ticker: "ACME".to_string(),
            pass: true,
            tier: Tier::One,
            near_miss: false,
            reason: "Tier 1 Trade".to_string(),
            metrics,
        };

        let text = render_analysis(&analysis(result, Some(0.81)), "SPY");
        assert!(text.contains("=== ANALYZING ACME ==="));
        assert!(text.contains("SPY IV/RV: 0.81\n"));
        assert!(text.contains("Current thresholds - Pass: 1.00, Near Miss: 0.75\n"));
        assert!(text.contains("Status: PASS - TIER 1\n"));
        assert!(text.contains("  Price: $23.46\n"));
        assert!(text.contains("  Volume: 1,750,000\n"));
        assert!(text.contains("  Term Structure: -0.0051\n"));
        assert!(text.contains("  Winrate: 62.5% over the last 8 earnings\n"));
        assert!(text.contains("ADDITIONAL METRICS:\n  days_to_expiry: 3\n  tier: 1\n"));
    }

    #[test]
    fn test_render_failure_without_reference() {
        let mut metrics = Metrics::new();
        metrics.insert("price", 4.2);
        let result = ValidationResult {
            ticker: "PENNY".to_string(),
            pass: false,
            tier: Tier::None,
            near_miss: false,
            reason: "Price $4.20 < $10.00".to_string(),
            metrics,
        };

        let text = render_analysis(&analysis(result, None), "SPY");
        assert!(text.contains("SPY IV/RV: N/A\n"));
        assert!(text.contains("Status: FAIL\n"));
        assert!(text.contains("Reason: Price $4.20 < $10.00\n"));
        assert!(!text.contains("ADDITIONAL METRICS"));
    }
}
