use crush_core::common::format_count;
use crush_core::notify::entity::{ReportEntry, ScanReport};
use crush_core::screen::entity::Tier;

/// Section label used for an entry ("Tier 1", "Tier 2" or "Near Miss").
pub fn label(entry: &ReportEntry) -> String {
    match entry.tier {
        Tier::None => "Near Miss".to_string(),
        tier => format!("Tier {}", tier.as_u8()),
    }
}

/// # Summary
/// The metric lines shown for a single report entry.
///
/// # Logic
/// 1. Near misses lead with the failure reason.
/// 2. Every entry lists price, volume, win rate, IV/RV and term slope.
pub fn detail_lines(entry: &ReportEntry) -> Vec<String> {
    let mut lines = Vec::with_capacity(6);
    if let Some(reason) = &entry.reason {
        lines.push(format!("Failed: {}", reason));
    }
    lines.push(format!("Price: ${:.2}", entry.price));
    lines.push(format!("Volume: {}", format_count(entry.volume)));
    lines.push(format!(
        "Winrate: {:.1}% over the last {} earnings",
        entry.win_rate, entry.win_quarters
    ));
    lines.push(format!("IV/RV Ratio: {:.2}", entry.iv_rv_ratio));
    lines.push(format!("Term Structure: {:.3}", entry.term_structure));
    lines
}

fn tickers(entries: &[ReportEntry]) -> String {
    if entries.is_empty() {
        return "None".to_string();
    }
    entries
        .iter()
        .map(|e| e.ticker.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn section(out: &mut String, title: &str, entries: &[ReportEntry]) {
    out.push_str(&format!("\n{}:\n", title));
    if entries.is_empty() {
        out.push_str("  None\n");
        return;
    }
    for entry in entries {
        out.push_str(&format!("\n  {}:\n", entry.ticker));
        for line in detail_lines(entry) {
            out.push_str(&format!("    {}\n", line));
        }
    }
}

/// # Summary
/// Renders a report as plain text for the console and email bodies.
///
/// # Arguments
/// * `report` - The scan report.
/// * `compact` - Only list tickers per section.
pub fn plain_text(report: &ScanReport, compact: bool) -> String {
    let mut out = String::from("=== SCAN RESULTS ===\n");
    if compact {
        out.push_str(&format!("\nTIER 1: {}\n", tickers(&report.tier1)));
        out.push_str(&format!("TIER 2: {}\n", tickers(&report.tier2)));
        out.push_str(&format!("NEAR MISSES: {}\n", tickers(&report.near_misses)));
        return out;
    }
    section(&mut out, "TIER 1 RECOMMENDED TRADES", &report.tier1);
    section(&mut out, "TIER 2 RECOMMENDED TRADES", &report.tier2);
    section(&mut out, "NEAR MISSES", &report.near_misses);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(ticker: &str, tier: Tier, reason: Option<&str>) -> ReportEntry {
        ReportEntry {
            ticker: ticker.to_string(),
            tier,
            reason: reason.map(str::to_string),
            price: 42.5,
            volume: 2_345_678.4,
            win_rate: 62.5,
            win_quarters: 12,
            iv_rv_ratio: 1.3333,
            term_structure: -0.00456,
        }
    }

    fn report() -> ScanReport {
        ScanReport {
            title: "Earnings Scanner Results".to_string(),
            generated_at: Utc.with_ymd_and_hms(2025, 3, 3, 21, 0, 0).unwrap(),
            tier1: vec![entry("ALFA", Tier::One, None)],
            tier2: vec![],
            near_misses: vec![entry("BETA", Tier::None, Some("Volume 1,200,000 < 1.5M"))],
        }
    }

    #[test]
    fn test_detail_lines() {
        let lines = detail_lines(&entry("BETA", Tier::None, Some("too thin")));
        assert_eq!(
            lines,
            vec![
                "Failed: too thin",
                "Price: $42.50",
                "Volume: 2,345,678",
                "Winrate: 62.5% over the last 12 earnings",
                "IV/RV Ratio: 1.33",
                "Term Structure: -0.005",
            ]
        );
        assert_eq!(label(&entry("X", Tier::Two, None)), "Tier 2");
        assert_eq!(label(&entry("X", Tier::None, Some("r"))), "Near Miss");
    }

    #[test]
    fn test_plain_text_sections() {
        let text = plain_text(&report(), false);
        assert!(text.contains("TIER 1 RECOMMENDED TRADES:\n\n  ALFA:\n    Price: $42.50\n"));
        assert!(text.contains("TIER 2 RECOMMENDED TRADES:\n  None\n"));
        assert!(text.contains("  BETA:\n    Failed: Volume 1,200,000 < 1.5M\n"));
    }

    #[test]
    fn test_plain_text_compact() {
        let text = plain_text(&report(), true);
        assert!(text.contains("TIER 1: ALFA\n"));
        assert!(text.contains("TIER 2: None\n"));
        assert!(text.contains("NEAR MISSES: BETA\n"));
        assert!(!text.contains("Price"));
    }
}
