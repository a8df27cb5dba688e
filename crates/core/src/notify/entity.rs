use crate::screen::entity::{Metrics, ScanOutcome, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 报告中单个标的的展示条目。
///
/// # Invariants
/// - 缺失的数值指标以 0 展示，与控制台输出保持一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub ticker: String,
    pub tier: Tier,
    // near-miss 的失败原因
    pub reason: Option<String>,
    pub price: f64,
    pub volume: f64,
    pub win_rate: f64,
    pub win_quarters: i64,
    pub iv_rv_ratio: f64,
    pub term_structure: f64,
}

impl ReportEntry {
    /// 从指标表构建展示条目
    pub fn from_metrics(ticker: &str, tier: Tier, reason: Option<String>, m: &Metrics) -> Self {
        let number = |key: &str| m.number(key).unwrap_or(0.0);
        #[allow(clippy::cast_possible_truncation)]
        let win_quarters = number("win_quarters").round() as i64;
        Self {
            ticker: ticker.to_string(),
            tier,
            reason,
            price: number("price"),
            volume: number("volume"),
            win_rate: number("win_rate"),
            win_quarters,
            iv_rv_ratio: number("iv_rv_ratio"),
            term_structure: number("term_structure"),
        }
    }
}

/// # Summary
/// 推送给外部通知渠道的结构化扫描报告。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub tier1: Vec<ReportEntry>,
    pub tier2: Vec<ReportEntry>,
    pub near_misses: Vec<ReportEntry>,
}

impl ScanReport {
    /// # Summary
    /// 将扫描结果转换为报告。
    ///
    /// # Logic
    /// 1. 按指标表中的 `tier` 拆分 Tier 1 / Tier 2。
    /// 2. near-miss 附带失败原因。
    pub fn from_outcome(outcome: &ScanOutcome, generated_at: DateTime<Utc>) -> Self {
        let empty = Metrics::new();
        let entries = |tier: Tier| {
            outcome
                .tier(tier)
                .iter()
                .map(|t| {
                    ReportEntry::from_metrics(t, tier, None, outcome.metrics.get(t).unwrap_or(&empty))
                })
                .collect::<Vec<_>>()
        };
        let near_misses = outcome
            .near_misses
            .iter()
            .map(|(t, reason)| {
                ReportEntry::from_metrics(
                    t,
                    Tier::None,
                    Some(reason.clone()),
                    outcome.metrics.get(t).unwrap_or(&empty),
                )
            })
            .collect();

        Self {
            title: "Earnings Scanner Results".to_string(),
            generated_at,
            tier1: entries(Tier::One),
            tier2: entries(Tier::Two),
            near_misses,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tier1.is_empty() && self.tier2.is_empty() && self.near_misses.is_empty()
    }
}
