pub mod time;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 历史行情回溯周期枚举，对应行情源支持的时间跨度。
///
/// # Invariants
/// - 周期越长，返回的日线数量越多；具体条数由数据源决定（节假日不补齐）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HistoryPeriod {
    // 最近 1 个交易日 (用于读取最新价)
    OneDay,
    // 最近 1 个月
    OneMonth,
    // 最近 3 个月 (用于历史波动率)
    ThreeMonths,
}

impl HistoryPeriod {
    /// 该周期覆盖的自然日天数，供按时间区间查询的数据源换算起止时间。
    pub fn calendar_days(&self) -> i64 {
        match self {
            HistoryPeriod::OneDay => 5,
            HistoryPeriod::OneMonth => 31,
            HistoryPeriod::ThreeMonths => 92,
        }
    }
}

impl FromStr for HistoryPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1d" | "oneday" => Ok(HistoryPeriod::OneDay),
            "1mo" | "onemonth" => Ok(HistoryPeriod::OneMonth),
            "3mo" | "threemonths" => Ok(HistoryPeriod::ThreeMonths),
            _ => Err(format!("Unknown HistoryPeriod: {}", s)),
        }
    }
}

impl std::fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryPeriod::OneDay => write!(f, "1d"),
            HistoryPeriod::OneMonth => write!(f, "1mo"),
            HistoryPeriod::ThreeMonths => write!(f, "3mo"),
        }
    }
}

/// # Summary
/// 规范化证券代码：去除首尾空白并转为大写。
///
/// # Returns
/// 规范化后为空串时返回 None。
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() { None } else { Some(symbol) }
}

/// # Summary
/// 千分位格式化，四舍五入到整数，例如 1234567.8 -> "1,234,568"。
///
/// # Returns
/// 非有限值原样输出；舍入后为 0 的负数不带符号。
pub fn format_count(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let digits = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0.0 && digits != "0" {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
