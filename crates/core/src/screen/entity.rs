use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// # Summary
/// 当前扫描周期使用的 IV/RV 阈值对。
///
/// # Invariants
/// - `near_miss <= pass`。
/// - 每个扫描周期开始时刷新一次，周期内只读，以值的形式传给校验器。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdState {
    // 达到此值视为通过
    pub iv_rv_pass: f64,
    // 低于此值视为失败，介于两者之间为 near-miss
    pub iv_rv_near_miss: f64,
}

impl Default for ThresholdState {
    fn default() -> Self {
        Self {
            iv_rv_pass: 1.25,
            iv_rv_near_miss: 1.00,
        }
    }
}

impl ThresholdState {
    /// # Summary
    /// 根据大盘参考标的的 IV/RV 比值选择阈值档位。
    ///
    /// # Logic
    /// 断点按从极端到常态依次匹配：
    /// 1. `<= 0.75` → 0.90 / 0.65
    /// 2. `<= 0.85` → 1.00 / 0.75
    /// 3. `<= 1.00` → 1.10 / 0.85
    /// 4. 其余 → 默认 1.25 / 1.00
    pub fn for_market_ratio(ratio: f64) -> Self {
        let (iv_rv_pass, iv_rv_near_miss) = if ratio <= 0.75 {
            (0.90, 0.65)
        } else if ratio <= 0.85 {
            (1.00, 0.75)
        } else if ratio <= 1.00 {
            (1.10, 0.85)
        } else {
            return Self::default();
        };
        Self {
            iv_rv_pass,
            iv_rv_near_miss,
        }
    }
}

/// # Summary
/// 候选标的分级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    // 未入选 (near-miss 或失败)
    None,
    // 全部软性条件通过
    One,
    // 仅有 near-miss 且期限结构更陡
    Two,
}

impl Tier {
    pub fn as_u8(&self) -> u8 {
        match self {
            Tier::None => 0,
            Tier::One => 1,
            Tier::Two => 2,
        }
    }
}

/// 指标表中的单个值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Integer(i64),
    Text(String),
}

impl MetricValue {
    /// 数值型指标转为 f64，文本返回 None
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            MetricValue::Integer(v) => Some(*v as f64),
            MetricValue::Text(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::Integer(i64::from(v))
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{:.4}", v),
            MetricValue::Integer(v) => write!(f, "{}", v),
            MetricValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// # Summary
/// 校验过程中累积的命名指标表。
///
/// # Invariants
/// - 键有序，便于确定性输出。
/// - 提前退出时也必须保留退出前已计算的全部指标。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics(BTreeMap<String, MetricValue>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetricValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.0.get(key)
    }

    /// 读取数值型指标
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(MetricValue::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.0.iter()
    }
}

/// # Summary
/// 单个候选标的的校验结论。
///
/// # Invariants
/// - `pass == (tier == One || tier == Two)`。
/// - `near_miss` 与 `pass` 互斥。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ticker: String,
    pub pass: bool,
    pub tier: Tier,
    pub near_miss: bool,
    pub reason: String,
    pub metrics: Metrics,
}

impl ValidationResult {
    /// 硬性条件失败时的结果，保留已累积的指标
    pub fn fail(ticker: &str, reason: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            ticker: ticker.to_string(),
            pass: false,
            tier: Tier::None,
            near_miss: false,
            reason: reason.into(),
            metrics,
        }
    }
}

/// # Summary
/// 一次完整扫描的输出。
///
/// # Invariants
/// - `recommended` 与 `near_misses` 均按 ticker 排序。
/// - `metrics` 只包含入选与 near-miss 的标的。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    // Tier 1 + Tier 2 标的
    pub recommended: Vec<String>,
    // (ticker, reason)
    pub near_misses: Vec<(String, String)>,
    // 各标的的指标表
    pub metrics: BTreeMap<String, Metrics>,
}

impl ScanOutcome {
    /// 按分级筛选推荐标的
    pub fn tier(&self, tier: Tier) -> Vec<String> {
        self.recommended
            .iter()
            .filter(|t| {
                self.metrics
                    .get(*t)
                    .and_then(|m| m.number("tier"))
                    .is_some_and(|v| (v - f64::from(tier.as_u8())).abs() < f64::EPSILON)
            })
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.recommended.is_empty() && self.near_misses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_breakpoints() {
        assert_eq!(
            ThresholdState::for_market_ratio(0.70),
            ThresholdState {
                iv_rv_pass: 0.90,
                iv_rv_near_miss: 0.65
            }
        );
        assert_eq!(ThresholdState::for_market_ratio(0.75).iv_rv_pass, 0.90);
        assert_eq!(ThresholdState::for_market_ratio(0.80).iv_rv_pass, 1.00);
        assert_eq!(ThresholdState::for_market_ratio(1.00).iv_rv_near_miss, 0.85);
        assert_eq!(
            ThresholdState::for_market_ratio(1.3),
            ThresholdState::default()
        );
    }

    #[test]
    fn test_metrics_serialize_untagged() {
        let mut m = Metrics::new();
        m.insert("price", 12.5);
        m.insert("tier", 1_i64);
        m.insert("expected_move", "5.20%");
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(
            json,
            r#"{"expected_move":"5.20%","price":12.5,"tier":1}"#
        );
        assert_eq!(m.number("tier"), Some(1.0));
        assert_eq!(m.number("expected_move"), None);
    }
}
