use crush_core::analysis::port::VolatilityAnalyzer;
use crush_core::screen::entity::ThresholdState;
use std::sync::Arc;
use tracing::{info, warn};

/// 一次阈值刷新的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    // 本周期使用的阈值
    pub thresholds: ThresholdState,
    // 参考标的的 IV/RV，计算失败时为 None
    pub reference_ratio: Option<f64>,
}

/// # Summary
/// 根据大盘参考标的的 IV/RV 比值调整校验阈值。
///
/// # Invariants
/// - 不持有阈值状态，上一周期的阈值由调用方传入。
/// - 参考标的计算失败不是致命错误：沿用上一周期的阈值。
pub struct MarketConditionAdjuster {
    analyzer: Arc<dyn VolatilityAnalyzer>,
    reference_symbol: String,
}

impl MarketConditionAdjuster {
    pub fn new(analyzer: Arc<dyn VolatilityAnalyzer>, reference_symbol: impl Into<String>) -> Self {
        Self {
            analyzer,
            reference_symbol: reference_symbol.into(),
        }
    }

    pub fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    /// # Summary
    /// 计算本周期的阈值。
    ///
    /// # Arguments
    /// * `prior`: 上一周期的阈值，参考标的失败时原样返回。
    pub async fn refresh(&self, prior: ThresholdState) -> Adjustment {
        match self.analyzer.compute(&self.reference_symbol).await {
            Ok(analysis) => {
                let ratio = analysis.iv_rv_ratio;
                let thresholds = ThresholdState::for_market_ratio(ratio);
                info!(
                    "Current {} IV/RV ratio: {:.2}. Thresholds - Pass: {:.2}, Near Miss: {:.2}",
                    self.reference_symbol, ratio, thresholds.iv_rv_pass, thresholds.iv_rv_near_miss
                );
                Adjustment {
                    thresholds,
                    reference_ratio: Some(ratio),
                }
            }
            Err(e) => {
                warn!(
                    "Could not calculate {} IV/RV: {}. Keeping thresholds - Pass: {:.2}, Near Miss: {:.2}",
                    self.reference_symbol, e, prior.iv_rv_pass, prior.iv_rv_near_miss
                );
                Adjustment {
                    thresholds: prior,
                    reference_ratio: None,
                }
            }
        }
    }
}
