use crate::analysis::entity::AnalysisResult;
use crate::analysis::error::AnalysisError;
use async_trait::async_trait;

/// # Summary
/// 单标的波动率分析接口。
///
/// # Invariants
/// - 同一数据快照下结果确定，不缓存。
/// - 失败以 `AnalysisError` 返回，不得 panic。
#[async_trait]
pub trait VolatilityAnalyzer: Send + Sync {
    /// # Summary
    /// 计算单个标的的波动率分析结果。
    ///
    /// # Arguments
    /// * `ticker`: 证券代码。
    async fn compute(&self, ticker: &str) -> Result<AnalysisResult, AnalysisError>;
}
