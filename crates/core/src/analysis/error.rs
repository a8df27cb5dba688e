use crate::market::error::MarketError;
use thiserror::Error;

/// # Summary
/// 波动率分析域错误枚举。
///
/// # Invariants
/// - 除零型退化输入（斜率、IV/RV 比值）以哨兵值处理，不进入此枚举。
/// - 所有变体都会以 `reason` 字符串的形式出现在单个候选标的的结果中，不会中断整批扫描。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    // 未提供证券代码
    #[error("No symbol provided.")]
    EmptySymbol,
    // 该证券没有挂牌期权
    #[error("No options for {0}.")]
    NoOptions(String),
    // 行情为空
    #[error("No price data available")]
    NoPriceData,
    // 过滤后没有双边都有报价的到期日
    #[error("Could not calculate ATM IVs")]
    NoUsableExpirations,
    // 历史数据不足以计算任何波动率
    #[error("Insufficient price history for volatility estimate")]
    InsufficientHistory,
    // 期限结构构建失败
    #[error("Term structure interpolation failed: {0}")]
    Interpolation(String),
    // 辅助字段解析失败 (可通过兜底计算恢复)
    #[error("Parse failure: {0}")]
    Parse(String),
    // 外部数据源调用失败
    #[error("Provider failure: {0}")]
    Provider(#[from] MarketError),
}
