use thiserror::Error;

/// # Summary
/// 外部数据源 (行情、期权链、财报日历、胜率页面) 的错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 需要 `Clone + PartialEq`，以便测试替身按预设返回同一错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    // 网络层错误或非预期的 HTTP 状态
    #[error("Network error: {0}")]
    Network(String),
    // 响应体或页面结构无法解析
    #[error("Parse error: {0}")]
    Parse(String),
    // 标的或到期日不存在 (404 或内容为空)
    #[error("Data not found")]
    NotFound,
    // 数据源返回 429，参数为数据源名称
    #[error("Rate limited by {0}")]
    RateLimited(String),
    // 数据源自身报告的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
