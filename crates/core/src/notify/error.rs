use thiserror::Error;

/// # Summary
/// 通知服务错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 网络连接或传输错误
    #[error("Network error: {0}")]
    Network(String),

    /// 配置错误 (如 Webhook 地址或邮箱地址非法)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 报告内容无法组装为目标平台的消息格式
    #[error("Payload error: {0}")]
    Payload(String),

    /// 推送平台返回的错误 (如 Discord 返回 4xx)
    #[error("Platform error ({status}): {body}")]
    Platform { status: u16, body: String },
}
