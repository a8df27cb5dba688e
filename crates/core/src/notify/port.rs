use crate::notify::entity::ScanReport;
use crate::notify::error::NotifyError;
use async_trait::async_trait;

/// # Summary
/// 扫描报告的外部推送渠道接口。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync` 以支持并发调用。
/// - 推送失败只返回错误，由调用方记录日志，不得中断扫描。
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 渠道名称，用于日志
    fn name(&self) -> &str;

    /// # Summary
    /// 推送一份结构化扫描报告。
    ///
    /// # Logic
    /// 1. 根据目标平台要求格式化报告。
    /// 2. 通过底层传输协议发送。
    ///
    /// # Arguments
    /// * `report` - 扫描报告。
    ///
    /// # Returns
    /// * 成功返回 `Ok(())`。
    /// * 失败返回 `Err(NotifyError)`。
    async fn deliver(&self, report: &ScanReport) -> Result<(), NotifyError>;
}
