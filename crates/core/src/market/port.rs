use crate::common::HistoryPeriod;
use crate::market::entity::{EarningsEvent, OptionChain, PriceBar, WinRate};
use crate::market::error::MarketError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// # Summary
/// 日线历史行情提供者接口。
///
/// # Invariants
/// - 返回序列必须按日期升序。
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// # Summary
    /// 获取指定证券在回溯周期内的日线数据。
    ///
    /// # Arguments
    /// * `ticker`: 证券代码。
    /// * `period`: 回溯周期。
    ///
    /// # Returns
    /// 成功返回日线列表（可能为空），失败返回 MarketError。
    async fn get_history(
        &self,
        ticker: &str,
        period: HistoryPeriod,
    ) -> Result<Vec<PriceBar>, MarketError>;
}

/// # Summary
/// 期权链数据提供者接口。
#[async_trait]
pub trait OptionsProvider: Send + Sync {
    /// # Summary
    /// 列出证券所有可交易的到期日。
    ///
    /// # Returns
    /// 按日期升序的到期日列表；无期权时返回空列表。
    async fn list_expirations(&self, ticker: &str) -> Result<Vec<NaiveDate>, MarketError>;

    /// # Summary
    /// 获取单个到期日的完整期权链。
    ///
    /// # Arguments
    /// * `ticker`: 证券代码。
    /// * `expiration`: 到期日，必须来自 `list_expirations` 的返回值。
    async fn get_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<OptionChain, MarketError>;
}

/// # Summary
/// 财报日历提供者接口。
///
/// # Invariants
/// - 同一数据源内 ticker 唯一；多数据源的合并策略由上层负责。
#[async_trait]
pub trait EarningsCalendarProvider: Send + Sync {
    /// 数据源名称，用于日志
    fn name(&self) -> &str;

    /// # Summary
    /// 获取指定日期发布财报的证券列表。
    async fn get_earnings(&self, date: NaiveDate) -> Result<Vec<EarningsEvent>, MarketError>;
}

/// # Summary
/// 历史财报胜率信号提供者接口。
///
/// # Invariants
/// - 实现内部自行完成有限次重试；调用方在失败时使用 0/0 默认值。
#[async_trait]
pub trait SentimentSignalProvider: Send + Sync {
    async fn get_win_rate(&self, ticker: &str) -> Result<WinRate, MarketError>;
}
