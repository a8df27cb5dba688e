use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根日线数据实体。
///
/// # Invariants
/// - 序列按日期升序排列；允许缺口（停牌、节假日），不做补齐。
/// - `high` 应大于或等于 `low`, `open`, `close`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    // 交易日
    pub date: NaiveDate,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: f64,
}

/// # Summary
/// 单个期权合约报价，隶属于某个 (到期日, 方向) 组合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    // 行权价
    pub strike: f64,
    // 买一价
    pub bid: f64,
    // 卖一价
    pub ask: f64,
    // 隐含波动率 (年化小数，例如 0.45)
    pub implied_volatility: f64,
    // 未平仓合约数
    pub open_interest: u64,
    // Delta (部分数据源不提供)
    pub delta: Option<f64>,
}

impl OptionQuote {
    /// 买卖中间价
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// # Summary
/// 单个到期日的期权链。
///
/// # Invariants
/// - 同一方向内行权价唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    // 到期日
    pub expiration: NaiveDate,
    // 看涨期权
    pub calls: Vec<OptionQuote>,
    // 看跌期权
    pub puts: Vec<OptionQuote>,
}

impl OptionChain {
    /// 看涨与看跌两侧都有报价时才视为可用
    pub fn is_usable(&self) -> bool {
        !self.calls.is_empty() && !self.puts.is_empty()
    }

    /// 两侧未平仓合约总数
    pub fn total_open_interest(&self) -> u64 {
        self.calls
            .iter()
            .chain(self.puts.iter())
            .map(|q| q.open_interest)
            .sum()
    }
}

/// # Summary
/// 财报发布时段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EarningsTiming {
    PreMarket,
    PostMarket,
    DuringMarket,
    Unknown,
}

impl EarningsTiming {
    /// 是否为已知时段
    pub fn is_known(&self) -> bool {
        !matches!(self, EarningsTiming::Unknown)
    }
}

impl std::fmt::Display for EarningsTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarningsTiming::PreMarket => write!(f, "Pre Market"),
            EarningsTiming::PostMarket => write!(f, "Post Market"),
            EarningsTiming::DuringMarket => write!(f, "During Market"),
            EarningsTiming::Unknown => write!(f, "Unknown"),
        }
    }
}

/// # Summary
/// 财报日历中的一条记录，即一个待筛选的候选标的。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsEvent {
    // 证券代码（大写）
    pub ticker: String,
    // 发布时段
    pub timing: EarningsTiming,
}

impl EarningsEvent {
    pub fn new(ticker: impl Into<String>, timing: EarningsTiming) -> Self {
        Self {
            ticker: ticker.into(),
            timing,
        }
    }
}

/// # Summary
/// 历史财报中隐含波动被高估的胜率信号。
///
/// # Invariants
/// - `win_rate` 为百分比数值 (0-100)。
/// - 数据源失败时以 `WinRate::default()` (0/0) 兜底。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WinRate {
    // 胜率百分比
    pub win_rate: f64,
    // 统计覆盖的季度数
    pub quarters: u32,
}
