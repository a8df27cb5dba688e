//! 财报候选标的筛选：分层校验、市场阈值调整、财报日历合并与批量扫描。

pub mod adjuster;
pub mod calendar;
pub mod scan;
pub mod validator;

pub use adjuster::{Adjustment, MarketConditionAdjuster};
pub use calendar::MergedCalendar;
pub use scan::{ScanError, Scanner, TickerAnalysis};
pub use validator::CandidateValidator;
