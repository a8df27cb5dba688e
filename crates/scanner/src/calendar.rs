use crate::scan::ScanError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Timelike};
use chrono_tz::Tz;
use crush_core::common::normalize_symbol;
use crush_core::market::entity::{EarningsEvent, EarningsTiming};
use crush_core::market::error::MarketError;
use crush_core::market::port::EarningsCalendarProvider;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 美东收盘时刻 (小时)
pub const MARKET_CLOSE_HOUR: u32 = 16;

/// 命令行日期格式 MM/DD/YYYY
pub const SCAN_DATE_FORMAT: &str = "%m/%d/%Y";

/// 解析命令行传入的扫描日期
pub fn parse_scan_date(raw: &str) -> Result<NaiveDate, ScanError> {
    NaiveDate::parse_from_str(raw.trim(), SCAN_DATE_FORMAT)
        .map_err(|e| ScanError::InvalidDate(format!("{} ({}), expected MM/DD/YYYY", raw, e)))
}

/// # Summary
/// 计算 (盘后日期, 盘前日期)。
///
/// # Logic
/// 1. 指定日期 D 时返回 (D, D+1)。
/// 2. 未指定时按美东时间：16:00 前盘后日期为今天，否则为明天；盘前日期为盘后日期 +1。
pub fn resolve_scan_dates(input: Option<NaiveDate>, now: DateTime<Tz>) -> (NaiveDate, NaiveDate) {
    let post = input.unwrap_or_else(|| {
        let today = now.date_naive();
        if now.hour() < MARKET_CLOSE_HOUR {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    });
    (post, post + ChronoDuration::days(1))
}

/// # Summary
/// 按优先级合并多个数据源的财报记录。
///
/// # Logic
/// 1. ticker 去空白转大写，空代码丢弃。
/// 2. ticker 第一次出现的位置即最终位置。
/// 3. 后出现的同一 ticker 仅在已保留时段为 Unknown 且新时段已知时替换时段。
///
/// # Arguments
/// * `batches`: 各数据源结果，按优先级从高到低排列。
pub fn merge_earnings(batches: impl IntoIterator<Item = Vec<EarningsEvent>>) -> Vec<EarningsEvent> {
    let mut merged: Vec<EarningsEvent> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in batches.into_iter().flatten() {
        let Some(ticker) = normalize_symbol(&event.ticker) else {
            continue;
        };
        match index.get(&ticker) {
            Some(&i) => {
                let kept = &mut merged[i];
                if !kept.timing.is_known() && event.timing.is_known() {
                    kept.timing = event.timing;
                }
            }
            None => {
                index.insert(ticker.clone(), merged.len());
                merged.push(EarningsEvent::new(ticker, event.timing));
            }
        }
    }
    merged
}

/// # Summary
/// 选出候选标的：盘后日期的 Post Market 加上盘前日期的 Pre Market。
///
/// # Returns
/// 去重后的 ticker 列表，保持首次出现的顺序。
pub fn select_candidates(post: &[EarningsEvent], pre: &[EarningsEvent]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    post.iter()
        .filter(|e| e.timing == EarningsTiming::PostMarket)
        .chain(pre.iter().filter(|e| e.timing == EarningsTiming::PreMarket))
        .filter_map(|e| normalize_symbol(&e.ticker))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// # Summary
/// 多数据源财报日历，对外表现为单个 `EarningsCalendarProvider`。
///
/// # Invariants
/// - 数据源按优先级排列，并发查询，结果按优先级合并。
/// - 单个数据源失败只记录告警；全部失败时返回最后一个错误。
pub struct MergedCalendar {
    providers: Vec<Arc<dyn EarningsCalendarProvider>>,
}

impl MergedCalendar {
    pub fn new(providers: Vec<Arc<dyn EarningsCalendarProvider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl EarningsCalendarProvider for MergedCalendar {
    fn name(&self) -> &str {
        "merged"
    }

    async fn get_earnings(&self, date: NaiveDate) -> Result<Vec<EarningsEvent>, MarketError> {
        if self.providers.is_empty() {
            return Err(MarketError::Unknown(
                "no earnings calendar configured".to_string(),
            ));
        }

        let results = join_all(self.providers.iter().map(|p| p.get_earnings(date))).await;

        let mut batches = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(events) => {
                    debug!("{}: {} events on {}", provider.name(), events.len(), date);
                    batches.push(events);
                }
                Err(e) => {
                    warn!("Earnings source {} failed for {}: {}", provider.name(), date, e);
                    last_error = Some(e);
                }
            }
        }

        match (batches.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(merge_earnings(batches)),
        }
    }
}
