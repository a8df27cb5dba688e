use crate::adjuster::{Adjustment, MarketConditionAdjuster};
use crate::calendar::{resolve_scan_dates, select_candidates};
use crate::validator::CandidateValidator;
use chrono::NaiveDate;
use crush_core::common::time::TimeProvider;
use crush_core::config::ScanConfig;
use crush_core::market::error::MarketError;
use crush_core::market::port::EarningsCalendarProvider;
use crush_core::screen::entity::{ScanOutcome, ThresholdState, ValidationResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// # Summary
/// 扫描层的统一错误类型。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Earnings calendar unavailable: {0}")]
    Calendar(#[from] MarketError),
}

/// 单标的分析 (`--analyze`) 的输出
#[derive(Debug, Clone, PartialEq)]
pub struct TickerAnalysis {
    pub result: ValidationResult,
    pub adjustment: Adjustment,
}

/// # Summary
/// 财报扫描器：刷新阈值、拉取财报日历、并发校验候选标的并汇总分级结果。
///
/// # Invariants
/// - 阈值每个扫描周期刷新一次，刷新后以值的形式传给所有校验任务，周期内不变。
/// - 单个候选标的失败或超时只会让它从结果中消失，不会中断整批扫描。
/// - 输出列表按 ticker 排序。
pub struct Scanner {
    // 候选标的校验器
    validator: Arc<CandidateValidator>,
    // 阈值调整器
    adjuster: MarketConditionAdjuster,
    // 财报日历 (通常为 MergedCalendar)
    calendar: Arc<dyn EarningsCalendarProvider>,
    // 时钟，用于确定扫描日期
    clock: Arc<dyn TimeProvider>,
    // 扫描参数
    config: ScanConfig,
    // 跨周期保留的阈值，参考标的失败时沿用
    thresholds: RwLock<ThresholdState>,
}

impl Scanner {
    pub fn new(
        validator: Arc<CandidateValidator>,
        adjuster: MarketConditionAdjuster,
        calendar: Arc<dyn EarningsCalendarProvider>,
        clock: Arc<dyn TimeProvider>,
        config: ScanConfig,
    ) -> Self {
        Self {
            validator,
            adjuster,
            calendar,
            clock,
            config,
            thresholds: RwLock::new(ThresholdState::default()),
        }
    }

    /// 当前生效的阈值
    pub async fn thresholds(&self) -> ThresholdState {
        *self.thresholds.read().await
    }

    /// # Summary
    /// 刷新阈值并保存，失败时保留上一周期的值。
    pub async fn refresh_thresholds(&self) -> Adjustment {
        let prior = self.thresholds().await;
        let adjustment = self.adjuster.refresh(prior).await;
        *self.thresholds.write().await = adjustment.thresholds;
        adjustment
    }

    /// # Summary
    /// 对单个标的执行完整校验。
    ///
    /// # Returns
    /// 校验结果（含全部指标）及本次使用的阈值与参考比值。
    pub async fn analyze(&self, ticker: &str) -> TickerAnalysis {
        let adjustment = self.refresh_thresholds().await;
        let result = self
            .validator
            .validate(ticker, &adjustment.thresholds)
            .await;
        TickerAnalysis { result, adjustment }
    }

    /// # Summary
    /// 执行一次财报扫描。
    ///
    /// # Logic
    /// 1. 刷新阈值。
    /// 2. 解析扫描日期，并发拉取盘后/盘前两天的财报日历，挑选候选标的。
    /// 3. `workers > 0` 时以 `min(workers, max_workers)` 的并发度校验，否则按批顺序校验。
    /// 4. 通过者进入推荐列表，near-miss 进入 near-miss 列表，其余丢弃。
    ///
    /// # Arguments
    /// * `date`: 盘后日期，None 时按美东当前时间推算。
    /// * `workers`: 并发度，0 表示顺序批处理。
    ///
    /// # Returns
    /// 两天的日历都不可用时返回 `ScanError::Calendar`。
    pub async fn scan(
        &self,
        date: Option<NaiveDate>,
        workers: usize,
    ) -> Result<ScanOutcome, ScanError> {
        let thresholds = self.refresh_thresholds().await.thresholds;

        let (post_date, pre_date) = resolve_scan_dates(date, self.clock.market_now());
        info!(
            "Scanning post-market {} and pre-market {}",
            post_date, pre_date
        );
        let (post, pre) = tokio::join!(
            self.calendar.get_earnings(post_date),
            self.calendar.get_earnings(pre_date)
        );
        let (post, pre) = match (post, pre) {
            (Err(e), Err(_)) => return Err(ScanError::Calendar(e)),
            (post, pre) => (
                post.unwrap_or_else(|e| {
                    warn!("No earnings for {}: {}", post_date, e);
                    Vec::new()
                }),
                pre.unwrap_or_else(|e| {
                    warn!("No earnings for {}: {}", pre_date, e);
                    Vec::new()
                }),
            ),
        };

        let candidates = select_candidates(&post, &pre);
        info!("Found {} initial candidates", candidates.len());

        let results = if workers > 0 {
            let effective = workers.min(self.config.max_workers.max(1));
            info!("Using parallel processing with {} workers", effective);
            self.run_parallel(candidates, effective, thresholds).await
        } else {
            self.run_batched(candidates, thresholds).await
        };

        Ok(collect(results))
    }

    fn candidate_timeout(&self) -> Duration {
        Duration::from_secs(self.config.candidate_timeout_secs)
    }

    async fn run_parallel(
        &self,
        candidates: Vec<String>,
        workers: usize,
        thresholds: ThresholdState,
    ) -> Vec<ValidationResult> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let limit = self.candidate_timeout();
        let mut set = JoinSet::new();

        for ticker in candidates {
            let validator = self.validator.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                validate_bounded(&validator, &ticker, thresholds, limit).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => error!("Validation task aborted: {}", e),
            }
        }
        results
    }

    async fn run_batched(
        &self,
        candidates: Vec<String>,
        thresholds: ThresholdState,
    ) -> Vec<ValidationResult> {
        let limit = self.candidate_timeout();
        let pause = Duration::from_secs(self.config.batch_pause_secs);
        let mut results = Vec::with_capacity(candidates.len());

        for (i, batch) in candidates.chunks(self.config.batch_size.max(1)).enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            for ticker in batch {
                if let Some(result) = validate_bounded(&self.validator, ticker, thresholds, limit).await {
                    results.push(result);
                }
            }
        }
        results
    }
}

/// 带超时的单标的校验，超时记录错误并返回 None
async fn validate_bounded(
    validator: &CandidateValidator,
    ticker: &str,
    thresholds: ThresholdState,
    limit: Duration,
) -> Option<ValidationResult> {
    match tokio::time::timeout(limit, validator.validate(ticker, &thresholds)).await {
        Ok(result) => Some(result),
        Err(_) => {
            error!("Error processing {}: timed out after {:?}", ticker, limit);
            None
        }
    }
}

/// # Summary
/// 把校验结果归入推荐与 near-miss 两个列表，并按 ticker 排序。
pub fn collect(results: Vec<ValidationResult>) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    for result in results {
        if result.pass {
            outcome.recommended.push(result.ticker.clone());
        } else if result.near_miss {
            outcome
                .near_misses
                .push((result.ticker.clone(), result.reason.clone()));
        } else {
            debug!("{} rejected: {}", result.ticker, result.reason);
            continue;
        }
        outcome.metrics.insert(result.ticker, result.metrics);
    }
    outcome.recommended.sort();
    outcome.near_misses.sort_by(|a, b| a.0.cmp(&b.0));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crush_core::screen::entity::{Metrics, Tier};

    fn result(ticker: &str, tier: Tier, near_miss: bool) -> ValidationResult {
        ValidationResult {
            ticker: ticker.to_string(),
            pass: tier != Tier::None,
            tier,
            near_miss,
            reason: format!("{} reason", ticker),
            metrics: Metrics::new(),
        }
    }

    #[test]
    fn test_collect_sorts_and_drops_failures() {
        let outcome = collect(vec![
            result("ZZZ", Tier::One, false),
            result("BBB", Tier::None, true),
            result("AAA", Tier::Two, false),
            result("CCC", Tier::None, false),
            result("ABC", Tier::None, true),
        ]);
        assert_eq!(outcome.recommended, vec!["AAA", "ZZZ"]);
        assert_eq!(
            outcome.near_misses,
            vec![
                ("ABC".to_string(), "ABC reason".to_string()),
                ("BBB".to_string(), "BBB reason".to_string())
            ]
        );
        assert_eq!(outcome.metrics.len(), 4);
        assert!(!outcome.metrics.contains_key("CCC"));
    }
}
