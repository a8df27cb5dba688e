use async_trait::async_trait;
use crush_core::market::error::MarketError;
use futures::future::BoxFuture;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// # Summary
/// 会话工厂：负责打开会话并判断会话是否已经不可用。
///
/// # Invariants
/// - `is_stale` 必须是纯判断，不得产生 IO。
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Send;

    /// 打开一个新会话
    async fn open(&self) -> Result<Self::Session, MarketError>;

    /// 会话是否已陈旧 (需要重新打开)
    fn is_stale(&self, session: &Self::Session) -> bool;
}

/// 会话池健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Healthy,
    // 正在重试，attempt 为已失败的次数
    DegradedRetrying { attempt: u32 },
    // 最近一次调用耗尽了全部重试
    Failed,
}

/// # Summary
/// 单槽位会话池：同一时刻只有一个任务持有会话。
///
/// # Invariants
/// - 会话在获取时做健康检查，陈旧会话先关闭再重新打开。
/// - 任务失败时强制丢弃当前会话，等待退避时间后重试，最多 `max_retries` 次。
/// - 每次调用都从新的重试周期开始，上一次的 `Failed` 不会阻止后续调用。
pub struct SessionPool<F: SessionFactory> {
    factory: F,
    // 会话槽位，异步锁保证串行使用
    slot: Mutex<Option<F::Session>>,
    state: RwLock<PoolState>,
    max_retries: u32,
    backoff: Duration,
}

impl<F: SessionFactory> SessionPool<F> {
    pub fn new(factory: F, max_retries: u32, backoff: Duration) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
            state: RwLock::new(PoolState::Healthy),
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    /// 当前健康状态
    pub fn state(&self) -> PoolState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PoolState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// 取出可用会话，必要时重新打开
    async fn ensure_session<'s>(
        &self,
        slot: &'s mut Option<F::Session>,
    ) -> Result<&'s mut F::Session, MarketError> {
        if slot.as_ref().is_some_and(|s| self.factory.is_stale(s)) {
            debug!("Session is stale, reopening");
            *slot = None;
        }
        let session = match slot.take() {
            Some(session) => session,
            None => self.factory.open().await?,
        };
        Ok(slot.insert(session))
    }

    /// # Summary
    /// 在池内会话上执行任务，失败时重置会话并重试。
    ///
    /// # Logic
    /// 1. 获取槽位锁，确保会话存在且未陈旧。
    /// 2. 执行任务，成功则标记 `Healthy` 并返回。
    /// 3. 失败 (包括打开会话失败) 时标记 `DegradedRetrying`，丢弃会话，退避后重试。
    /// 4. 重试耗尽标记 `Failed`，返回最后一个错误。
    ///
    /// # Arguments
    /// * `task`: 接收会话可变引用的异步任务，可被多次调用。
    pub async fn execute<T, Task>(&self, task: Task) -> Result<T, MarketError>
    where
        T: Send,
        Task: for<'a> Fn(&'a mut F::Session) -> BoxFuture<'a, Result<T, MarketError>> + Send + Sync,
    {
        let mut slot = self.slot.lock().await;
        let mut last_error = MarketError::Unknown("session task never ran".to_string());

        for attempt in 1..=self.max_retries {
            let outcome = match self.ensure_session(&mut slot).await {
                Ok(session) => task(session).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    self.set_state(PoolState::Healthy);
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        "Session task failed (attempt {}/{}): {}",
                        attempt, self.max_retries, e
                    );
                    self.set_state(PoolState::DegradedRetrying { attempt });
                    *slot = None;
                    last_error = e;
                    if attempt < self.max_retries && !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        error!("Session retries exhausted: {}", last_error);
        self.set_state(PoolState::Failed);
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSession {
        id: u32,
        uses: u32,
    }

    /// 记录同时进行中的会话操作数及其峰值
    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicU32,
        peak: AtomicU32,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        opened: AtomicU32,
        fail_opens: AtomicU32,
        max_uses: u32,
        // 打开会话也计入进行中的操作
        gauge: Arc<Gauge>,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        type Session = CountingSession;

        async fn open(&self) -> Result<CountingSession, MarketError> {
            self.gauge.enter();
            tokio::task::yield_now().await;
            self.gauge.exit();
            if self
                .fail_opens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(MarketError::Network("browser refused to start".into()));
            }
            let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CountingSession { id, uses: 0 })
        }

        fn is_stale(&self, session: &CountingSession) -> bool {
            self.max_uses > 0 && session.uses >= self.max_uses
        }
    }

    fn pool(factory: CountingFactory, retries: u32) -> SessionPool<CountingFactory> {
        SessionPool::new(factory, retries, Duration::from_millis(500))
    }

    fn task<T>(t: T) -> T
    where
        T: for<'a> Fn(&'a mut CountingSession) -> BoxFuture<'a, Result<u32, MarketError>>,
    {
        t
    }

    /// 前 `failures` 次调用失败，之后返回会话 id
    fn flaky(
        failures: u32,
    ) -> impl for<'a> Fn(&'a mut CountingSession) -> BoxFuture<'a, Result<u32, MarketError>>
    + Send
    + Sync {
        let calls = Arc::new(AtomicU32::new(0));
        task(move |session| {
            let calls = calls.clone();
            async move {
                session.uses += 1;
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    Err(MarketError::Parse("section missing".into()))
                } else {
                    Ok(session.id)
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let pool = pool(CountingFactory::default(), 3);
        for _ in 0..3 {
            assert_eq!(pool.execute(flaky(0)).await, Ok(1));
        }
        assert_eq!(pool.factory.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.state(), PoolState::Healthy);
    }

    #[tokio::test]
    async fn test_stale_session_is_reopened() {
        let factory = CountingFactory {
            max_uses: 2,
            ..Default::default()
        };
        let pool = pool(factory, 3);
        let ids = [
            pool.execute(flaky(0)).await,
            pool.execute(flaky(0)).await,
            pool.execute(flaky(0)).await,
        ];
        assert_eq!(ids, [Ok(1), Ok(1), Ok(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resets_session_then_recovers() {
        let pool = pool(CountingFactory::default(), 3);
        let started = tokio::time::Instant::now();

        // 前两次失败，每次都换新会话，第三次在第 3 个会话上成功
        assert_eq!(pool.execute(flaky(2)).await, Ok(3));
        assert_eq!(pool.state(), PoolState::Healthy);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_marks_failed_next_call_starts_fresh() {
        let pool = pool(CountingFactory::default(), 2);

        let result = pool.execute(flaky(5)).await;
        assert_eq!(result, Err(MarketError::Parse("section missing".into())));
        assert_eq!(pool.state(), PoolState::Failed);

        assert_eq!(pool.execute(flaky(1)).await, Ok(4));
        assert_eq!(pool.state(), PoolState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_counts_as_attempt() {
        let factory = CountingFactory {
            fail_opens: AtomicU32::new(1),
            ..Default::default()
        };
        let pool = pool(factory, 2);
        assert_eq!(pool.execute(flaky(0)).await, Ok(1));

        let factory = CountingFactory {
            fail_opens: AtomicU32::new(2),
            ..Default::default()
        };
        let pool = SessionPool::new(factory, 2, Duration::ZERO);
        assert_eq!(
            pool.execute(flaky(0)).await,
            Err(MarketError::Network("browser refused to start".into()))
        );
        assert_eq!(pool.state(), PoolState::Failed);
    }

    /// # Summary
    /// 并发调用时会话操作严格串行，重置与重开都发生在持锁期间。
    ///
    /// # Logic
    /// 1. 六个调用同时进入 `execute`，每个任务在会话上停留 10ms。
    /// 2. 每第三次任务调用失败，触发会话重置；会话用满两次即陈旧。
    /// 3. 任务与打开会话共用同一个计数器，峰值必须为 1。
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_are_serialized() {
        let gauge = Arc::new(Gauge::default());
        let factory = CountingFactory {
            max_uses: 2,
            gauge: gauge.clone(),
            ..Default::default()
        };
        let pool = pool(factory, 3);
        let calls = Arc::new(AtomicU32::new(0));

        let results = futures::future::join_all((0..6).map(|_| {
            let gauge = gauge.clone();
            let calls = calls.clone();
            pool.execute(task(move |session| {
                let gauge = gauge.clone();
                let calls = calls.clone();
                async move {
                    gauge.enter();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    session.uses += 1;
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    gauge.exit();
                    if n % 3 == 1 {
                        Err(MarketError::Parse("section missing".into()))
                    } else {
                        Ok(session.id)
                    }
                }
                .boxed()
            }))
        }))
        .await;

        assert!(results.iter().all(Result::is_ok), "{:?}", results);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        assert_eq!(gauge.in_flight.load(Ordering::SeqCst), 0);
        // 6 次成功 + 3 次失败
        assert_eq!(calls.load(Ordering::SeqCst), 9);
        assert!(pool.factory.opened.load(Ordering::SeqCst) >= 4);
        assert_eq!(pool.state(), PoolState::Healthy);
    }
}
