use chrono::NaiveDate;
use crush_analysis::volatility::VolatilityEstimator;
use crush_core::test_utils::bars_from_closes;
use std::io;
use std::sync::{Arc, Mutex};

/// 收集日志输出的内存 writer
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// # Summary
/// 兜底告警在同一估计器上只输出一次，新的估计器实例重新计数。
///
/// # Logic
/// 1. 构造一根最低价为 0 的 K 线，使每次调用都走简单波动率兜底。
/// 2. 同一实例调用三次，日志中只出现一条告警。
/// 3. 换一个新实例再调用一次，告警总数变为两条。
#[test]
fn test_fallback_warning_logged_once_per_estimator() {
    let closes: Vec<f64> = (0..40_i32).map(|i| 100.0 + f64::from(i % 4)).collect();
    let start = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    let mut bars = bars_from_closes(start, &closes, 0.01, 1.0);
    bars[3].low = 0.0;

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let estimator = VolatilityEstimator::default();
        for _ in 0..3 {
            assert!(estimator.estimate(&bars).is_some());
        }
        assert_eq!(log.text().matches("Using simple volatility").count(), 1);

        let fresh = VolatilityEstimator::default();
        assert!(fresh.estimate(&bars).is_some());
        assert_eq!(log.text().matches("Using simple volatility").count(), 2);
    });
}
