use crush_core::config::LoggingConfig;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// # Summary
/// 初始化全局日志：控制台 + 按天滚动的文件日志。
///
/// # Logic
/// 1. 控制台使用紧凑格式。
/// 2. 文件写入 `{dir}/{prefix}.YYYY-MM-DD.log`，非阻塞写入。
/// 3. 日志目录不可用时退化为仅控制台输出。
///
/// # Returns
/// 文件写入器的 guard，必须在进程生命周期内持有，否则尾部日志会丢失。
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let console = fmt::layer()
        .compact()
        .with_target(false)
        .with_filter(env_filter());

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.file_prefix.as_str())
        .filename_suffix("log")
        .build(&config.dir);

    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            tracing_subscriber::registry().with(console).with(file).init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(console).init();
            warn!("File logging disabled ({}): {}", config.dir, e);
            None
        }
    }
}
