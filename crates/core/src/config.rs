use serde::{Deserialize, Serialize};

/// 全局应用配置
///
/// 所有分区均带默认值，配置文件与环境变量只需覆盖关心的字段。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub sources: SourcesConfig,
    pub sentiment: SentimentConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    // 并发 worker 上限
    pub max_workers: usize,
    // 单个候选标的的超时秒数
    pub candidate_timeout_secs: u64,
    // 顺序模式下每批数量
    pub batch_size: usize,
    // 顺序模式下批次间隔秒数
    pub batch_pause_secs: u64,
    // 大盘参考标的
    pub reference_symbol: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            candidate_timeout_secs: 60,
            batch_size: 10,
            batch_pause_secs: 5,
            reference_symbol: "SPY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub nasdaq: bool,
    pub finnhub_token: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            nasdaq: true,
            finnhub_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    // 会话使用次数达到上限后视为陈旧
    pub session_max_uses: u32,
    // 会话存活秒数达到上限后视为陈旧
    pub session_max_age_secs: u64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            retry_backoff_ms: 1000,
            session_max_uses: 25,
            session_max_age_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub discord_webhook: Option<String>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            file_prefix: "scanner".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scan.max_workers, 8);
        assert_eq!(config.scan.candidate_timeout_secs, 60);
        assert_eq!(config.scan.reference_symbol, "SPY");
        assert!(config.sources.nasdaq);
        assert_eq!(config.sentiment.max_retries, 3);
        assert_eq!(config.logging.dir, "logs");
        assert!(config.notify.discord_webhook.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"scan": {"max_workers": 4}, "sources": {"finnhub_token": "t"}}"#)
                .unwrap();
        assert_eq!(config.scan.max_workers, 4);
        assert_eq!(config.scan.batch_size, 10);
        assert_eq!(config.sources.finnhub_token.as_deref(), Some("t"));
        assert!(config.sources.nasdaq);
    }
}
