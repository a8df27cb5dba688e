use clap::Parser;
use crush_core::config::AppConfig;
use std::path::PathBuf;

/// 财报前波动率压缩筛选器
#[derive(Parser, Debug)]
#[command(name = "crush")]
#[command(about = "Screen upcoming earnings for implied-volatility crush setups")]
pub struct Cli {
    /// 盘后财报日期 (MM/DD/YYYY)，盘前日期取其后一天
    #[arg(short, long)]
    pub date: Option<String>,

    /// 并发 worker 数，0 表示按批顺序处理
    #[arg(short, long, default_value_t = 0)]
    pub parallel: usize,

    /// 只列出各分级的 ticker
    #[arg(short, long)]
    pub list: bool,

    /// 分析单个标的并输出全部指标
    #[arg(short, long, value_name = "TICKER")]
    pub analyze: Option<String>,

    /// Discord Webhook 地址，覆盖配置文件
    #[arg(short, long, value_name = "URL")]
    pub webhook: Option<String>,

    /// 每隔 N 小时重复扫描，Ctrl-C 退出
    #[arg(short, long, value_name = "HOURS")]
    pub forever: Option<u64>,

    /// 配置文件路径 (默认读取工作目录下的 crush.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// 命令行参数覆盖配置项
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.webhook {
            config.notify.discord_webhook = Some(url.clone());
        }
    }

    /// 重复扫描的间隔小时数，未指定或为 0 时只扫描一次
    pub fn repeat_hours(&self) -> Option<u64> {
        self.forever.filter(|h| *h > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "crush", "-d", "03/07/2025", "-p", "4", "-l", "-w", "https://hook", "-f", "2",
        ])
        .unwrap();
        assert_eq!(cli.date.as_deref(), Some("03/07/2025"));
        assert_eq!(cli.parallel, 4);
        assert!(cli.list);
        assert_eq!(cli.repeat_hours(), Some(2));

        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.notify.discord_webhook.as_deref(), Some("https://hook"));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["crush", "--analyze", "aapl"]).unwrap();
        assert_eq!(cli.analyze.as_deref(), Some("aapl"));
        assert_eq!(cli.parallel, 0);
        assert!(!cli.list);
        assert_eq!(cli.repeat_hours(), None);

        let cli = Cli::try_parse_from(["crush", "-f", "0"]).unwrap();
        assert_eq!(cli.repeat_hours(), None);
    }

    #[test]
    fn test_rejects_bad_worker_count() {
        assert!(Cli::try_parse_from(["crush", "-p", "many"]).is_err());
    }
}
