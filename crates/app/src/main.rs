mod cli;
mod logging;
mod report;
mod settings;
mod wiring;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use cli::Cli;
use crush_core::notify::entity::ScanReport;
use crush_core::notify::port::NotificationSink;
use crush_notify::render::plain_text;
use crush_scanner::calendar::parse_scan_date;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use wiring::Services;

/// # Summary
/// 推送报告到所有通知渠道，单个渠道失败只记录日志。
async fn dispatch(sinks: &[Arc<dyn NotificationSink>], report: &ScanReport) {
    for sink in sinks {
        match sink.deliver(report).await {
            Ok(()) => info!("Report delivered via {}", sink.name()),
            Err(e) => error!("Failed to deliver report via {}: {}", sink.name(), e),
        }
    }
}

/// # Summary
/// 扫描主循环。
///
/// # Logic
/// 1. 执行一次扫描，打印结果并推送通知。
/// 2. 指定 `--forever` 时休眠 N 小时后重复，否则退出。
async fn run(services: &Services, cli: &Cli, date: Option<NaiveDate>) {
    loop {
        match services.scanner.scan(date, cli.parallel).await {
            Ok(outcome) => {
                let report = ScanReport::from_outcome(&outcome, Utc::now());
                if report.is_empty() {
                    info!("No recommended stocks found");
                } else {
                    println!("\n{}", plain_text(&report, cli.list));
                }
                dispatch(&services.sinks, &report).await;
            }
            Err(e) => error!("Scan failed: {}", e),
        }

        let Some(hours) = cli.repeat_hours() else {
            break;
        };
        info!("Sleeping for {} hours...", hours);
        tokio::time::sleep(Duration::from_secs(hours.saturating_mul(3600))).await;
    }
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
///
/// # Logic
/// 1. 解析命令行、加载配置并初始化日志。
/// 2. 校验扫描日期，非法格式在任何网络请求之前报错。
/// 3. 装配服务；`--analyze` 分析单个标的后退出。
/// 4. 运行扫描循环，收到 Ctrl-C 时退出。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = settings::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    let _guard = logging::init(&config.logging);
    crush_core::install_crypto_provider();

    let date = cli.date.as_deref().map(parse_scan_date).transpose()?;
    let services = wiring::build(&config)?;
    info!("Earnings scanner ready");

    if let Some(ticker) = &cli.analyze {
        let analysis = services.scanner.analyze(ticker).await;
        println!(
            "{}",
            report::render_analysis(&analysis, &config.scan.reference_symbol)
        );
        return Ok(());
    }

    tokio::select! {
        _ = run(&services, &cli, date) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted; exiting.");
        }
    }
    Ok(())
}
