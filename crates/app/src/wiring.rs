use anyhow::Context;
use crush_analysis::RecommendationEngine;
use crush_core::common::time::{RealTimeProvider, TimeProvider};
use crush_core::config::AppConfig;
use crush_core::market::port::EarningsCalendarProvider;
use crush_core::notify::port::NotificationSink;
use crush_feed::chameleon::MarketChameleonProvider;
use crush_feed::finnhub::FinnhubCalendar;
use crush_feed::nasdaq::NasdaqCalendar;
use crush_feed::yahoo::YahooProvider;
use crush_notify::discord::DiscordSink;
use crush_notify::email::EmailSink;
use crush_scanner::{CandidateValidator, MarketConditionAdjuster, MergedCalendar, Scanner};
use std::sync::Arc;
use tracing::info;

/// 装配完成的服务
pub struct Services {
    pub scanner: Scanner,
    pub sinks: Vec<Arc<dyn NotificationSink>>,
}

/// 按优先级排列的财报日历数据源：Nasdaq 在前，Finnhub 在后
fn calendars(config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn EarningsCalendarProvider>>> {
    let mut providers: Vec<Arc<dyn EarningsCalendarProvider>> = Vec::new();
    if config.sources.nasdaq {
        providers.push(Arc::new(NasdaqCalendar::new()?));
    }
    if let Some(token) = config.sources.finnhub_token.as_deref().filter(|t| !t.is_empty()) {
        providers.push(Arc::new(FinnhubCalendar::new(token)?));
    }
    Ok(providers)
}

/// 根据配置创建通知渠道，配置非法时直接报错
fn sinks(config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn NotificationSink>>> {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();
    if let Some(url) = &config.notify.discord_webhook {
        sinks.push(Arc::new(
            DiscordSink::new(url.clone()).context("invalid Discord webhook")?,
        ));
    }
    if let Some(email) = &config.notify.email {
        sinks.push(Arc::new(
            EmailSink::new(email).context("invalid email configuration")?,
        ));
    }
    Ok(sinks)
}

/// # Summary
/// DI 根：实例化全部具体实现并通过 `Arc<dyn Trait>` 注入扫描器。
///
/// # Logic
/// 1. 基础设施层：Yahoo 行情/期权、财报日历、Market Chameleon 胜率。
/// 2. 分析层：RecommendationEngine 同时服务于校验器与阈值调整器。
/// 3. 应用层：CandidateValidator + MarketConditionAdjuster + MergedCalendar 组成 Scanner。
pub fn build(config: &AppConfig) -> anyhow::Result<Services> {
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let yahoo = Arc::new(YahooProvider::new().context("failed to create Yahoo client")?);

    let engine = Arc::new(RecommendationEngine::new(
        yahoo.clone(),
        yahoo.clone(),
        clock.clone(),
    ));

    let mut validator =
        CandidateValidator::new(yahoo.clone(), yahoo, engine.clone(), clock.clone());
    if config.sentiment.enabled {
        validator = validator.with_sentiment(Arc::new(MarketChameleonProvider::new(
            &config.sentiment,
        )));
    } else {
        info!("Win-rate check disabled");
    }

    let calendar = MergedCalendar::new(calendars(config)?);
    if calendar.is_empty() {
        anyhow::bail!("no earnings calendar source enabled");
    }
    info!("Using {} earnings calendar source(s)", calendar.len());

    let scanner = Scanner::new(
        Arc::new(validator),
        MarketConditionAdjuster::new(engine, config.scan.reference_symbol.clone()),
        Arc::new(calendar),
        clock,
        config.scan.clone(),
    );

    Ok(Services {
        scanner,
        sinks: sinks(config)?,
    })
}
