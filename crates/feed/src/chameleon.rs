use crate::http::{build_client, network, status_error};
use crate::session::{PoolState, SessionFactory, SessionPool};
use async_trait::async_trait;
use crush_core::config::SentimentConfig;
use crush_core::market::entity::WinRate;
use crush_core::market::error::MarketError;
use crush_core::market::port::SentimentSignalProvider;
use futures::FutureExt;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

const EARNINGS_URL: &str = "https://marketchameleon.com/Overview/{ticker}/Earnings/Earnings-Charts/";
const HEADER_CLASS: &str = "symbol-section-header-descr";

/// Market Chameleon 浏览会话：带 cookie 的 HTTP 客户端
pub struct ChameleonSession {
    client: Client,
    opened_at: Instant,
    // 已发出的页面请求数
    uses: u32,
}

/// # Summary
/// 按使用次数与存活时间判定陈旧的会话工厂。
pub struct ChameleonSessionFactory {
    max_uses: u32,
    max_age: Duration,
}

impl ChameleonSessionFactory {
    pub fn new(max_uses: u32, max_age: Duration) -> Self {
        Self { max_uses, max_age }
    }
}

#[async_trait]
impl SessionFactory for ChameleonSessionFactory {
    type Session = ChameleonSession;

    async fn open(&self) -> Result<ChameleonSession, MarketError> {
        debug!("Opening Market Chameleon session");
        Ok(ChameleonSession {
            client: build_client(Duration::from_secs(8), true)?,
            opened_at: Instant::now(),
            uses: 0,
        })
    }

    fn is_stale(&self, session: &ChameleonSession) -> bool {
        session.uses >= self.max_uses || session.opened_at.elapsed() >= self.max_age
    }
}

/// # Summary
/// 从 Market Chameleon 财报页面抓取 "隐含波动被高估" 的历史胜率。
///
/// # Invariants
/// - 所有请求经由会话池串行执行，页面解析失败同样触发重试。
/// - 重试耗尽时返回错误，由校验器兜底为 0/0。
pub struct MarketChameleonProvider {
    pool: SessionPool<ChameleonSessionFactory>,
}

impl MarketChameleonProvider {
    pub fn new(config: &SentimentConfig) -> Self {
        let factory = ChameleonSessionFactory::new(
            config.session_max_uses.max(1),
            Duration::from_secs(config.session_max_age_secs),
        );
        Self {
            pool: SessionPool::new(
                factory,
                config.max_retries,
                Duration::from_millis(config.retry_backoff_ms),
            ),
        }
    }

    /// 会话池当前健康状态
    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }
}

#[async_trait]
impl SentimentSignalProvider for MarketChameleonProvider {
    async fn get_win_rate(&self, ticker: &str) -> Result<WinRate, MarketError> {
        let url = EARNINGS_URL.replace("{ticker}", ticker);

        self.pool
            .execute(move |session| {
                let url = url.clone();
                async move {
                    session.uses += 1;
                    let resp = session.client.get(url.as_str()).send().await.map_err(network)?;
                    if !resp.status().is_success() {
                        return Err(status_error("marketchameleon", resp.status()));
                    }
                    let html = resp.text().await.map_err(network)?;
                    parse_win_rate(&html)
                }
                .boxed()
            })
            .await
    }
}

/// 去掉 HTML 标签，只保留文本
fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

/// `<strong ...>` 内的文本
fn strong_text(span: &str) -> Option<&str> {
    let open = span.find("<strong")?;
    let start = open + span[open..].find('>')? + 1;
    let end = start + span[start..].find("</strong>")?;
    Some(span[start..end].trim())
}

/// "in the last N quarters" 中的 N
fn quarters_in(text: &str) -> Option<u32> {
    const MARKER: &str = "in the last ";
    let rest = &text[text.find(MARKER)? + MARKER.len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if !rest[digits.len()..].starts_with(" quarters") {
        return None;
    }
    digits.parse().ok()
}

/// # Summary
/// 解析财报页面中的胜率信息。
///
/// # Logic
/// 1. 定位 `symbol-section-header-descr` 区块，缺失视为解析失败 (可重试)。
/// 2. 在区块内找到包含 "overestimated" 的 span。
/// 3. 从 `<strong>NN%</strong>` 读取胜率，从 "in the last N quarters" 读取季度数。
///
/// # Returns
/// 区块存在但没有相关 span，或数字无法解析时，对应字段为 0。
pub fn parse_win_rate(html: &str) -> Result<WinRate, MarketError> {
    let start = html
        .find(HEADER_CLASS)
        .ok_or_else(|| MarketError::Parse("earnings header section not found".to_string()))?;
    let section = &html[start..];
    let section = section
        .find("</div>")
        .map_or(section, |end| &section[..end]);

    let span = section
        .split("<span")
        .skip(1)
        .map(|s| s.split("</span>").next().unwrap_or(s))
        .find(|s| s.contains("overestimated"));
    let Some(span) = span else {
        debug!("No overestimate statement in header section");
        return Ok(WinRate::default());
    };

    let win_rate = strong_text(span)
        .and_then(|t| t.trim_end_matches('%').trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let quarters = quarters_in(&strip_tags(span)).unwrap_or(0);
    Ok(WinRate { win_rate, quarters })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="symbol-section-header">
          <div class="symbol-section-header-descr">
            <span>ACME reports earnings on Mar 6 after close.</span>
            <span>The implied move was overestimated <strong>68.75%</strong> of the time
              in the last 16 quarters.</span>
          </div>
        </div>
        <span>Unrelated: overestimated <strong>1%</strong> in the last 2 quarters</span>
    </body></html>"#;

    #[test]
    fn test_parse_win_rate() {
        assert_eq!(
            parse_win_rate(PAGE).unwrap(),
            WinRate {
                win_rate: 68.75,
                quarters: 16
            }
        );
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let html = "<html><body><div class=\"login\">Please sign in</div></body></html>";
        assert!(matches!(parse_win_rate(html), Err(MarketError::Parse(_))));
    }

    #[test]
    fn test_section_without_statement_defaults() {
        let html = r#"<div class="symbol-section-header-descr"><span>No history</span></div>"#;
        assert_eq!(parse_win_rate(html).unwrap(), WinRate::default());
    }

    #[test]
    fn test_partial_statement() {
        let html = r#"<div class="symbol-section-header-descr">
            <span>overestimated <strong class="pct">40%</strong> recently</span></div>"#;
        assert_eq!(
            parse_win_rate(html).unwrap(),
            WinRate {
                win_rate: 40.0,
                quarters: 0
            }
        );
    }

    #[test]
    fn test_quarters_in() {
        assert_eq!(quarters_in("over in the last 12 quarters."), Some(12));
        assert_eq!(quarters_in("in the last 12 months"), None);
        assert_eq!(quarters_in("nothing"), None);
    }

    #[test]
    fn test_staleness() {
        crush_core::install_crypto_provider();
        let factory = ChameleonSessionFactory::new(2, Duration::from_secs(60));
        let fresh = ChameleonSession {
            client: build_client(Duration::from_secs(1), true).unwrap(),
            opened_at: Instant::now(),
            uses: 1,
        };
        assert!(!factory.is_stale(&fresh));
        let used = ChameleonSession { uses: 2, ..fresh };
        assert!(factory.is_stale(&used));

        let expired = ChameleonSessionFactory::new(10, Duration::ZERO);
        assert!(expired.is_stale(&used));
    }
}
