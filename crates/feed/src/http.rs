use crush_core::market::error::MarketError;
use reqwest::{Client, StatusCode};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

/// 伪装浏览器的 User-Agent，减少被拦截的概率
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// # Summary
/// 构建数据源共用的 HTTP 客户端。
///
/// # Logic
/// 1. 设置浏览器 User-Agent 与通用 Accept 头。
/// 2. 配置整体超时。
/// 3. 需要会话的数据源开启 cookie 存储。
///
/// # Arguments
/// * `timeout`: 单次请求超时。
/// * `cookies`: 是否保存服务端下发的 cookie。
pub fn build_client(timeout: Duration, cookies: bool) -> Result<Client, MarketError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, text/html, */*"),
    );

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .cookie_store(cookies)
        .build()
        .map_err(|e| MarketError::Network(format!("failed to build HTTP client: {}", e)))
}

/// reqwest 错误统一映射为网络错误
pub fn network(e: reqwest::Error) -> MarketError {
    MarketError::Network(e.to_string())
}

/// 响应体解析错误统一映射为解析错误
pub fn parse(e: impl std::fmt::Display) -> MarketError {
    MarketError::Parse(e.to_string())
}

/// # Summary
/// 将非成功的 HTTP 状态映射为领域错误。
///
/// # Logic
/// 1. 404 → `NotFound`。
/// 2. 429 → `RateLimited`。
/// 3. 其余 → `Network`。
pub fn status_error(source: &str, status: StatusCode) -> MarketError {
    match status {
        StatusCode::NOT_FOUND => MarketError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => MarketError::RateLimited(source.to_string()),
        s => MarketError::Network(format!("{} HTTP {}", source, s)),
    }
}
