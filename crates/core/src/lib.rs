pub mod analysis;
pub mod common;
pub mod config;
pub mod market;
pub mod notify;
pub mod screen;

#[cfg(feature = "test-utils")]
pub mod test_utils;

/// # Summary
/// 为 `reqwest` 的 rustls 后端安装进程级加密实现 (ring)。
///
/// # Logic
/// 1. 尝试安装 ring 作为默认 CryptoProvider。
/// 2. 已安装过时忽略（多次调用是安全的）。
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }
}
