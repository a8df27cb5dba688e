use config::{Config, ConfigError, Environment, File};
use crush_core::config::AppConfig;
use std::path::Path;

/// 环境变量前缀，例如 `CRUSH__SCAN__MAX_WORKERS=4`
const ENV_PREFIX: &str = "CRUSH";

/// # Summary
/// 加载应用配置。
///
/// # Logic
/// 1. 指定路径时该文件必须存在；否则读取工作目录下可选的 `crush.toml`。
/// 2. 叠加 `CRUSH__` 前缀的环境变量 (`__` 分隔层级)。
/// 3. 未出现的字段使用默认值。
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name("crush").required(false),
    };

    Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
