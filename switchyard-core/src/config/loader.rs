use crate::config::model::RouterOptions;
use std::path::Path;

pub fn load_options() -> Result<RouterOptions, anyhow::Error> {
    load_options_from_path("switchyard.toml")
}

/// 从TOML文件加载并验证路由配置
pub fn load_options_from_path(config_path: impl AsRef<Path>) -> Result<RouterOptions, anyhow::Error> {
    let config_path = config_path.as_ref();
    let config_str = std::fs::read_to_string(config_path)?;
    let options = parse_options(&config_str)?;
    tracing::debug!(
        "Loaded router options from {} ({} expert overrides)",
        config_path.display(),
        options.experts.as_ref().map_or(0, Vec::len)
    );
    Ok(options)
}

pub fn parse_options(config_str: &str) -> Result<RouterOptions, anyhow::Error> {
    let options: RouterOptions = toml::from_str(config_str)?;
    options.validate()?;
    Ok(options)
}
