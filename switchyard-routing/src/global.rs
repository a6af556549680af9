//! 进程级默认路由器
//!
//! 路由器本身没有任何全局状态；这里只是给集成层提供一个方便的共享实例。

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use switchyard_core::RouterOptions;
use tracing::info;

use crate::routing::ExpertRouter;

static DEFAULT_ROUTER: OnceCell<Arc<ExpertRouter>> = OnceCell::new();

/// 安装默认路由器，已经安装过时返回错误
pub fn install_default_router(router: ExpertRouter) -> Result<Arc<ExpertRouter>> {
    let router = Arc::new(router);
    DEFAULT_ROUTER
        .set(router.clone())
        .map_err(|_| anyhow::anyhow!("Default expert router is already installed"))?;

    info!("Installed default expert router");
    Ok(router)
}

pub fn default_router() -> Option<Arc<ExpertRouter>> {
    DEFAULT_ROUTER.get().cloned()
}

/// 获取默认路由器，不存在时用给定配置创建
///
/// 创建出来的路由器还需要调用方自己 `initialize`
pub fn default_router_or_init<F>(options: F) -> Result<Arc<ExpertRouter>>
where
    F: FnOnce() -> Result<RouterOptions>,
{
    DEFAULT_ROUTER
        .get_or_try_init(|| -> Result<Arc<ExpertRouter>> {
            let router = ExpertRouter::new(options()?)?;
            info!("Created default expert router");
            Ok(Arc::new(router))
        })
        .cloned()
}
