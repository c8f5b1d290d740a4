use std::path::Path;

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::browser::session::BrowserSession;
use crate::config::Config;

/// 按配置启动一个独立的浏览器进程
///
/// 每次运行使用独立的浏览器进程，运行之间互不共享会话
pub async fn launch_browser(config: &Config) -> Result<BrowserSession> {
    if config.headless {
        info!("🚀 启动无头浏览器...");
    } else {
        info!("🚀 启动有头浏览器...");
    }

    let mut builder = BrowserConfig::builder().window_size(1280, 720);
    builder = if config.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &config.chrome_executable {
        debug!("使用浏览器: {}", executable);
        builder = builder.chrome_executable(Path::new(executable));
    }
    if let Some(dir) = &config.user_data_dir {
        builder = builder.user_data_dir(dir);
    }

    let mut args = vec![
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ];
    args.extend(config.browser_args.iter().cloned());

    let browser_config = builder.args(args).build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow::anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        anyhow::anyhow!("启动浏览器失败: {}", e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handle = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    Ok(BrowserSession::new(browser, handle, true))
}
