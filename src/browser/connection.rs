use anyhow::Result;
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::browser::session::BrowserSession;

/// 连接到已开启调试端口的浏览器
///
/// 会话关闭时不会关闭这个浏览器，只断开连接
pub async fn connect_to_browser(port: u16) -> Result<BrowserSession> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

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

    Ok(BrowserSession::new(browser, handle, false))
}
