use anyhow::{Context, Result};
use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 一次浏览器会话
///
/// 持有 Browser 和它的事件处理任务。必须显式调用 `close()` 释放；
/// 自行启动的浏览器会被关闭，外部连接的浏览器只断开连接。
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    owned: bool,
}

impl BrowserSession {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, owned: bool) -> Self {
        Self {
            browser,
            handler,
            owned,
        }
    }

    /// 打开一个空白页面
    pub async fn new_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .context("创建页面失败")
    }

    /// 释放浏览器资源
    pub async fn close(mut self) -> Result<()> {
        if self.owned {
            debug!("正在关闭浏览器...");
            if let Err(e) = self.browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                warn!("等待浏览器退出失败: {}", e);
            }
        }
        self.handler.abort();
        info!("🔒 浏览器会话已释放");
        Ok(())
    }
}
