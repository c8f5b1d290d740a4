pub mod connection;
pub mod headless;
pub mod session;

pub use connection::connect_to_browser;
pub use headless::launch_browser;
pub use session::BrowserSession;

use anyhow::Result;

use crate::config::Config;

/// 配置了调试端口时连接已有浏览器，否则启动新的
pub async fn open_session(config: &Config) -> Result<BrowserSession> {
    match config.browser_debug_port {
        Some(port) => connect_to_browser(port).await,
        None => launch_browser(config).await,
    }
}
