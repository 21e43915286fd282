use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::error::{AppResult, BrowserError};

/// 连接到已运行的浏览器（远程调试端口）并新建一个空白页面
///
/// 返回的 `JoinHandle` 是后台事件循环，关闭时需要一并终止
pub async fn connect_to_browser_and_page(port: u16) -> AppResult<(Browser, Page, JoinHandle<()>)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::ConnectionFailed {
            port,
            detail: e.to_string(),
        }
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    let events = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = match browser.new_page("about:blank").await {
        Ok(page) => page,
        Err(e) => {
            error!("创建空白页面失败: {}", e);
            events.abort();
            return Err(BrowserError::ConnectionFailed {
                port,
                detail: e.to_string(),
            }
            .into());
        }
    };

    Ok((browser, page, events))
}
