//! 浏览器驱动抽象。
//!
//! 下载流程只依赖这里的 trait：打开页面、导航、等待元素、点击、
//! 等待点击触发的下载并保存、列出链接。具体实现见 `http`。

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub mod http;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("driver startup failed: {0}")]
    Startup(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("no page loaded")]
    NoPage,
    #[error("element {selector} not found")]
    ElementNotFound { selector: String },
    #[error("clicking {selector} did not expose a download")]
    NoDownload { selector: String },
    #[error("no links matched {selector}")]
    NoLinks { selector: String },
    #[error("download failed: {0}")]
    Download(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

pub trait BrowserDriver: Send + Sync {
    fn open_page(&self) -> BrowserResult<Box<dyn Page + '_>>;
}

pub trait Page {
    fn navigate(&mut self, url: &str, timeout: Duration) -> BrowserResult<()>;

    fn wait_visible(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    fn click(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// 点击 `selector` 并等待由此触发的下载。
    fn await_download(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<Box<dyn Download + '_>>;

    fn list_links(&mut self, selector: &str) -> BrowserResult<Vec<String>>;
}

pub trait Download {
    fn suggested_filename(&self) -> &str;

    /// 写入 `path`，返回写入的字节数。
    fn save_as(self: Box<Self>, path: &Path) -> BrowserResult<u64>;
}
