//! 下载主流程编排：提取链接、单个文件的页面操作、整批下载。

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::models::RunResult;
use super::plan::display_filename;
use super::progress::ConsoleMultiplexer;
use super::worker_pool::DownloadPool;
use crate::base_system::context::Config;
use crate::base_system::retry::Backoff;
use crate::browser::{BrowserDriver, BrowserError, BrowserResult};

/// 第一次点击后等待页面稳定的时间。
pub const CLICK_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub dir: PathBuf,
    pub button_selector: String,
    pub navigation_timeout: Duration,
    pub element_timeout: Duration,
    pub settle: Duration,
    pub workers: usize,
    pub attempts: u32,
    pub backoff: Backoff,
}

impl DownloadSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.download_dir(),
            button_selector: config.button_selector.clone(),
            navigation_timeout: config.navigation_timeout(),
            element_timeout: config.element_timeout(),
            settle: CLICK_SETTLE,
            workers: config.worker_count(),
            attempts: config.attempts(),
            backoff: Backoff::default(),
        }
    }
}

/// 打开起始页并列出匹配 `selector` 的链接；一个都没有视为失败。
pub fn extract_links(
    driver: &dyn BrowserDriver,
    start_url: &str,
    selector: &str,
    timeout: Duration,
) -> BrowserResult<Vec<String>> {
    let mut page = driver.open_page()?;
    page.navigate(start_url, timeout)?;
    let links = page.list_links(selector)?;
    if links.is_empty() {
        return Err(BrowserError::NoLinks {
            selector: selector.to_string(),
        });
    }
    debug!(count = links.len(), "links extracted");
    Ok(links)
}

/// 一次下载尝试。每一步都写进控制台日志；任一步失败返回 `false`。
pub fn download_one(
    driver: &dyn BrowserDriver,
    settings: &DownloadSettings,
    console: &ConsoleMultiplexer,
    link: &str,
    worker_id: usize,
) -> bool {
    match try_download(driver, settings, console, link, worker_id) {
        Ok(()) => true,
        Err(err) => {
            console.log(format!("[Worker {worker_id}] {err}"));
            false
        }
    }
}

fn try_download(
    driver: &dyn BrowserDriver,
    settings: &DownloadSettings,
    console: &ConsoleMultiplexer,
    link: &str,
    worker_id: usize,
) -> BrowserResult<()> {
    let filename = display_filename(link);
    let button = settings.button_selector.as_str();
    let wait = settings.element_timeout;

    let mut page = driver.open_page()?;
    console.log(format!(
        "[Worker {worker_id}] Navigating to download page for {filename}"
    ));
    page.navigate(link, settings.navigation_timeout)?;
    page.wait_visible(button, wait)?;

    console.log(format!(
        "[Worker {worker_id}] Performing first click for {filename}"
    ));
    page.click(button, wait)?;

    if !settings.settle.is_zero() {
        thread::sleep(settings.settle);
    }
    page.wait_visible(button, wait)?;

    console.log(format!(
        "[Worker {worker_id}] Performing second click to start download..."
    ));
    let download = page.await_download(button, wait)?;
    let suggested = download.suggested_filename().to_string();
    console.log(format!(
        "[Worker {worker_id}] Starting download of: {suggested}"
    ));

    let target = settings.dir.join(&suggested);
    let bytes = download.save_as(&target)?;
    debug!(worker_id, path = %target.display(), bytes, "saved");
    console.log(format!(
        "[Worker {worker_id}] Download completed: {suggested}"
    ));
    Ok(())
}

/// 整批下载，阻塞直到全部任务结束，最后输出汇总。
pub fn run_downloads(
    driver: &dyn BrowserDriver,
    settings: &DownloadSettings,
    urls: &[String],
    console: &ConsoleMultiplexer,
) -> RunResult {
    debug!(
        files = urls.len(),
        workers = settings.workers,
        dir = %settings.dir.display(),
        "starting downloads"
    );
    let pool = DownloadPool::new(settings.workers, settings.attempts).with_backoff(settings.backoff);
    let result = pool.run(urls, console, |link, worker_id| {
        download_one(driver, settings, console, link, worker_id)
    });

    console.finalize(&format!(
        "Downloads completed: {}/{} successful\nAll operations completed.",
        result.succeeded, result.attempted
    ));
    info!(
        attempted = result.attempted,
        succeeded = result.succeeded,
        failed = result.failed(),
        "downloads finished"
    );
    result
}
