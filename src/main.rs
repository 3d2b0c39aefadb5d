//! paste-dl：从分享页批量下载文件。
//!
//! 流程：校验起始链接 → 提取页面上的下载链接 → 按文件/分卷归组 →
//! 交互式选择分组 → 多线程下载（带重试）并实时显示进度与日志。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/重试/链接校验等基础设施
//! - `browser`：浏览器驱动抽象与 HTTP 实现
//! - `download`：分组、工作池、进度显示、下载主流程
//! - `ui`：TUI 与无 UI（行输入）两套分组选择

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tracing::{info, warn};

mod base_system;
mod browser;
mod download;
mod ui;

use base_system::config::load_or_create_with_base;
use base_system::context::{CliOverrides, Config};
use base_system::logging::{LogOptions, LogSystem, restore_terminal};
use base_system::url_check::validate_start_url;
use browser::http::{HttpDriver, HttpDriverOptions};
use download::downloader::{DownloadSettings, extract_links, run_downloads};
use download::models::{SelectionOutcome, SelectionSummary};
use download::plan::{flatten_selected, group_links};
use download::progress::ConsoleMultiplexer;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "paste-dl")]
#[command(about = "Batch downloader for paste-style link pages")]
struct Cli {
    /// 起始页链接
    start_url: Option<String>,

    /// 并发下载线程数
    #[arg(long)]
    workers: Option<usize>,

    /// 下载保存目录
    #[arg(long)]
    dir: Option<String>,

    /// 页面导航超时（秒）
    #[arg(long)]
    timeout: Option<u64>,

    /// 每个文件的最大尝试次数
    #[arg(long)]
    retry: Option<u32>,

    /// 无头模式（--headless=false 关闭）
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    headless: Option<bool>,

    /// 跳过分组选择，直接下载全部
    #[arg(long, default_value_t = false)]
    skip_selection: bool,

    /// 下载时滚动显示的日志行数
    #[arg(long)]
    log_lines: Option<usize>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<String>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            workers: self.workers,
            download_dir: self.dir.clone(),
            timeout_secs: self.timeout,
            retry_attempts: self.retry,
            headless: self.headless,
            skip_selection: self.skip_selection,
            log_lines: self.log_lines,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("paste-dl v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    log.add_exit_hook(restore_terminal);

    let mut config: Config =
        load_or_create_with_base(data_dir).map_err(|e| anyhow!(e.to_string()))?;
    config.apply_cli(&cli.overrides());

    let start_url = validate_start_url(cli.start_url.as_deref().unwrap_or_default(), &config.required_domain)
        .context("invalid start URL")?;

    let download_dir = config.download_dir();
    fs::create_dir_all(&download_dir)
        .with_context(|| format!("create download directory {}", download_dir.display()))?;

    info!("Starting download from: {}", start_url);
    info!("Download directory: {}", download_dir.display());
    info!("Using {} workers", config.worker_count());

    let driver = HttpDriver::launch(HttpDriverOptions {
        user_agent: config.user_agent.clone(),
        connect_timeout: config.element_timeout(),
        read_timeout: config.navigation_timeout(),
        headless: config.headless,
    })
    .context("start browser driver")?;

    info!("Extracting download links...");
    let links = extract_links(
        &driver,
        &start_url,
        &config.link_selector,
        config.navigation_timeout(),
    )
    .context("extract download links")?;
    info!("Found {} links to download", links.len());

    let groups = group_links(&links);
    info!("Organized into {} distinct file groups", groups.len());

    let groups = if config.skip_selection {
        groups
    } else {
        match ui::select_groups(groups)? {
            SelectionOutcome::Confirmed(groups) => groups,
            SelectionOutcome::Cancelled => {
                println!("\nOperation cancelled by user.");
                return Ok(());
            }
        }
    };

    let urls = flatten_selected(&groups);
    if urls.is_empty() {
        bail!("no files selected for download");
    }
    let summary = SelectionSummary::of(&groups);
    info!(
        "Preparing to download {} files from {} of {} groups",
        urls.len(),
        summary.groups,
        summary.total_groups
    );

    clear_screen();
    let console = ConsoleMultiplexer::new(
        config.visible_log_lines(),
        urls.len() as u64,
        "Downloading files",
    );
    let result = run_downloads(&driver, &DownloadSettings::from_config(&config), &urls, &console);
    if result.failed() > 0 {
        warn!("{} of {} downloads failed", result.failed(), result.attempted);
    }
    Ok(())
}

fn clear_screen() {
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0)).ok();
    stdout.flush().ok();
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
