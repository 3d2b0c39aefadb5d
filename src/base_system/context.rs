//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及命令行参数覆盖。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // 调度
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // 保存
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    // 界面
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_false")]
    pub skip_selection: bool,
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,

    // 页面
    #[serde(default = "default_required_domain")]
    pub required_domain: String,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    #[serde(default = "default_button_selector")]
    pub button_selector: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// 命令行上显式给出的值；`None` 表示沿用配置文件。
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub download_dir: Option<String>,
    pub timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub headless: Option<bool>,
    pub skip_selection: bool,
    pub log_lines: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_attempts: default_retry_attempts(),
            timeout_secs: default_timeout_secs(),
            download_dir: default_download_dir(),
            headless: default_true(),
            skip_selection: default_false(),
            log_lines: default_log_lines(),
            required_domain: default_required_domain(),
            link_selector: default_link_selector(),
            button_selector: default_button_selector(),
            user_agent: default_user_agent(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "workers",
                description: "并发下载线程数",
            },
            FieldMeta {
                name: "retry_attempts",
                description: "每个文件的最大尝试次数（失败后线性退避：第 n 次失败等待 2n 秒）",
            },
            FieldMeta {
                name: "timeout_secs",
                description: "页面导航超时（秒）；等待按钮/点击使用其三分之一",
            },
            FieldMeta {
                name: "download_dir",
                description: "下载保存目录（不存在时自动创建）",
            },
            FieldMeta {
                name: "headless",
                description: "无头模式（交给浏览器驱动）",
            },
            FieldMeta {
                name: "skip_selection",
                description: "跳过分组选择，直接下载全部",
            },
            FieldMeta {
                name: "log_lines",
                description: "下载时滚动显示的日志行数",
            },
            FieldMeta {
                name: "required_domain",
                description: "起始链接必须包含的域名",
            },
            FieldMeta {
                name: "link_selector",
                description: "起始页上下载链接的选择器",
            },
            FieldMeta {
                name: "button_selector",
                description: "下载页上下载按钮的选择器",
            },
            FieldMeta {
                name: "user_agent",
                description: "HTTP User-Agent",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(v) = cli.workers {
            self.workers = v;
        }
        if let Some(v) = cli.download_dir.as_ref() {
            self.download_dir = v.clone();
        }
        if let Some(v) = cli.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = cli.retry_attempts {
            self.retry_attempts = v;
        }
        if let Some(v) = cli.headless {
            self.headless = v;
        }
        if cli.skip_selection {
            self.skip_selection = true;
        }
        if let Some(v) = cli.log_lines {
            self.log_lines = v;
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(self.download_dir.trim())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// 等待元素与点击用的超时，取导航超时的三分之一。
    pub fn element_timeout(&self) -> Duration {
        self.navigation_timeout() / 3
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }

    pub fn visible_log_lines(&self) -> usize {
        self.log_lines.max(1)
    }
}

fn default_workers() -> usize {
    3
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_log_lines() -> usize {
    3
}

fn default_required_domain() -> String {
    "paste.fitgirl-repacks.site".to_string()
}

fn default_link_selector() -> String {
    "#plaintext ul li a".to_string()
}

fn default_button_selector() -> String {
    ".link-button.text-5xl".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}
