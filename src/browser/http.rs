//! 基于 reqwest（blocking）的浏览器驱动。
//!
//! 不执行脚本：页面取回后即视为“可见”，用 scraper 解析 HTML 并按 CSS 选择器
//! 定位元素。点击时记录页面暴露的下载地址（元素自身的 href，或页面里的
//! `window.open(...)`），等待下载即请求该地址。

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_DISPOSITION, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};
use scraper::{Html, Selector};
use tracing::{debug, info};

use super::{BrowserDriver, BrowserError, BrowserResult, Download, Page};
use crate::download::plan::display_filename;

fn re_window_open() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)window\.open\(\s*["']([^"']+)["']"#).expect("compile window.open regex"))
}

fn re_disposition_star() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)filename\*\s*=\s*(?:utf-8'[^']*')?([^;]+)").expect("compile disposition regex"))
}

fn re_disposition() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).expect("compile disposition regex"))
}

#[derive(Debug, Clone)]
pub struct HttpDriverOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// 单次读取（响应头或一块响应体）的上限
    pub read_timeout: Duration,
    pub headless: bool,
}

pub struct HttpDriver {
    client: Client,
}

impl HttpDriver {
    pub fn launch(options: HttpDriverOptions) -> BrowserResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        // blocking 客户端的 timeout 按每次读取计，持续有数据的大文件不会被截断
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .build()
            .map_err(|e| BrowserError::Startup(e.to_string()))?;

        if !options.headless {
            info!("headless=false has no effect on the HTTP driver");
        }
        debug!(
            connect_timeout = ?options.connect_timeout,
            read_timeout = ?options.read_timeout,
            "http driver ready"
        );
        Ok(Self { client })
    }
}

impl BrowserDriver for HttpDriver {
    fn open_page(&self) -> BrowserResult<Box<dyn Page + '_>> {
        Ok(Box::new(HttpPage {
            client: &self.client,
            url: None,
            html: String::new(),
            download_url: None,
        }))
    }
}

struct HttpPage<'a> {
    client: &'a Client,
    url: Option<Url>,
    html: String,
    download_url: Option<String>,
}

impl HttpPage<'_> {
    fn loaded(&self) -> BrowserResult<&Url> {
        self.url.as_ref().ok_or(BrowserError::NoPage)
    }
}

impl Page for HttpPage<'_> {
    fn navigate(&mut self, url: &str, timeout: Duration) -> BrowserResult<()> {
        let failed = |reason: String| BrowserError::Navigation {
            url: url.to_string(),
            reason,
        };
        let resp = self
            .client
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .timeout(timeout)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| failed(e.to_string()))?;
        let final_url = resp.url().clone();
        let html = resp.text().map_err(|e| failed(e.to_string()))?;

        debug!(url = %final_url, bytes = html.len(), "page loaded");
        self.url = Some(final_url);
        self.html = html;
        self.download_url = None;
        Ok(())
    }

    fn wait_visible(&mut self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
        self.loaded()?;
        find_element(&self.html, selector)
            .map(|_| ())
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    fn click(&mut self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
        let base = self.loaded()?;
        let target = download_target(&self.html, base, selector)?;
        debug!(%selector, %target, "click exposed download target");
        self.download_url = Some(target);
        Ok(())
    }

    fn await_download(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<Box<dyn Download + '_>> {
        self.click(selector, timeout)?;
        let referer = self.loaded()?.to_string();
        let url = self
            .download_url
            .take()
            .ok_or_else(|| BrowserError::NoDownload {
                selector: selector.to_string(),
            })?;

        let response = self
            .client
            .get(&url)
            .header(REFERER, referer)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| BrowserError::Download(e.to_string()))?;

        let suggested = disposition_filename(response.headers())
            .or_else(|| sanitize_filename(display_filename(&url)))
            .unwrap_or_else(|| "download.bin".to_string());
        Ok(Box::new(HttpDownload {
            response,
            suggested,
        }))
    }

    fn list_links(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        let base = self.loaded()?;
        Ok(select_links(&self.html, base, selector))
    }
}

struct HttpDownload {
    response: Response,
    suggested: String,
}

impl Download for HttpDownload {
    fn suggested_filename(&self) -> &str {
        &self.suggested
    }

    fn save_as(mut self: Box<Self>, path: &Path) -> BrowserResult<u64> {
        // 先写 .part，完成后改名，失败时不留下半截文件
        let partial = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });
        match write_body(&mut self.response, &partial) {
            Ok(n) => {
                fs::rename(&partial, path)?;
                Ok(n)
            }
            Err(err) => {
                let _ = fs::remove_file(&partial);
                Err(err)
            }
        }
    }
}

fn write_body(response: &mut Response, path: &Path) -> BrowserResult<u64> {
    let mut file = File::create(path)?;
    let n = response
        .copy_to(&mut file)
        .map_err(|e| BrowserError::Download(e.to_string()))?;
    file.flush()?;
    Ok(n)
}

// ── 元素定位 ──────────────────────────────────────────────────

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(err) => {
            debug!(%selector, error = %err, "invalid selector");
            None
        }
    }
}

/// 第一个命中元素的 href；外层 None 表示没有命中。
fn find_element(html: &str, selector: &str) -> Option<Option<String>> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let element = document.select(&sel).next()?;
    Some(element.value().attr("href").map(str::to_string))
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// 按文档顺序返回所有命中元素的 href，重复的链接原样保留。
fn select_links(html: &str, base: &Url, selector: &str) -> Vec<String> {
    let Some(sel) = parse_selector(selector) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .filter_map(|href| resolve(base, href))
        .collect()
}

fn download_target(html: &str, base: &Url, selector: &str) -> BrowserResult<String> {
    let href = find_element(html, selector).ok_or_else(|| BrowserError::ElementNotFound {
        selector: selector.to_string(),
    })?;

    let own_href = href.filter(|h| !h.is_empty() && h != "#" && !h.starts_with("javascript:"));
    let scripted = || {
        re_window_open()
            .captures(html)
            .map(|c| c[1].replace("&amp;", "&"))
    };

    own_href
        .or_else(scripted)
        .and_then(|target| resolve(base, &target))
        .ok_or_else(|| BrowserError::NoDownload {
            selector: selector.to_string(),
        })
}

fn disposition_filename(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let name = re_disposition_star()
        .captures(raw)
        .or_else(|| re_disposition().captures(raw))
        .map(|c| c[1].trim().trim_matches('"').replace("%20", " "))?;
    sanitize_filename(&name)
}

/// 只保留最后一段，避免服务端给出的名字跳出下载目录。
fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match last {
        "" | "." | ".." => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASTE_PAGE: &str = r#"
<html><body>
<nav><a href="/about">About</a></nav>
<div id="plaintext" class="content">
  <ul>
    <li><a href="https://fuckingfast.co/a1#Game_--_.part001.rar">part 1</a></li>
    <li><a href='https://fuckingfast.co/a2#Game_--_.part002.rar'>part 2</a></li>
    <li><div><a href="/relative#bonus.bin">bonus</a></div></li>
    <li><a href="">empty</a></li>
  </ul>
  <a href="https://elsewhere/outside-list">not in list</a>
</div>
<footer><ul><li><a href="/footer">footer</a></li></ul></footer>
</body></html>
"#;

    const DOWNLOAD_PAGE: &str = r#"
<html><body>
<button class="link-button text-5xl gay-button" onclick="download()">DOWNLOAD</button>
<script>
function download() { window.open("https://dl.fuckingfast.co/dl/abc?x=1&amp;y=2"); }
</script>
</body></html>
"#;

    fn base() -> Url {
        Url::parse("https://paste.fitgirl-repacks.site/?abc").unwrap()
    }

    #[test]
    fn lists_links_inside_the_scoped_list_only() {
        let links = select_links(PASTE_PAGE, &base(), "#plaintext ul li a");
        assert_eq!(
            links,
            vec![
                "https://fuckingfast.co/a1#Game_--_.part001.rar",
                "https://fuckingfast.co/a2#Game_--_.part002.rar",
                "https://paste.fitgirl-repacks.site/relative#bonus.bin",
            ]
        );
    }

    #[test]
    fn unquoted_and_entity_hrefs_are_listed() {
        let html = r#"<div id="plaintext"><ul>
            <li><a href=https://fuckingfast.co/u1#Game.part1.rar>unquoted</a></li>
            <li><a href="/dl?a=1&amp;b=2#bonus.bin">entity</a></li>
        </ul></div>"#;
        let links = select_links(html, &base(), "#plaintext ul li a");
        assert_eq!(
            links,
            vec![
                "https://fuckingfast.co/u1#Game.part1.rar",
                "https://paste.fitgirl-repacks.site/dl?a=1&b=2#bonus.bin",
            ],
            "unquoted attributes and entities must parse like a browser"
        );
    }

    #[test]
    fn markup_inside_scripts_is_not_an_element() {
        let html = r#"<div id="plaintext"><ul>
            <li><a href="https://fuckingfast.co/real#real.bin">real</a></li>
        </ul></div>
        <script>var s = '<div id="plaintext"><ul><li><a href="https://evil/fake#fake.bin">x</a></li></ul></div>';</script>"#;
        let links = select_links(html, &base(), "#plaintext ul li a");
        assert_eq!(links, vec!["https://fuckingfast.co/real#real.bin"]);
    }

    #[test]
    fn duplicate_hrefs_are_kept_in_page_order() {
        let html = r#"<div id="plaintext"><ul>
            <li><a href="https://fuckingfast.co/a#same.bin">one</a></li>
            <li><a href="https://fuckingfast.co/b#other.bin">two</a></li>
            <li><a href="https://fuckingfast.co/a#same.bin">again</a></li>
        </ul></div>"#;
        let links = select_links(html, &base(), "#plaintext ul li a");
        assert_eq!(
            links,
            vec![
                "https://fuckingfast.co/a#same.bin",
                "https://fuckingfast.co/b#other.bin",
                "https://fuckingfast.co/a#same.bin",
            ],
            "each listed anchor is its own job"
        );
    }

    #[test]
    fn invalid_selector_finds_nothing() {
        assert!(select_links(PASTE_PAGE, &base(), "ul >> [").is_empty());
        assert!(matches!(
            download_target(DOWNLOAD_PAGE, &base(), "ul >> ["),
            Err(BrowserError::ElementNotFound { .. })
        ));
    }

    #[test]
    fn class_selector_requires_every_class() {
        assert!(find_element(DOWNLOAD_PAGE, ".link-button.text-5xl").is_some());
        assert!(find_element(DOWNLOAD_PAGE, ".link-button.missing").is_none());
    }

    #[test]
    fn click_target_comes_from_window_open() {
        let target = download_target(DOWNLOAD_PAGE, &base(), ".link-button.text-5xl").unwrap();
        assert_eq!(target, "https://dl.fuckingfast.co/dl/abc?x=1&y=2");
    }

    #[test]
    fn click_target_prefers_element_href() {
        let html = r#"<a class="link-button text-5xl" href="/file.rar">go</a>"#;
        let target = download_target(html, &base(), ".link-button.text-5xl").unwrap();
        assert_eq!(target, "https://paste.fitgirl-repacks.site/file.rar");
    }

    #[test]
    fn click_without_target_is_an_error() {
        let html = r#"<button class="link-button text-5xl">go</button>"#;
        match download_target(html, &base(), ".link-button.text-5xl") {
            Err(BrowserError::NoDownload { selector }) => assert_eq!(selector, ".link-button.text-5xl"),
            other => panic!("expected NoDownload, got: {other:?}"),
        }
    }

    #[test]
    fn missing_element_is_reported() {
        assert!(matches!(
            download_target("<p>nothing</p>", &base(), ".link-button"),
            Err(BrowserError::ElementNotFound { .. })
        ));
    }

    #[test]
    fn content_disposition_filename_variants() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(r#"attachment; filename="Game.part001.rar""#),
        );
        assert_eq!(disposition_filename(&headers).as_deref(), Some("Game.part001.rar"));

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename*=UTF-8''My%20Game.part002.rar"),
        );
        assert_eq!(disposition_filename(&headers).as_deref(), Some("My Game.part002.rar"));

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(r#"attachment; filename="../../etc/passwd""#),
        );
        assert_eq!(disposition_filename(&headers).as_deref(), Some("passwd"));
    }

    #[test]
    fn sanitize_rejects_empty_and_dot_names() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename(r"a\b.rar").as_deref(), Some("b.rar"));
    }
    fn read_request(stream: &mut std::net::TcpStream) {
        use std::io::Read;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// 第一个连接返回下载页，第二个连接只发响应头和几个字节后停住。
    fn spawn_stalling_server() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let page = r#"<a class="link-button text-5xl" href="/file.bin">go</a>"#;
            let (mut conn, _) = listener.accept().unwrap();
            read_request(&mut conn);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                page.len()
            );
            conn.write_all(head.as_bytes()).unwrap();
            conn.write_all(page.as_bytes()).unwrap();
            drop(conn);

            let (mut conn, _) = listener.accept().unwrap();
            read_request(&mut conn);
            conn.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nabc")
                .unwrap();
            conn.flush().unwrap();
            std::thread::sleep(Duration::from_secs(5));
        });
        format!("http://{addr}/page")
    }

    #[test]
    fn stalled_download_body_times_out() {
        let url = spawn_stalling_server();
        let driver = HttpDriver::launch(HttpDriverOptions {
            user_agent: "paste-dl-test".into(),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(300),
            headless: true,
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");

        let mut page = driver.open_page().unwrap();
        page.navigate(&url, Duration::from_secs(3)).unwrap();
        let started = std::time::Instant::now();
        let result = page
            .await_download(".link-button.text-5xl", Duration::from_secs(1))
            .and_then(|download| {
                assert_eq!(download.suggested_filename(), "file.bin");
                download.save_as(&path)
            });
        let elapsed = started.elapsed();

        assert!(result.is_err(), "a stalled body must fail the attempt, got {result:?}");
        assert!(
            elapsed < Duration::from_secs(3),
            "worker blocked for {elapsed:?} on a stalled server"
        );
        assert!(!path.exists(), "no file is left behind");
        assert!(!dir.path().join("file.bin.part").exists(), "partial file is removed");
    }
}
