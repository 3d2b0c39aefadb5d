//! 起始链接校验。

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("no start URL given")]
    Missing,
    #[error("invalid URL: must contain {domain}")]
    WrongDomain { domain: String },
}

/// 起始链接必须包含 `required_domain`（忽略大小写）。
pub fn validate_start_url(input: &str, required_domain: &str) -> Result<String, UrlError> {
    let url = input.trim();
    if url.is_empty() {
        return Err(UrlError::Missing);
    }

    let domain = required_domain.trim();
    let wrong_domain = || UrlError::WrongDomain {
        domain: domain.to_string(),
    };
    let re = Regex::new(&format!("(?i){}", regex::escape(domain))).map_err(|_| wrong_domain())?;
    if !re.is_match(url) {
        return Err(wrong_domain());
    }
    Ok(url.to_string())
}
