//! 下载计划：把起始页上的原始链接归并成分组，以及选择后的展开。
//!
//! 分组键规则：
//! - 文件名（`#` 之后的片段，否则路径最后一段）转小写；
//! - 命中 `<base>.part<sep?><digits>.rar` 时键为 `<base>`；
//! - 否则键为去掉扩展名的文件名。
//!
//! 以 `/` 结尾的链接文件名为空，键为 `""`，这些链接归到同一个兜底分组。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::models::FileGroup;

fn re_multipart() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^(.+?)\.part[_.]?(\d+)\.rar$").expect("compile multipart regex"))
}

fn re_part_number() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\.part[_.]?(\d+)\.rar$").expect("compile part number regex"))
}

/// 链接对应的显示文件名：最后一个 `#` 之后的文本，没有 `#` 时取路径最后一段。
pub fn display_filename(url: &str) -> &str {
    if let Some(idx) = url.rfind('#') {
        return &url[idx + 1..];
    }
    match url.rfind('/') {
        Some(idx) => &url[idx + 1..],
        None => url,
    }
}

/// 分组键（已转小写）。
pub fn group_key(filename: &str) -> String {
    let lower = filename.to_lowercase();
    if let Some(caps) = re_multipart().captures(&lower) {
        return caps[1].to_string();
    }
    match lower.rfind('.') {
        Some(idx) => lower[..idx].to_string(),
        None => lower,
    }
}

/// 文件名中的分卷编号；不是分卷或编号溢出时为 `None`。
pub fn part_number(filename: &str) -> Option<u64> {
    let lower = filename.to_lowercase();
    re_part_number()
        .captures(&lower)
        .and_then(|caps| caps[1].parse().ok())
}

pub fn group_links(links: &[String]) -> Vec<FileGroup> {
    let mut groups: Vec<FileGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for link in links {
        let key = group_key(display_filename(link));
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(FileGroup::new(key));
            groups.len() - 1
        });
        groups[slot].files.push(link.clone());
    }

    for group in &mut groups {
        sort_by_part_number(&mut group.files);
    }
    groups
}

/// 只在带分卷编号的成员之间按编号稳定排序；不带编号的成员原位不动。
fn sort_by_part_number(files: &mut [String]) {
    let numbered: Vec<(usize, u64)> = files
        .iter()
        .enumerate()
        .filter_map(|(i, url)| part_number(display_filename(url)).map(|n| (i, n)))
        .collect();
    if numbered.len() < 2 {
        return;
    }

    let mut ordered: Vec<(u64, String)> = numbered
        .iter()
        .map(|&(i, n)| (n, files[i].clone()))
        .collect();
    ordered.sort_by_key(|(n, _)| *n);

    for (&(slot, _), (_, url)) in numbered.iter().zip(ordered) {
        files[slot] = url;
    }
}

/// 按分组顺序展开所有已选分组的链接。
pub fn flatten_selected(groups: &[FileGroup]) -> Vec<String> {
    groups
        .iter()
        .filter(|g| g.selected)
        .flat_map(|g| g.files.iter().cloned())
        .collect()
}

/// 首个成员的文件名；多成员时附上 `... <最后一个成员的文件名>`。
pub fn sample_label(group: &FileGroup) -> String {
    let (Some(first), Some(last)) = (group.files.first(), group.files.last()) else {
        return String::new();
    };
    let mut label = display_filename(first).to_string();
    if group.files.len() > 1 {
        label.push_str(" ... ");
        label.push_str(display_filename(last));
    }
    label
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
