//! 行输入的分组选择，用于拿不到原始模式的终端（管道、重定向等）。

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::download::models::{FileGroup, SelectionOutcome, SelectionSummary};
use crate::download::plan::{pluralize, sample_label};

pub fn run(groups: Vec<FileGroup>) -> Result<SelectionOutcome> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    prompt_for_selection(groups, &mut stdin.lock(), &mut stdout.lock())
        .context("read group selection from stdin")
}

/// 解析要排除的编号（从 1 开始）。返回合法的下标与被忽略的原始片段。
pub(crate) fn parse_exclusions(input: &str, len: usize) -> (Vec<usize>, Vec<String>) {
    let mut indices = Vec::new();
    let mut invalid = Vec::new();
    for token in input.split_whitespace() {
        match token.parse::<usize>() {
            Ok(n) if (1..=len).contains(&n) => indices.push(n - 1),
            _ => invalid.push(token.to_string()),
        }
    }
    (indices, invalid)
}

fn read_line<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    // EOF 当作空行
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn prompt_for_selection<R: BufRead, W: Write>(
    mut groups: Vec<FileGroup>,
    input: &mut R,
    out: &mut W,
) -> io::Result<SelectionOutcome> {
    writeln!(
        out,
        "\nThe following file groups were found. Enter the numbers of groups you want to EXCLUDE, separated by space:"
    )?;
    for (i, group) in groups.iter().enumerate() {
        let count = group.file_count();
        writeln!(
            out,
            "{}. [X] {} ({} {})",
            i + 1,
            group.name,
            count,
            pluralize("file", count)
        )?;
        writeln!(out, "   Sample: {}", sample_label(group))?;
    }

    write!(out, "\nEnter numbers to exclude (or press Enter to download all): ")?;
    out.flush()?;
    let answer = read_line(input)?;

    let (excluded, invalid) = parse_exclusions(&answer, groups.len());
    for token in &invalid {
        writeln!(out, "Warning: Invalid input '{token}' ignored")?;
    }
    for idx in excluded {
        groups[idx].selected = false;
    }

    writeln!(out, "\nSelected groups for download:")?;
    for (i, group) in groups.iter().enumerate() {
        writeln!(
            out,
            "{}. [{}] {} ({} files)",
            i + 1,
            if group.selected { "X" } else { " " },
            group.name,
            group.file_count()
        )?;
    }

    let summary = SelectionSummary::of(&groups);
    if summary.groups == 0 {
        // 空选择交给调用方按错误退出，与主动取消区分
        writeln!(out, "Warning: No groups selected. Exiting.")?;
        return Ok(SelectionOutcome::Confirmed(groups));
    }

    writeln!(
        out,
        "\nWill download {} of {} groups ({} total files).",
        summary.groups, summary.total_groups, summary.files
    )?;
    write!(out, "Press Enter to continue or Ctrl+C to abort... ")?;
    out.flush()?;
    read_line(input)?;

    Ok(SelectionOutcome::Confirmed(groups))
}
