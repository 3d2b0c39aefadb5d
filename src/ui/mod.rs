//! 交互层入口。
//!
//! 分组选择有两套实现：TUI（原始模式逐键操作）与无 UI 的行输入。
//! 终端不支持原始模式时自动退回行输入。

use anyhow::Result;
use tracing::{info, warn};

use crate::download::models::{FileGroup, SelectionOutcome};

pub mod noui;
pub mod tui;

pub fn select_groups(groups: Vec<FileGroup>) -> Result<SelectionOutcome> {
    select_groups_with(groups, tui::run, noui::run)
}

fn select_groups_with<T, L>(groups: Vec<FileGroup>, interactive: T, line_mode: L) -> Result<SelectionOutcome>
where
    T: FnOnce(Vec<FileGroup>) -> tui::TuiExit,
    L: FnOnce(Vec<FileGroup>) -> Result<SelectionOutcome>,
{
    match interactive(groups) {
        tui::TuiExit::Finished(outcome) => Ok(outcome),
        tui::TuiExit::Unavailable(groups, err) => {
            warn!("Failed to open keyboard: {err:#}");
            info!("Falling back to non-interactive mode");
            line_mode(groups)
        }
    }
}
