//! 交互式分组选择（ratatui + crossterm）。
//!
//! 状态机与绘制分开：`SelectionMachine` 只处理按键，不碰终端，
//! `run` 负责原始模式、事件循环和每次状态变化后的整屏重绘。

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::{debug, warn};

use crate::download::models::{FileGroup, SelectionOutcome, SelectionSummary};
use crate::download::plan::{pluralize, sample_label};

const HEADER: &str =
    "Navigate with ↑/↓ arrows, toggle selection with SPACE, confirm with ENTER, quit with ESC or Q";
const NO_SELECTION_WARNING: &str = "Warning: No groups selected. Please select at least one group.";
const WARNING_VISIBLE: Duration = Duration::from_secs(2);

pub enum TuiExit {
    Finished(SelectionOutcome),
    /// 拿不到原始模式，原样交还分组，由调用方改走行输入。
    Unavailable(Vec<FileGroup>, anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectState {
    Browsing,
    ConfirmPending,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectKey {
    Up,
    Down,
    Toggle,
    Enter,
    No,
    Quit,
    Other,
}

pub(crate) fn map_key(key: &KeyEvent) -> Option<SelectKey> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    Some(match key.code {
        KeyCode::Up => SelectKey::Up,
        KeyCode::Down => SelectKey::Down,
        KeyCode::Char(' ') => SelectKey::Toggle,
        KeyCode::Enter => SelectKey::Enter,
        KeyCode::Char('n') | KeyCode::Char('N') => SelectKey::No,
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => SelectKey::Quit,
        _ => SelectKey::Other,
    })
}

pub(crate) struct SelectionMachine {
    groups: Vec<FileGroup>,
    cursor: usize,
    state: SelectState,
    warning_until: Option<Instant>,
}

impl SelectionMachine {
    pub(crate) fn new(groups: Vec<FileGroup>) -> Self {
        Self {
            groups,
            cursor: 0,
            state: SelectState::Browsing,
            warning_until: None,
        }
    }

    pub(crate) fn state(&self) -> SelectState {
        self.state
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn groups(&self) -> &[FileGroup] {
        &self.groups
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.state, SelectState::Done | SelectState::Cancelled)
    }

    pub(crate) fn warning_visible(&self, now: Instant) -> bool {
        self.warning_until.is_some_and(|until| now < until)
    }

    pub(crate) fn tick(&mut self, now: Instant) {
        if !self.warning_visible(now) {
            self.warning_until = None;
        }
    }

    pub(crate) fn handle(&mut self, key: SelectKey, now: Instant) {
        // 任意按键都会收起警告
        self.warning_until = None;

        match self.state {
            SelectState::Browsing => self.handle_browsing(key, now),
            SelectState::ConfirmPending => {
                self.state = if key == SelectKey::No {
                    SelectState::Browsing
                } else {
                    SelectState::Done
                };
            }
            SelectState::Done | SelectState::Cancelled => {}
        }
    }

    fn handle_browsing(&mut self, key: SelectKey, now: Instant) {
        match key {
            SelectKey::Up => self.cursor = self.cursor.saturating_sub(1),
            SelectKey::Down => {
                if self.cursor + 1 < self.groups.len() {
                    self.cursor += 1;
                }
            }
            SelectKey::Toggle => {
                if let Some(group) = self.groups.get_mut(self.cursor) {
                    group.selected = !group.selected;
                }
            }
            SelectKey::Enter => {
                if self.groups.iter().any(|g| g.selected) {
                    self.state = SelectState::ConfirmPending;
                } else {
                    self.warning_until = Some(now + WARNING_VISIBLE);
                }
            }
            SelectKey::Quit => self.state = SelectState::Cancelled,
            SelectKey::No | SelectKey::Other => {}
        }
    }

    /// 取消之外的任何结束方式（包括读键出错）都按当前勾选确认。
    pub(crate) fn into_outcome(self) -> SelectionOutcome {
        match self.state {
            SelectState::Cancelled => SelectionOutcome::Cancelled,
            _ => SelectionOutcome::Confirmed(self.groups),
        }
    }
}

pub(crate) fn group_row(group: &FileGroup, index: usize, under_cursor: bool) -> String {
    let count = group.file_count();
    format!(
        "{} {}. [{}] {} ({} {})",
        if under_cursor { ">" } else { " " },
        index + 1,
        if group.selected { "X" } else { " " },
        group.name,
        count,
        pluralize("file", count)
    )
}

pub(crate) fn summary_line(groups: &[FileGroup]) -> String {
    let s = SelectionSummary::of(groups);
    format!(
        "Currently selected: {} of {} groups ({} total files)",
        s.groups, s.total_groups, s.files
    )
}

pub fn run(groups: Vec<FileGroup>) -> TuiExit {
    if let Err(err) = enable_raw_mode() {
        return TuiExit::Unavailable(groups, anyhow!(err).context("enable raw mode"));
    }
    let mut stdout = io::stdout();
    if let Err(err) = execute!(stdout, EnterAlternateScreen) {
        disable_raw_mode().ok();
        return TuiExit::Unavailable(groups, anyhow!(err).context("enter alternate screen"));
    }
    let mut terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
        Ok(t) => t,
        Err(err) => {
            disable_raw_mode().ok();
            execute!(io::stdout(), LeaveAlternateScreen).ok();
            return TuiExit::Unavailable(groups, anyhow!(err).context("init terminal"));
        }
    };

    let mut machine = SelectionMachine::new(groups);
    let result = run_loop(&mut terminal, &mut machine);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    if let Err(err) = result {
        warn!("error reading keyboard: {err:#}; keeping the current selection");
    }
    debug!(state = ?machine.state(), "selection finished");
    TuiExit::Finished(machine.into_outcome())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    machine: &mut SelectionMachine,
) -> Result<()> {
    loop {
        let now = Instant::now();
        machine.tick(now);
        terminal
            .draw(|f| draw(f, machine, now))
            .context("draw selection")?;
        if machine.is_finished() {
            return Ok(());
        }

        if !event::poll(Duration::from_millis(200)).context("poll event")? {
            continue;
        }
        if let Event::Key(key) = event::read().context("read event")?
            && let Some(key) = map_key(&key)
        {
            machine.handle(key, Instant::now());
        }
    }
}

fn draw(frame: &mut ratatui::Frame, machine: &SelectionMachine, now: Instant) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            HEADER,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Select which file groups to download:"),
    ]);
    frame.render_widget(header, layout[0]);

    let items: Vec<ListItem> = machine
        .groups()
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let under_cursor = i == machine.cursor();
            let row = Line::from(group_row(group, i, under_cursor));
            if under_cursor {
                ListItem::new(vec![
                    row,
                    Line::from(Span::styled(
                        format!("      Sample: {}", sample_label(group)),
                        Style::default().fg(Color::DarkGray),
                    )),
                ])
            } else {
                ListItem::new(row)
            }
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::TOP | Borders::BOTTOM))
        .highlight_style(Style::default().fg(Color::Yellow));
    let mut list_state = ListState::default();
    list_state.select(Some(machine.cursor()));
    frame.render_stateful_widget(list, layout[1], &mut list_state);

    frame.render_widget(Paragraph::new(summary_line(machine.groups())), layout[2]);

    let footer = if machine.warning_visible(now) {
        Paragraph::new(NO_SELECTION_WARNING).style(Style::default().fg(Color::Yellow))
    } else if machine.state() == SelectState::ConfirmPending {
        Paragraph::new("Confirm selection? (Y/n): ").style(Style::default().fg(Color::Green))
    } else {
        Paragraph::new("")
    };
    frame.render_widget(footer, layout[3]);
}
