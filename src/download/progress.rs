//! 下载阶段的终端视图：一根进度条 + 最近 N 行日志。
//!
//! 进度条、空行分隔、N 行日志都是同一个 `MultiProgress` 区域里的行，
//! 由 indicatif 整体清除重绘。环形缓冲与进度计数由同一把锁保护，
//! 因此一次写入与它触发的重绘不会和其他线程交错。

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

use crate::base_system::logging::CONSOLE_TARGET;

/// 固定容量的环形日志缓冲，写满后覆盖最旧的一条。
#[derive(Debug)]
pub(crate) struct LogRing {
    slots: Vec<Option<String>>,
    next: usize,
}

impl LogRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next: 0,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        self.slots[self.next] = Some(line);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// 从最旧到最新，跳过空位与空串。
    pub(crate) fn lines(&self) -> Vec<String> {
        let (newer, older) = self.slots.split_at(self.next);
        older
            .iter()
            .chain(newer)
            .flatten()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

struct ConsoleState {
    ring: LogRing,
    _mp: MultiProgress,
    bar: ProgressBar,
    separator: ProgressBar,
    rows: Vec<ProgressBar>,
    out: Box<dyn Write + Send>,
}

impl ConsoleState {
    fn redraw(&self) {
        let lines = self.ring.lines();
        for (i, row) in self.rows.iter().enumerate() {
            row.set_message(lines.get(i).cloned().unwrap_or_default());
        }
    }
}

pub struct ConsoleMultiplexer {
    state: Mutex<ConsoleState>,
}

impl ConsoleMultiplexer {
    pub fn new(log_lines: usize, total: u64, description: &str) -> Self {
        Self::with_draw_target(log_lines, total, description, ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(
        log_lines: usize,
        total: u64,
        description: &str,
        target: ProgressDrawTarget,
    ) -> Self {
        let mp = MultiProgress::with_draw_target(target);

        let bar_style =
            ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} ({per_sec}) {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
        let bar = mp.add(ProgressBar::new(total));
        bar.set_style(bar_style);
        bar.set_prefix(description.to_string());

        let row_style =
            ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar());
        let separator = mp.add(ProgressBar::new(0));
        separator.set_style(row_style.clone());

        let ring = LogRing::new(log_lines);
        let rows = (0..ring.capacity())
            .map(|_| {
                let row = mp.add(ProgressBar::new(0));
                row.set_style(row_style.clone());
                row
            })
            .collect();

        Self {
            state: Mutex::new(ConsoleState {
                ring,
                _mp: mp,
                bar,
                separator,
                rows,
                out: Box::new(io::stdout()),
            }),
        }
    }

    /// 汇总行的输出位置，默认 stdout。进度条隐藏（非终端）时汇总照样输出。
    pub fn with_output(self, out: impl Write + Send + 'static) -> Self {
        self.lock().out = Box::new(out);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        // 某个 worker panic 后仍继续绘制
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = format!("[{}] {}", clock(), message);
        info!(target: CONSOLE_TARGET, "{message}");

        let mut state = self.lock();
        state.ring.push(line);
        state.redraw();
    }

    pub fn advance(&self, n: u64) {
        let state = self.lock();
        state.bar.inc(n);
        state.redraw();
    }

    /// 收尾：清掉日志行，保留进度条，再输出一行汇总。
    pub fn finalize(&self, message: &str) {
        let mut state = self.lock();
        for row in &state.rows {
            row.finish_and_clear();
        }
        state.separator.finish_and_clear();
        state.bar.finish();
        // 进度条已结束，汇总落在它下方
        let _ = writeln!(state.out, "{message}");
        let _ = state.out.flush();
        info!(target: CONSOLE_TARGET, "{message}");
    }

    #[cfg(test)]
    pub fn position(&self) -> u64 {
        self.lock().bar.position()
    }

    #[cfg(test)]
    pub fn visible_lines(&self) -> Vec<String> {
        self.lock().ring.lines()
    }
}

fn clock() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn hidden(log_lines: usize, total: u64) -> ConsoleMultiplexer {
        ConsoleMultiplexer::with_draw_target(log_lines, total, "Downloading files", ProgressDrawTarget::hidden())
    }

    fn strip_clock(line: &str) -> &str {
        // "[HH:MM:SS] " 前缀
        &line[11..]
    }

    #[test]
    fn ring_keeps_the_most_recent_entries_oldest_first() {
        let mut ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(format!("m{i}"));
        }
        assert_eq!(ring.lines(), vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn ring_before_wrap_returns_what_was_written() {
        let mut ring = LogRing::new(4);
        ring.push("a".into());
        ring.push("".into());
        ring.push("b".into());
        assert_eq!(ring.lines(), vec!["a", "b"], "empty messages are not shown");
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut ring = LogRing::new(0);
        ring.push("a".into());
        ring.push("b".into());
        assert_eq!(ring.lines(), vec!["b"]);
    }

    #[test]
    fn overflow_leaves_exactly_log_lines_messages() {
        let log_lines = 3;
        let console = hidden(log_lines, 10);
        for i in 0..log_lines + 5 {
            console.log(format!("message {i}"));
        }

        let visible = console.visible_lines();
        assert_eq!(visible.len(), log_lines);
        let bodies: Vec<&str> = visible.iter().map(|l| strip_clock(l)).collect();
        assert_eq!(bodies, vec!["message 5", "message 6", "message 7"]);
    }

    #[test]
    fn log_lines_carry_a_timestamp() {
        let console = hidden(2, 1);
        console.log("hello");
        let line = &console.visible_lines()[0];
        assert!(line.starts_with('['), "{line}");
        assert_eq!(&line[9..], "] hello");
    }

    #[test]
    fn concurrent_writers_never_exceed_capacity() {
        let console = Arc::new(hidden(4, 64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let console = Arc::clone(&console);
                thread::spawn(move || {
                    for i in 0..8 {
                        console.log(format!("t{t} m{i}"));
                        console.advance(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(console.position(), 64);
        let visible = console.visible_lines();
        assert_eq!(visible.len(), 4);
        let mut unique = visible.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4, "no duplicates expected: {visible:?}");
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn finalize_keeps_progress_position() {
        let console = hidden(3, 2);
        console.advance(1);
        console.advance(1);
        console.finalize("Downloads completed: 2/2 successful");
        assert_eq!(console.position(), 2);
    }

    #[test]
    fn finalize_prints_tally_even_without_a_terminal() {
        let out = SharedBuf::default();
        let console = hidden(3, 3).with_output(out.clone());
        console.log("[Worker 1] Download completed: a.bin");
        console.advance(3);
        console.finalize("Downloads completed: 2/3 successful\nAll operations completed.");

        let printed = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            printed,
            "Downloads completed: 2/3 successful\nAll operations completed.\n",
            "the tally must not depend on the bar being drawn"
        );
    }
}
