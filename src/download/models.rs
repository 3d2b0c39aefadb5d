//! 下载相关的数据模型定义。

/// 一个逻辑下载单元：单个文件，或同一压缩包的全部分卷。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    /// 去掉分卷后缀并转小写后的基名。
    pub name: String,
    /// 分卷按编号升序；单文件组只有一个成员。
    pub files: Vec<String>,
    pub selected: bool,
}

impl FileGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            selected: true,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// 一次运行的汇总：尝试数 / 成功数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub attempted: usize,
    pub succeeded: usize,
}

impl RunResult {
    pub fn record(&mut self, success: bool) {
        self.attempted += 1;
        if success {
            self.succeeded += 1;
        }
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// 选择阶段的结果。取消由调用方决定如何退出。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Confirmed(Vec<FileGroup>),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSummary {
    pub groups: usize,
    pub total_groups: usize,
    pub files: usize,
}

impl SelectionSummary {
    pub fn of(groups: &[FileGroup]) -> Self {
        let mut summary = Self {
            groups: 0,
            total_groups: groups.len(),
            files: 0,
        };
        for group in groups.iter().filter(|g| g.selected) {
            summary.groups += 1;
            summary.files += group.file_count();
        }
        summary
    }
}
