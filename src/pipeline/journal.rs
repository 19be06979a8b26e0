//! 安全相关事件日志 (Transition journal)
//!
//! 每行一条JSON,只追加: 模式切换 (mode) 与 判定升级 (verdict)。
//! 时间戳为 RFC 3339 本地时间。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::flight::{FlightMode, Transition};
use crate::safety::{SafetyVerdict, Severity};

/// 默认日志文件名
pub const DEFAULT_JOURNAL_PATH: &str = "drone_following.log";

#[derive(Serialize)]
struct JournalLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: JournalEvent<'a>,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JournalEvent<'a> {
    Mode {
        from: &'a str,
        to: &'a str,
        cause: String,
    },
    Verdict {
        mode: &'a str,
        severity: Severity,
        reason: &'static str,
        detail: String,
    },
}

pub struct TransitionJournal {
    file: Option<File>,
    path: Option<PathBuf>,
    lines: u64,
}

impl TransitionJournal {
    /// 以追加方式打开 (不存在则创建)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(file),
            path: Some(path.to_path_buf()),
            lines: 0,
        })
    }

    /// 不落盘
    pub fn disabled() -> Self {
        Self {
            file: None,
            path: None,
            lines: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 本次运行写入的行数
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn record_transition(&mut self, transition: &Transition) -> Result<()> {
        self.append(JournalEvent::Mode {
            from: transition.from.name(),
            to: transition.to.name(),
            cause: transition.cause.to_string(),
        })
    }

    /// Ok 判定不记录
    pub fn record_verdict(&mut self, mode: FlightMode, verdict: &SafetyVerdict) -> Result<()> {
        let SafetyVerdict::Violation { reason, severity } = verdict else {
            return Ok(());
        };
        self.append(JournalEvent::Verdict {
            mode: mode.name(),
            severity: *severity,
            reason: reason.label(),
            detail: reason.to_string(),
        })
    }

    fn append(&mut self, event: JournalEvent<'_>) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let line = JournalLine {
            timestamp: chrono::Local::now().to_rfc3339(),
            event,
        };
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');
        file.write_all(json.as_bytes())?;
        file.flush()?;
        self.lines += 1;
        Ok(())
    }
}
