//! 历史存储：每用户一份追加式 JSON 日志
//!
//! 运行开始时按时间窗读一次（快照，喂给 excluded_urls），投递成功后追加一次。
//! 同一用户并发运行的写入顺序不做保证（见文档约定，单用户单运行）。

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, Utc};

use crate::report::{BriefReport, HistoryEntry};

/// 历史存储：目录下每用户一个 `<user_id>_history.json`
#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn history_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}_history.json", user_id))
    }

    fn load_all(&self, user_id: &str) -> anyhow::Result<Vec<HistoryEntry>> {
        let path = self.history_path(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read history {}", path.display()))?;
        let entries = serde_json::from_str(&data)
            .with_context(|| format!("parse history {}", path.display()))?;
        Ok(entries)
    }

    /// 最近 window_days 天内的条目（按报告日期过滤）
    pub fn recent_entries(&self, user_id: &str, window_days: i64) -> anyhow::Result<Vec<HistoryEntry>> {
        let cutoff = Utc::now() - Duration::days(window_days);
        Ok(self
            .load_all(user_id)?
            .into_iter()
            .filter(|e| e.report_date > cutoff)
            .collect())
    }

    /// 追加一期简报到日志末尾（仅在投递成功后调用）
    pub fn append(&self, user_id: &str, report: &BriefReport) -> anyhow::Result<()> {
        let mut entries = self.load_all(user_id)?;
        entries.push(HistoryEntry::from_report(report));
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create history dir {}", self.dir.display()))?;
        let path = self.history_path(user_id);
        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)
            .with_context(|| format!("write history {}", path.display()))?;
        Ok(())
    }
}
