//! 文档单元状态跟踪模块
//!
//! 持久化每个文档单元的翻译状态，支撑文件级断点续传：
//! 已成功的单元永远不会被再次处理。

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::utils::{load_json_or_default, write_json_atomic};

/// 文档单元的持久化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Pending,
    // 兼容旧版状态文件中的 "completed"
    #[serde(alias = "completed")]
    Success,
    Failed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Success => "success",
            UnitState::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文档单元状态跟踪器
#[derive(Debug)]
pub struct UnitStatusTracker {
    states: BTreeMap<String, UnitState>,
    status_file: PathBuf,
}

impl UnitStatusTracker {
    /// 从状态文件加载
    ///
    /// 文件缺失或损坏时所有单元视为 `pending`；无法识别的状态值同样视为 `pending`。
    pub fn load(status_file: impl Into<PathBuf>) -> Self {
        let status_file = status_file.into();
        let raw: BTreeMap<String, serde_json::Value> = load_json_or_default(&status_file, "状态文件");

        let states = raw
            .into_iter()
            .map(|(unit_id, value)| {
                let state = serde_json::from_value::<UnitState>(value.clone()).unwrap_or_else(|_| {
                    warn!("⚠️  单元 {} 的状态值无法识别: {}，按 pending 处理", unit_id, value);
                    UnitState::Pending
                });
                (unit_id, state)
            })
            .collect::<BTreeMap<_, _>>();
        debug!("加载单元状态: {} 条 ({})", states.len(), status_file.display());

        Self { states, status_file }
    }

    /// 查询单元状态，未记录的单元为 `pending`
    pub fn state(&self, unit_id: &str) -> UnitState {
        self.states.get(unit_id).copied().unwrap_or(UnitState::Pending)
    }

    /// 更新单元状态并立即持久化
    pub fn mark(&mut self, unit_id: &str, state: UnitState) -> Result<(), StoreError> {
        self.states.insert(unit_id.to_string(), state);
        write_json_atomic(&self.status_file, &self.states)
    }

    /// 断点续传查询：返回尚未成功的单元，保持原有顺序
    pub fn pending_or_failed_units(&self, all_units: &[String]) -> Vec<String> {
        all_units
            .iter()
            .filter(|unit_id| self.state(unit_id) != UnitState::Success)
            .cloned()
            .collect()
    }

    /// 全部单元是否均已成功（空集合视为成功）
    pub fn all_succeeded(&self, all_units: &[String]) -> bool {
        all_units
            .iter()
            .all(|unit_id| self.state(unit_id) == UnitState::Success)
    }

    /// 统计各状态的单元数量 (pending, success, failed)
    pub fn summary(&self, all_units: &[String]) -> (usize, usize, usize) {
        all_units
            .iter()
            .fold((0, 0, 0), |(pending, success, failed), unit_id| match self.state(unit_id) {
                UnitState::Pending => (pending + 1, success, failed),
                UnitState::Success => (pending, success + 1, failed),
                UnitState::Failed => (pending, success, failed + 1),
            })
    }

    pub fn path(&self) -> &Path {
        &self.status_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn units(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_file_defaults_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = UnitStatusTracker::load(dir.path().join("status.json"));
        assert_eq!(tracker.state("OEBPS/ch1.xhtml"), UnitState::Pending);
    }

    #[test]
    fn test_mark_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut tracker = UnitStatusTracker::load(&path);
        tracker.mark("a.xhtml", UnitState::Success).unwrap();
        tracker.mark("b.xhtml", UnitState::Failed).unwrap();

        let reloaded = UnitStatusTracker::load(&path);
        assert_eq!(reloaded.state("a.xhtml"), UnitState::Success);
        assert_eq!(reloaded.state("b.xhtml"), UnitState::Failed);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"success\""));
        assert!(raw.contains("\"failed\""));
    }

    #[test]
    fn test_resume_query_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = UnitStatusTracker::load(dir.path().join("status.json"));
        tracker.mark("A", UnitState::Success).unwrap();
        tracker.mark("B", UnitState::Failed).unwrap();
        tracker.mark("C", UnitState::Pending).unwrap();

        let all = units(&["D", "C", "A", "B"]);
        assert_eq!(tracker.pending_or_failed_units(&all), units(&["D", "C", "B"]));
        assert!(!tracker.all_succeeded(&all));
        assert_eq!(tracker.summary(&all), (2, 1, 1));
    }

    #[test]
    fn test_all_succeeded() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = UnitStatusTracker::load(dir.path().join("status.json"));
        assert!(tracker.all_succeeded(&[]));

        let all = units(&["A", "B"]);
        tracker.mark("A", UnitState::Success).unwrap();
        assert!(!tracker.all_succeeded(&all));
        tracker.mark("B", UnitState::Success).unwrap();
        assert!(tracker.all_succeeded(&all));
    }

    #[test]
    fn test_corrupt_and_legacy_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        fs::write(&path, "not json at all").unwrap();
        let tracker = UnitStatusTracker::load(&path);
        assert_eq!(tracker.state("A"), UnitState::Pending);

        fs::write(&path, r#"{"A": "completed", "B": "exploded", "C": 7, "D": "failed"}"#).unwrap();
        let tracker = UnitStatusTracker::load(&path);
        assert_eq!(tracker.state("A"), UnitState::Success);
        assert_eq!(tracker.state("B"), UnitState::Pending);
        assert_eq!(tracker.state("C"), UnitState::Pending);
        assert_eq!(tracker.state("D"), UnitState::Failed);
    }
}
