//! 工作目录管理模块
//!
//! 工作目录保存一次翻译任务的全部中间状态，跨运行持久存在：
//! - `content/`: 解压后的EPUB内容，译文直接写回其中
//! - `translation_cache.json`: 翻译缓存
//! - `translation_status.json`: 单元状态
//!
//! 只有所有单元都成功后才会删除。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api_constants::workspace_config;
use crate::archive::extract_archive;
use crate::cache::TranslationCache;
use crate::status::UnitStatusTracker;

/// 翻译工作目录
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// 使用指定目录作为工作目录
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 为EPUB文件确定工作目录
    ///
    /// 未指定时使用当前目录下的 `<书名>_translation_workspace`。
    pub fn for_archive(archive_path: &Path, override_dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = override_dir {
            return Ok(Self::at(dir));
        }

        let stem = archive_path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("无法从EPUB文件名推断工作目录")?;
        let cwd = std::env::current_dir().context("获取当前目录失败")?;
        Ok(Self::at(
            cwd.join(format!("{}{}", stem, workspace_config::WORKSPACE_SUFFIX)),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(workspace_config::CONTENT_DIR)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join(workspace_config::CACHE_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(workspace_config::STATUS_FILE)
    }

    /// 准备内容目录
    ///
    /// 内容目录不存在或为空时解压EPUB，否则复用上次运行的内容。
    /// 返回是否进行了解压。
    pub fn prepare(&self, archive_path: &Path) -> Result<bool> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("创建工作目录失败: {}", self.root.display()))?;

        let content_dir = self.content_dir();
        if has_entries(&content_dir) {
            info!("♻️  复用已有工作目录: {}", self.root.display());
            return Ok(false);
        }

        // 先解压到临时目录，避免中断后留下不完整的内容目录
        let staging = self.root.join(format!("{}.partial", workspace_config::CONTENT_DIR));
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("清理残留目录失败: {}", staging.display()))?;
        }
        extract_archive(archive_path, &staging)?;

        if content_dir.exists() {
            fs::remove_dir(&content_dir)
                .with_context(|| format!("移除空内容目录失败: {}", content_dir.display()))?;
        }
        fs::rename(&staging, &content_dir)
            .with_context(|| format!("重命名内容目录失败: {}", content_dir.display()))?;

        Ok(true)
    }

    pub fn open_cache(&self) -> TranslationCache {
        TranslationCache::load(self.cache_path())
    }

    pub fn open_tracker(&self) -> UnitStatusTracker {
        UnitStatusTracker::load(self.status_path())
    }

    /// 结束一次运行
    ///
    /// 仅当全部单元成功且未要求保留时删除工作目录，返回是否已删除。
    pub fn finish(&self, all_succeeded: bool, keep: bool) -> Result<bool> {
        if !all_succeeded {
            warn!(
                "⚠️  存在未完成的单元，保留工作目录以便续传: {}",
                self.root.display()
            );
            return Ok(false);
        }
        if keep {
            info!("📁 按要求保留工作目录: {}", self.root.display());
            return Ok(false);
        }

        fs::remove_dir_all(&self.root)
            .with_context(|| format!("删除工作目录失败: {}", self.root.display()))?;
        info!("🗑️  已清理工作目录: {}", self.root.display());
        Ok(true)
    }
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
