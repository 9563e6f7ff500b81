//! 翻译缓存模块
//!
//! 以原文为键的持久化翻译记忆：
//! - 启动时整体加载到内存
//! - 每次新增条目后立即落盘（崩溃最多丢失正在进行的一条）
//! - 按原文精确匹配，不做任何归一化
//! - 从不淘汰条目

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StoreError;
use crate::utils::{load_json_or_default, write_json_atomic};

/// 持久化翻译缓存
#[derive(Debug)]
pub struct TranslationCache {
    entries: HashMap<String, String>,
    cache_file: PathBuf,
    writes: usize,
}

impl TranslationCache {
    /// 从缓存文件加载
    ///
    /// 文件缺失、为空或损坏时退化为空缓存，不会中止运行。
    pub fn load(cache_file: impl Into<PathBuf>) -> Self {
        let cache_file = cache_file.into();
        let entries: HashMap<String, String> = load_json_or_default(&cache_file, "翻译缓存");
        debug!("加载翻译缓存: {} 条 ({})", entries.len(), cache_file.display());

        Self {
            entries,
            cache_file,
            writes: 0,
        }
    }

    /// 查询缓存
    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    /// 写入缓存并立即持久化
    ///
    /// 持久化失败时内存中的条目仍然保留。
    pub fn put(&mut self, source: impl Into<String>, translated: impl Into<String>) -> Result<(), StoreError> {
        self.entries.insert(source.into(), translated.into());
        self.writes += 1;
        write_json_atomic(&self.cache_file, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 本次运行中的写入次数
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn path(&self) -> &Path {
        &self.cache_file
    }
}
