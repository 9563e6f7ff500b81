use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::StoreError;

/// 日志预览截断长度
const PREVIEW_CHARS: usize = 70;

/// 初始化日志系统
pub fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// 验证输入文件
pub fn validate_input_file(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("输入文件不存在: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("输入路径不是文件: {}", path.display());
    }

    let is_epub = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("epub"))
        .unwrap_or(false);
    if !is_epub {
        anyhow::bail!("输入文件不是EPUB: {}", path.display());
    }

    Ok(())
}

/// 生成输出文件路径: `<输出目录>/<书名>_<语言后缀>.epub`
pub fn generate_output_path(input: &Path, output_dir: &Path, lang_tag: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    output_dir.join(format!("{}_{}.epub", stem.to_string_lossy(), lang_tag))
}

/// 截断文本用于日志预览
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// 原子写入JSON文件
///
/// 先写入同目录下的临时文件再重命名，崩溃时旧文件保持完整。
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    fs::write(&tmp_path, json).map_err(io_err)?;
    fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

/// 读取JSON文件，文件缺失、为空或损坏时返回默认值
///
/// `label` 仅用于日志。
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!("⚠️  无法读取{} [{}]: {}，从空白状态开始", label, path.display(), e);
            return T::default();
        }
    };

    if data.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(e) => {
            warn!("⚠️  {}已损坏 [{}]: {}，从空白状态开始", label, path.display(), e);
            T::default()
        }
    }
}
