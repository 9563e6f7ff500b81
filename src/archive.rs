//! EPUB容器模块
//!
//! EPUB是一个ZIP归档，要求 `mimetype` 作为第一个条目且不压缩。

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// EPUB中必须位于首位的条目名
const MIMETYPE_ENTRY: &str = "mimetype";

/// 解压EPUB到目标目录，返回条目数量
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("打开EPUB文件失败: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("无法识别的EPUB文件: {}", archive_path.display()))?;

    fs::create_dir_all(dest).with_context(|| format!("创建目录失败: {}", dest.display()))?;
    archive
        .extract(dest)
        .with_context(|| format!("解压EPUB失败: {}", archive_path.display()))?;

    info!("📦 已解压 {} 个条目到 {}", archive.len(), dest.display());
    Ok(archive.len())
}

/// 将内容目录重新打包为EPUB，返回写入的条目数量
///
/// `mimetype` 以不压缩方式首先写入，其余文件按路径排序后压缩写入。
pub fn pack_archive(source_dir: &Path, output_path: &Path) -> Result<usize> {
    let mimetype_path = source_dir.join(MIMETYPE_ENTRY);
    if !mimetype_path.is_file() {
        anyhow::bail!("内容目录缺少 mimetype 文件: {}", source_dir.display());
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("创建输出目录失败: {}", parent.display()))?;
    }

    let file = File::create(output_path)
        .with_context(|| format!("创建输出文件失败: {}", output_path.display()))?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MIMETYPE_ENTRY, stored)?;
    zip.write_all(&fs::read(&mimetype_path).context("读取 mimetype 失败")?)?;
    let mut entry_count = 1;

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.context("遍历内容目录失败")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(source_dir)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name == MIMETYPE_ENTRY {
            continue;
        }

        zip.start_file(name.as_str(), deflated)?;
        let mut source = File::open(entry.path())
            .with_context(|| format!("读取文件失败: {}", entry.path().display()))?;
        io::copy(&mut source, &mut zip)?;
        debug!("打包: {}", name);
        entry_count += 1;
    }

    zip.finish().context("写入EPUB失败")?;
    info!("📦 已打包 {} 个条目到 {}", entry_count, output_path.display());
    Ok(entry_count)
}
