//! 文档单元模块
//!
//! 定义编排器与具体文档格式之间的接口。编排器只通过 `DocumentSource`
//! 枚举单元、提取段落和写回译文，不关心HTML或EPUB的细节。

// 标准库导入
use std::fs;
use std::path::{Path, PathBuf};

// 第三方crate导入
use tracing::debug;
use walkdir::WalkDir;

// 本地模块导入
use crate::api_constants::workspace_config;
use crate::error::UnitError;
use crate::html_processor::{self, MarkupKind};

/// 文档单元中的一个可翻译文本段落
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 段落在单元内的位置（从0开始）
    pub ordinal: usize,
    /// 段落文本（已去除首尾空白）
    pub text: String,
}

impl Segment {
    pub fn new(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }
}

/// 文档单元来源
///
/// `render` 必须按 `ordinal` 把段落写回原位置，并保留单元其余的结构。
pub trait DocumentSource {
    /// 枚举所有文档单元，顺序稳定
    fn list_units(&self) -> Result<Vec<String>, UnitError>;

    /// 按文档顺序提取单元中的段落
    fn extract_segments(&self, unit_id: &str) -> Result<Vec<Segment>, UnitError>;

    /// 用给定段落重写单元
    fn render(&self, unit_id: &str, segments: &[Segment]) -> Result<(), UnitError>;
}

/// 解压后EPUB内容目录中的HTML/XHTML文档
#[derive(Debug, Clone)]
pub struct EpubDocuments {
    content_dir: PathBuf,
}

impl EpubDocuments {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    fn unit_path(&self, unit_id: &str) -> PathBuf {
        unit_id
            .split('/')
            .fold(self.content_dir.clone(), |path, part| path.join(part))
    }

    fn read_unit(&self, unit_id: &str) -> Result<String, UnitError> {
        let path = self.unit_path(unit_id);
        let bytes = fs::read(&path).map_err(|e| UnitError::io(&path, "读取", e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// 是否为需要翻译的文档文件
fn is_document_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            workspace_config::DOCUMENT_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

impl DocumentSource for EpubDocuments {
    fn list_units(&self) -> Result<Vec<String>, UnitError> {
        let mut units = Vec::new();

        for entry in WalkDir::new(&self.content_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.content_dir).to_path_buf();
                UnitError::io(path, "遍历", e.into())
            })?;

            if !entry.file_type().is_file() || !is_document_file(entry.path()) {
                continue;
            }

            if let Ok(relative) = entry.path().strip_prefix(&self.content_dir) {
                let unit_id = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                units.push(unit_id);
            }
        }

        debug!("发现 {} 个文档单元", units.len());
        Ok(units)
    }

    fn extract_segments(&self, unit_id: &str) -> Result<Vec<Segment>, UnitError> {
        let content = self.read_unit(unit_id)?;
        let kind = MarkupKind::detect(unit_id, &content);
        let (_, body) = html_processor::split_xml_prolog(&content);

        let dom = html_processor::parse_markup(body, kind).map_err(|e| UnitError::HtmlParse {
            unit_id: unit_id.to_string(),
            details: e.to_string(),
        })?;

        Ok(html_processor::extract_segments(&dom))
    }

    fn render(&self, unit_id: &str, segments: &[Segment]) -> Result<(), UnitError> {
        let content = self.read_unit(unit_id)?;
        let kind = MarkupKind::detect(unit_id, &content);
        let (prolog, body) = html_processor::split_xml_prolog(&content);

        let html_error = |e: anyhow::Error| UnitError::HtmlParse {
            unit_id: unit_id.to_string(),
            details: e.to_string(),
        };

        let dom = html_processor::parse_markup(body, kind).map_err(html_error)?;
        let applied = html_processor::apply_segments(&dom, segments).map_err(html_error)?;
        if applied == 0 {
            debug!("单元 {} 无变化，保留原文件", unit_id);
            return Ok(());
        }

        let mut output = html_processor::serialize_markup(&dom, kind).map_err(html_error)?;
        if kind == MarkupKind::Xhtml {
            output = html_processor::restore_namespace_declarations(body, &output);
        }
        if let Some(prolog) = prolog {
            output = format!("{}\n{}", prolog, output);
        }

        let path = self.unit_path(unit_id);
        fs::write(&path, output).map_err(|e| UnitError::io(&path, "写入", e))?;
        debug!("单元 {} 已写回 {} 处译文", unit_id, applied);
        Ok(())
    }
}
