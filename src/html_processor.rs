//! HTML处理模块
//!
//! 提供HTML/XHTML解析、文本段落提取、按位置回写译文和序列化功能。
//! 提取与回写使用同一遍历顺序，段落序号即其在文档中的位置。
//! XHTML走xml5ever，保证写回后仍是合法的XML；普通HTML走html5ever。

// 标准库导入
use std::sync::LazyLock;

// 第三方crate导入
use anyhow::Result;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::{Captures, Regex};

// 本地模块导入
use crate::document::Segment;

/// 内容不参与翻译的标签（包括其所有后代）
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "title", "meta", "link", "head", "noscript", "code", "pre",
];

/// 可翻译属性
const TRANSLATABLE_ATTRIBUTES: &[&str] = &["alt", "title"];

/// HTML空元素，XHTML序列化时写成自闭合形式
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// xml5ever输出的空元素对，如 `<br></br>`、`<img src="a.png"></img>`
static EMPTY_VOID_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    let names = VOID_ELEMENTS.join("|");
    Regex::new(&format!(r"<({names})(\s[^<>]*)?></({names})>")).expect("合法的空元素正则")
});

/// 第一个开始标签，即根元素
static ROOT_START_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z_][\w.:-]*(\s[^<>]*)?>").expect("合法的根标签正则"));

/// 带前缀的命名空间声明，如 `xmlns:epub="http://www.idpf.org/2007/ops"`
static PREFIX_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bxmlns:([\w.-]+)\s*=\s*("[^"]*"|'[^']*')"#).expect("合法的命名空间声明正则")
});

/// 文档的标记语法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    /// HTML语法，由html5ever解析和序列化
    Html,
    /// XML语法（XHTML），由xml5ever解析和序列化
    Xhtml,
}

impl MarkupKind {
    /// 根据文件名和内容判断语法：`.xhtml` 或带XML声明的文件按XHTML处理
    pub fn detect(file_name: &str, content: &str) -> Self {
        let is_xhtml_file = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.eq_ignore_ascii_case("xhtml"))
            .unwrap_or(false);

        if is_xhtml_file || split_xml_prolog(content).0.is_some() {
            MarkupKind::Xhtml
        } else {
            MarkupKind::Html
        }
    }
}

/// 文档中一个可翻译文本的位置
#[derive(Debug, Clone)]
pub enum TextSlot {
    /// 文本节点
    Text(Handle),
    /// 元素属性（元素句柄 + 属性下标）
    Attribute { element: Handle, index: usize },
}

impl TextSlot {
    /// 读取该位置的原始文本（未去除首尾空白）
    pub fn raw_text(&self) -> String {
        match self {
            TextSlot::Text(handle) => match handle.data {
                NodeData::Text { ref contents } => contents.borrow().to_string(),
                _ => String::new(),
            },
            TextSlot::Attribute { element, index } => match element.data {
                NodeData::Element { ref attrs, .. } => attrs
                    .borrow()
                    .get(*index)
                    .map(|attr| attr.value.to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            },
        }
    }

    /// 写入新文本
    fn write(&self, text: &str) {
        match self {
            TextSlot::Text(handle) => {
                if let NodeData::Text { ref contents } = handle.data {
                    let mut content_ref = contents.borrow_mut();
                    content_ref.clear();
                    content_ref.push_slice(text);
                }
            }
            TextSlot::Attribute { element, index } => {
                if let NodeData::Element { ref attrs, .. } = element.data {
                    if let Some(attr) = attrs.borrow_mut().get_mut(*index) {
                        attr.value = text.to_string().into();
                    }
                }
            }
        }
    }
}

/// 拆分XML声明，返回 (声明, 剩余内容)
///
/// html5ever会把 `<?xml ...?>` 当作注释处理，xml5ever也不会原样写回，
/// 需要在解析前取出、序列化后放回。
pub fn split_xml_prolog(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            let (prolog, rest) = trimmed.split_at(end + 2);
            return (Some(prolog), rest);
        }
    }
    (None, content)
}

/// 解析HTML文档
pub fn parse_html(content: &str) -> Result<RcDom> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut content.as_bytes())
        .map_err(|e| anyhow::anyhow!("HTML解析失败: {:?}", e))
}

/// 解析XHTML文档
pub fn parse_xhtml(content: &str) -> Result<RcDom> {
    xml5ever::driver::parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut content.trim_start().as_bytes())
        .map_err(|e| anyhow::anyhow!("XHTML解析失败: {:?}", e))
}

/// 按语法解析文档
pub fn parse_markup(content: &str, kind: MarkupKind) -> Result<RcDom> {
    match kind {
        MarkupKind::Html => parse_html(content),
        MarkupKind::Xhtml => parse_xhtml(content),
    }
}

/// 按文档顺序收集所有可翻译位置
pub fn collect_text_slots(dom: &RcDom) -> Vec<TextSlot> {
    let mut slots = Vec::new();
    let mut stack = vec![dom.document.clone()];

    while let Some(node) = stack.pop() {
        match node.data {
            NodeData::Text { ref contents } => {
                if !contents.borrow().trim().is_empty() {
                    slots.push(TextSlot::Text(node.clone()));
                }
            }
            NodeData::Element {
                ref name,
                ref attrs,
                ..
            } => {
                let tag_name = name.local.as_ref();
                if SKIPPED_TAGS.contains(&tag_name) {
                    continue;
                }

                for (index, attr) in attrs.borrow().iter().enumerate() {
                    let attr_name = attr.name.local.as_ref();
                    if TRANSLATABLE_ATTRIBUTES.contains(&attr_name) && !attr.value.trim().is_empty() {
                        slots.push(TextSlot::Attribute {
                            element: node.clone(),
                            index,
                        });
                    }
                }
            }
            _ => {}
        }

        // 逆序压栈以保持文档顺序
        for child in node.children.borrow().iter().rev() {
            stack.push(child.clone());
        }
    }

    slots
}

/// 提取文档中的段落（去除首尾空白）
pub fn extract_segments(dom: &RcDom) -> Vec<Segment> {
    collect_text_slots(dom)
        .iter()
        .enumerate()
        .map(|(ordinal, slot)| Segment {
            ordinal,
            text: slot.raw_text().trim().to_string(),
        })
        .collect()
}

/// 将段落文本按位置写回DOM，保留原文本的首尾空白
///
/// 返回实际发生变化的位置数量。段落数量与文档不一致时返回错误。
pub fn apply_segments(dom: &RcDom, segments: &[Segment]) -> Result<usize> {
    let slots = collect_text_slots(dom);
    if slots.len() != segments.len() {
        anyhow::bail!(
            "段落数量不一致: 文档中有 {} 个，收到 {} 个",
            slots.len(),
            segments.len()
        );
    }

    let mut applied_count = 0;
    for (slot, segment) in slots.iter().zip(segments) {
        let raw = slot.raw_text();
        if raw.trim() == segment.text {
            continue;
        }
        slot.write(&replace_trimmed(&raw, &segment.text));
        applied_count += 1;
    }

    Ok(applied_count)
}

/// 用新文本替换原文本中去除首尾空白后的部分
fn replace_trimmed(raw: &str, replacement: &str) -> String {
    let leading = raw.len() - raw.trim_start().len();
    let trailing_start = raw.trim_end().len().max(leading);
    format!("{}{}{}", &raw[..leading], replacement, &raw[trailing_start..])
}

/// 序列化DOM为HTML字符串
pub fn serialize_dom_to_html(dom: &RcDom) -> Result<String> {
    use html5ever::serialize::{serialize, SerializeOpts};
    use std::io::Cursor;

    let mut buffer = Vec::new();
    let cursor = Cursor::new(&mut buffer);

    serialize(
        cursor,
        &SerializableHandle::from(dom.document.clone()),
        SerializeOpts::default(),
    )
    .map_err(|e| anyhow::anyhow!("HTML序列化失败: {:?}", e))?;

    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("UTF-8转换失败: {}", e))
}

/// 序列化DOM为XHTML字符串，空元素写成 `<br/>` 形式
pub fn serialize_dom_to_xhtml(dom: &RcDom) -> Result<String> {
    let mut buffer = Vec::new();

    xml5ever::serialize::serialize(
        &mut buffer,
        &SerializableHandle::from(dom.document.clone()),
        Default::default(),
    )
    .map_err(|e| anyhow::anyhow!("XHTML序列化失败: {:?}", e))?;

    let xml = String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("UTF-8转换失败: {}", e))?;
    let collapsed = EMPTY_VOID_PAIR.replace_all(&xml, |caps: &Captures| {
        if caps[1] == caps[3] {
            format!("<{}{}/>", &caps[1], caps.get(2).map_or("", |m| m.as_str()))
        } else {
            caps[0].to_string()
        }
    });
    Ok(collapsed.into_owned())
}

/// 把源文档根元素上的前缀命名空间声明补回序列化结果的根元素
///
/// xml5ever解析时丢弃 `xmlns:*` 属性，序列化时不会为 `epub:type` 这类属性重新声明前缀。
pub fn restore_namespace_declarations(source: &str, serialized: &str) -> String {
    let (Some(source_root), Some(output_root)) =
        (ROOT_START_TAG.find(source), ROOT_START_TAG.find(serialized))
    else {
        return serialized.to_string();
    };

    let output_tag = output_root.as_str();
    let missing: String = PREFIX_DECLARATION
        .captures_iter(source_root.as_str())
        .filter(|caps| !output_tag.contains(&format!("xmlns:{}=", &caps[1])))
        .map(|caps| format!(" xmlns:{}={}", &caps[1], &caps[2]))
        .collect();
    if missing.is_empty() {
        return serialized.to_string();
    }

    let insert_at = if output_tag.ends_with("/>") {
        output_root.end() - 2
    } else {
        output_root.end() - 1
    };
    format!("{}{}{}", &serialized[..insert_at], missing, &serialized[insert_at..])
}

/// 按语法序列化DOM
pub fn serialize_markup(dom: &RcDom, kind: MarkupKind) -> Result<String> {
    match kind {
        MarkupKind::Html => serialize_dom_to_html(dom),
        MarkupKind::Xhtml => serialize_dom_to_xhtml(dom),
    }
}
