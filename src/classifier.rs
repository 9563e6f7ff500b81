//! 内容分类模块
//!
//! 判断一段文本是否值得发送给翻译API。误判为可翻译会浪费配额，
//! 误判为不可翻译会静默丢失内容，因此只跳过明显不是自然语言的文本。

// 标准库导入
use std::sync::LazyLock;

// 第三方crate导入
use regex::Regex;

// 本地模块导入
use crate::api_constants::classifier_config;

/// 标记/代码形态的正则表达式
static CODE_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // 标签与XML声明
        r"^<[?!/]?[A-Za-z][^>]*>",
        // URL
        r"^(?i:https?://|ftp://|www\.|mailto:)\S+$",
        // 邮箱
        r"^[\w.+-]+@[\w-]+(\.[\w-]+)+$",
        // 绝对或相对路径，或带扩展名的多段路径；"Yes/No" 这类斜杠词组不算
        r"^((\.{0,2}/|[A-Za-z]:\\)[\w.-]+([/\\][\w.-]+)*[/\\]?|[\w.-]+([/\\][\w.-]+)+\.[A-Za-z0-9]{1,5})$",
        // 点号或下划线连接的标识符
        r"^[A-Za-z_][A-Za-z0-9_]*([._][A-Za-z0-9_]+)+$",
        // 类JSON结构
        r#"^\s*(\{\s*"[^"]*"\s*:.*\}|\[\s*[\[{"].*\])\s*$"#,
        // 以关键字开头的代码语句
        r"^\s*(function|var|let|const|def|class|import|return|public|private|fn)\s+[\w$]+.*[;{}=]",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("内置正则表达式必须合法"))
    .collect()
});

/// 运算符与括号字符
const OPERATOR_CHARS: &[char] = &['{', '}', '<', '>', '=', '|', '\\', '^', '~', '$'];

/// 分类器阈值
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierThresholds {
    /// 最少字母字符数，低于该值的文本不翻译
    pub min_alpha_chars: usize,
    /// 符号字符（非字母、非数字、非空白）占比上限
    pub max_symbol_ratio: f64,
    /// 运算符/括号字符占比上限
    pub max_operator_density: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            min_alpha_chars: classifier_config::DEFAULT_MIN_ALPHA_CHARS,
            max_symbol_ratio: classifier_config::DEFAULT_MAX_SYMBOL_RATIO,
            max_operator_density: classifier_config::DEFAULT_MAX_OPERATOR_DENSITY,
        }
    }
}

/// 内容分类器
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    thresholds: ClassifierThresholds,
}

impl ContentClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// 判断文本是否适合翻译
    ///
    /// 纯函数，对任意输入（混合文字、控制字符）都不会panic。
    pub fn is_translatable(&self, text: &str) -> bool {
        let visible: String = text.chars().filter(|c| !c.is_control()).collect();
        let trimmed = visible.trim();
        if trimmed.is_empty() {
            return false;
        }

        let mut alpha = 0usize;
        let mut symbols = 0usize;
        let mut operators = 0usize;
        let mut non_space = 0usize;
        for c in trimmed.chars().filter(|c| !c.is_whitespace()) {
            non_space += 1;
            if c.is_alphabetic() {
                alpha += 1;
            } else if !c.is_numeric() {
                symbols += 1;
                if OPERATOR_CHARS.contains(&c) {
                    operators += 1;
                }
            }
        }

        if alpha < self.thresholds.min_alpha_chars {
            return false;
        }

        // 单一字符的重复（如 "xxxxxxxx"）
        if non_space > 3 && is_single_char_repetition(trimmed) {
            return false;
        }

        let symbol_ratio = symbols as f64 / non_space as f64;
        if symbol_ratio > self.thresholds.max_symbol_ratio {
            return false;
        }

        let operator_density = operators as f64 / non_space as f64;
        if operator_density > self.thresholds.max_operator_density {
            return false;
        }

        !CODE_SHAPES.iter().any(|shape| shape.is_match(trimmed))
    }
}

fn is_single_char_repetition(text: &str) -> bool {
    let mut chars = text.chars().filter(|c| !c.is_whitespace());
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}
