//! 统一错误处理模块
//!
//! 按影响范围划分错误类型：
//! - `TranslateError`: 单次翻译API调用的结果（段落级）
//! - `UnitError`: 导致整个文档单元失败的错误（单元级）
//! - `StoreError`: 缓存/状态文件持久化错误
//! - `ConfigError`: 配置校验错误

// 标准库导入
use std::path::PathBuf;
use std::time::Duration;

// 第三方crate导入
use thiserror::Error;

/// 翻译后端返回的错误
///
/// 编排器依据变体决定重试策略：限流走密钥轮换，临时错误走有限重试，
/// 不可恢复错误直接跳过该段落。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslateError {
    /// API限流（HTTP 429 / 配额耗尽）
    #[error("API限流 (服务端建议等待: {retry_hint:?})")]
    RateLimited {
        /// 服务端给出的重试等待时间
        retry_hint: Option<Duration>,
    },

    /// 临时错误（网络、超时、5xx、空响应）
    #[error("临时错误: {message}")]
    Transient {
        /// 错误详情
        message: String,
    },

    /// 不可恢复错误（请求被拒绝、内容被拦截等）
    #[error("不可恢复错误: {message}")]
    Fatal {
        /// 错误详情
        message: String,
    },
}

/// 导致文档单元处理中止的错误
#[derive(Debug, Error)]
pub enum UnitError {
    /// 所有API密钥均处于冷却中且等待轮次已用尽
    #[error("所有 {credential_count} 个API密钥均已耗尽 (已等待 {wait_cycles} 轮)")]
    AllExhausted {
        /// 密钥数量
        credential_count: usize,
        /// 已经历的等待轮次
        wait_cycles: u32,
    },

    /// 单个段落收到的限流响应次数超过上限
    #[error("段落连续限流 {attempts} 次，超过上限")]
    RateLimitExceeded {
        /// 已收到的限流响应次数
        attempts: u32,
    },

    /// 提取或写回文档时的文件错误
    #[error("文件{operation}操作失败 [{path}]: {source}")]
    ExternalIo {
        /// 文件路径
        path: PathBuf,
        /// 操作类型（读取、写入等）
        operation: &'static str,
        /// 底层错误
        #[source]
        source: std::io::Error,
    },

    /// HTML解析或序列化失败
    #[error("HTML处理失败 [{unit_id}]: {details}")]
    HtmlParse {
        /// 文档单元标识
        unit_id: String,
        /// 具体错误信息
        details: String,
    },
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("写入存储文件失败 [{path}]: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("序列化存储内容失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("未提供API密钥 (使用 --api-key 或设置 GOOGLE_API_KEY 环境变量)")]
    NoApiKeys,

    #[error("配置错误 [{field}]: {reason}")]
    InvalidValue {
        /// 配置项名称
        field: &'static str,
        /// 错误原因
        reason: String,
    },
}

/// 段落级翻译结果类型别名
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

/// 便捷的翻译错误创建宏
#[macro_export]
macro_rules! translate_error {
    (rate_limited) => {
        $crate::error::TranslateError::RateLimited { retry_hint: None }
    };
    (rate_limited, $hint:expr) => {
        $crate::error::TranslateError::RateLimited { retry_hint: $hint }
    };
    (transient, $msg:expr) => {
        $crate::error::TranslateError::Transient {
            message: $msg.to_string(),
        }
    };
    (fatal, $msg:expr) => {
        $crate::error::TranslateError::Fatal {
            message: $msg.to_string(),
        }
    };
}

impl UnitError {
    /// 构造文件操作错误
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        UnitError::ExternalIo {
            path: path.into(),
            operation,
            source,
        }
    }
}

impl From<reqwest::Error> for TranslateError {
    fn from(error: reqwest::Error) -> Self {
        // 传输层错误一律视为临时错误
        TranslateError::Transient {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UnitError::AllExhausted {
            credential_count: 3,
            wait_cycles: 5,
        };

        assert_eq!(
            format!("{}", err),
            "所有 3 个API密钥均已耗尽 (已等待 5 轮)"
        );
    }

    #[test]
    fn test_error_macro() {
        let err = translate_error!(rate_limited, Some(Duration::from_secs(7)));
        match err {
            TranslateError::RateLimited { retry_hint } => {
                assert_eq!(retry_hint, Some(Duration::from_secs(7)));
            }
            _ => panic!("Wrong error type"),
        }

        let err = translate_error!(fatal, "blocked");
        assert_eq!(
            err,
            TranslateError::Fatal {
                message: "blocked".to_string()
            }
        );
    }

    #[test]
    fn test_io_error_source_chain() {
        use std::error::Error as _;

        let err = UnitError::io(
            "OEBPS/ch1.xhtml",
            "写入",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert!(format!("{}", err).contains("OEBPS/ch1.xhtml"));
    }
}
