//! EPUB Translation CLI - 可断点续传的EPUB翻译工具库
//!
//! 这个库提供了内容分类、翻译缓存、API密钥轮换、单元状态跟踪和翻译流水线编排等核心功能。
//! 中断后重新运行会跳过已完成的文档单元，并复用已缓存的段落译文。

pub mod api_constants;
pub mod archive;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod document;
pub mod error;
pub mod html_processor;
pub mod pipeline;
pub mod rotator;
pub mod stats;
pub mod status;
pub mod translator;
pub mod utils;
pub mod workspace;

pub use cache::TranslationCache;
pub use classifier::{ClassifierThresholds, ContentClassifier};
pub use config::{Cli, PipelineConfig};
pub use document::{DocumentSource, EpubDocuments, Segment};
pub use error::{ConfigError, StoreError, TranslateError, TranslateResult, UnitError};
pub use pipeline::PipelineOrchestrator;
pub use rotator::{Credential, CredentialRotator, RotationPolicy};
pub use stats::{RunReport, RunStats};
pub use status::{UnitState, UnitStatusTracker};
pub use translator::{GeminiTranslator, TranslationBackend};
pub use workspace::Workspace;
