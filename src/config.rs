//! 配置管理模块
//!
//! 提供CLI参数解析和翻译流水线配置管理功能

// 标准库导入
use std::path::{Path, PathBuf};
use std::time::Duration;

// 第三方crate导入
use clap::Parser;
use tracing::{info, warn};

// 本地模块导入
use crate::api_constants::{api_config, classifier_config, retry_config, service_config};
use crate::classifier::ClassifierThresholds;
use crate::error::ConfigError;
use crate::rotator::RotationPolicy;

/// 临时错误的重试策略
///
/// 与密钥轮换的退避相互独立。
#[derive(Debug, Clone, PartialEq)]
pub struct TransientRetryPolicy {
    /// 临时错误最大重试次数
    pub max_retries: u32,
    /// 重试基础延迟，第n次重试等待 `base_delay * 2^(n-1)`
    pub base_delay: Duration,
}

impl Default for TransientRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_config::DEFAULT_MAX_TRANSIENT_RETRIES,
            base_delay: Duration::from_secs(retry_config::DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl TransientRetryPolicy {
    /// 第 `attempt` 次重试（从1开始）前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(retry_config::MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(RotationPolicy::max_cooldown())
    }
}

/// 翻译流水线配置
///
/// 构造完成后不可变，在创建各组件时显式传入。
/// 支持Builder模式进行链式配置。
///
/// # Examples
///
/// ```rust
/// use epub_translation_cli::config::PipelineConfig;
///
/// let config = PipelineConfig::new(vec!["key-a".to_string(), "key-b".to_string()])
///     .target_language("Japanese")
///     .with_max_transient_retries(3)
///     .build()
///     .unwrap();
/// assert!(config.prompt().contains("Japanese"));
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 目标语言（每次运行固定一种）
    target_language: String,
    /// 提示词模板
    prompt_template: String,
    /// 已代入目标语言的提示词
    prompt: String,
    /// 模型名称
    model: String,
    /// 有序的API密钥集合
    credentials: Vec<String>,
    /// 请求超时
    request_timeout: Duration,
    /// 密钥轮换策略
    rotation: RotationPolicy,
    /// 临时错误重试策略
    transient_retry: TransientRetryPolicy,
    /// 单个段落在每把密钥上允许的最大限流响应次数
    max_rate_limit_retries: u32,
    /// 内容分类阈值
    classifier: ClassifierThresholds,
}

impl PipelineConfig {
    /// 创建新的配置实例
    ///
    /// 除密钥外均为默认值：
    /// - 目标语言: Simplified Chinese
    /// - 模型: gemini-2.0-flash-lite
    /// - 限流退避基础延迟: 2秒，智能等待: 60秒 × 5轮
    /// - 临时错误: 最多重试5次，基础延迟2秒
    pub fn new(credentials: Vec<String>) -> Self {
        Self {
            target_language: service_config::DEFAULT_TARGET_LANGUAGE.to_string(),
            prompt_template: service_config::DEFAULT_TRANSLATION_PROMPT.to_string(),
            prompt: String::new(),
            model: api_config::DEFAULT_MODEL.to_string(),
            credentials,
            request_timeout: Duration::from_secs(api_config::REQUEST_TIMEOUT_SECONDS),
            rotation: RotationPolicy::default(),
            transient_retry: TransientRetryPolicy::default(),
            max_rate_limit_retries: retry_config::DEFAULT_MAX_RATE_LIMIT_RETRIES,
            classifier: ClassifierThresholds::default(),
        }
    }

    /// 从命令行参数构建配置
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::new(resolve_api_keys(&cli.api_keys))
            .target_language(&cli.lang)
            .with_model(&cli.model)
            .with_request_timeout(Duration::from_secs(cli.request_timeout))
            .with_backoff_base(Duration::from_secs(cli.backoff_base_secs))
            .with_smart_wait(Duration::from_secs(cli.smart_wait_secs), cli.max_wait_cycles)
            .with_retry_delay(Duration::from_secs(cli.retry_delay_secs))
            .with_max_transient_retries(cli.max_transient_retries)
            .with_max_rate_limit_retries(cli.max_rate_limit_retries)
            .with_classifier(ClassifierThresholds {
                min_alpha_chars: cli.min_alpha_chars,
                max_symbol_ratio: cli.max_symbol_ratio,
                ..Default::default()
            });

        if let Some(prompt_file) = &cli.prompt_file {
            if let Some(prompt) = read_prompt_file(prompt_file) {
                config = config.with_prompt_template(&prompt);
            }
        } else {
            info!("使用默认翻译提示词");
        }

        config.build()
    }

    /// 校验配置并生成最终提示词
    pub fn build(mut self) -> Result<Self, ConfigError> {
        if self.credentials.is_empty() {
            return Err(ConfigError::NoApiKeys);
        }
        if self.target_language.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "lang",
                reason: "目标语言不能为空".to_string(),
            });
        }
        if self.rotation.smart_wait_max.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "smart_wait_secs",
                reason: "智能等待时间必须大于0".to_string(),
            });
        }
        let max_cooldown = RotationPolicy::max_cooldown();
        if self.rotation.smart_wait_max > max_cooldown {
            return Err(ConfigError::InvalidValue {
                field: "smart_wait_secs",
                reason: format!("不能超过 {} 秒", max_cooldown.as_secs()),
            });
        }
        if self.rotation.base_delay.is_zero() || self.rotation.base_delay > max_cooldown {
            return Err(ConfigError::InvalidValue {
                field: "backoff_base_secs",
                reason: format!("必须在 1 到 {} 秒之间", max_cooldown.as_secs()),
            });
        }
        if self.rotation.wait_budget() >= self.rotation.cooldown_ceiling() {
            return Err(ConfigError::InvalidValue {
                field: "max_wait_cycles",
                reason: format!(
                    "智能等待总时长 {}秒 必须短于最长退避 {}秒，否则持续限流时无法结束",
                    self.rotation.wait_budget().as_secs(),
                    self.rotation.cooldown_ceiling().as_secs()
                ),
            });
        }
        if self.transient_retry.base_delay > max_cooldown {
            return Err(ConfigError::InvalidValue {
                field: "retry_delay_secs",
                reason: format!("不能超过 {} 秒", max_cooldown.as_secs()),
            });
        }
        if !(0.0..=1.0).contains(&self.classifier.max_symbol_ratio) {
            return Err(ConfigError::InvalidValue {
                field: "max_symbol_ratio",
                reason: format!("必须在 [0.0, 1.0] 范围内，当前为 {}", self.classifier.max_symbol_ratio),
            });
        }
        if !(0.0..=1.0).contains(&self.classifier.max_operator_density) {
            return Err(ConfigError::InvalidValue {
                field: "max_operator_density",
                reason: format!("必须在 [0.0, 1.0] 范围内，当前为 {}", self.classifier.max_operator_density),
            });
        }

        self.prompt = self
            .prompt_template
            .replace(service_config::TARGET_LANGUAGE_PLACEHOLDER, &self.target_language);
        Ok(self)
    }

    /// 获取目标语言
    pub fn target_lang(&self) -> &str {
        &self.target_language
    }

    /// 获取拼接在每个段落之前的提示词
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn credentials(&self) -> &[String] {
        &self.credentials
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn rotation(&self) -> &RotationPolicy {
        &self.rotation
    }

    pub fn transient_retry(&self) -> &TransientRetryPolicy {
        &self.transient_retry
    }

    pub fn max_rate_limit_retries(&self) -> u32 {
        self.max_rate_limit_retries
    }

    pub fn classifier(&self) -> &ClassifierThresholds {
        &self.classifier
    }

    /// 设置目标语言
    pub fn target_language(mut self, lang: &str) -> Self {
        self.target_language = lang.to_string();
        self
    }

    /// 设置提示词模板，`{target_language}` 会被替换为目标语言
    pub fn with_prompt_template(mut self, template: &str) -> Self {
        self.prompt_template = template.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 设置限流退避基础延迟
    pub fn with_backoff_base(mut self, delay: Duration) -> Self {
        self.rotation.base_delay = delay;
        self
    }

    /// 设置智能等待上限与最大等待轮次
    pub fn with_smart_wait(mut self, max_wait: Duration, max_cycles: u32) -> Self {
        self.rotation.smart_wait_max = max_wait;
        self.rotation.max_wait_cycles = max_cycles;
        self
    }

    /// 设置临时错误重试基础延迟
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.transient_retry.base_delay = delay;
        self
    }

    /// 设置临时错误最大重试次数
    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retry.max_retries = retries;
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn with_classifier(mut self, thresholds: ClassifierThresholds) -> Self {
        self.classifier = thresholds;
        self
    }
}

/// 解析API密钥：优先使用命令行参数，否则读取环境变量
fn resolve_api_keys(cli_keys: &[String]) -> Vec<String> {
    let from_cli = split_keys(cli_keys.iter().map(String::as_str));
    if !from_cli.is_empty() {
        return from_cli;
    }

    match std::env::var(api_config::API_KEY_ENV) {
        Ok(value) => {
            let keys = split_keys(std::iter::once(value.as_str()));
            if !keys.is_empty() {
                info!("使用 {} 环境变量中的 {} 个API密钥", api_config::API_KEY_ENV, keys.len());
            }
            keys
        }
        Err(_) => Vec::new(),
    }
}

/// 按逗号拆分密钥并去除空白与重复项，保持顺序
fn split_keys<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in values.flat_map(|v| v.split(',')).map(str::trim) {
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// 读取自定义提示词文件
///
/// 文件缺失、不可读或为空时记录警告并返回 `None`（回退到默认提示词）。
fn read_prompt_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let content = content.trim();
            if content.is_empty() {
                warn!("⚠️  提示词文件为空: {}，使用默认提示词", path.display());
                None
            } else {
                info!("使用自定义提示词: {}", path.display());
                Some(format!("{}\n\n", content))
            }
        }
        Err(e) => {
            warn!("⚠️  无法读取提示词文件 {}: {}，使用默认提示词", path.display(), e);
            None
        }
    }
}

/// CLI参数结构
#[derive(Parser, Debug)]
#[command(author, version, about = "可断点续传的EPUB电子书翻译工具 - 基于Gemini API，支持多密钥轮换与翻译缓存", long_about = None)]
pub struct Cli {
    /// 待翻译的EPUB文件路径
    #[arg(value_name = "EPUB_FILE")]
    pub epub_file: PathBuf,

    /// Gemini API密钥，可重复或用逗号分隔；未提供时读取 GOOGLE_API_KEY
    #[arg(short = 'k', long = "api-key", value_name = "KEY")]
    pub api_keys: Vec<String>,

    /// 翻译后EPUB的输出目录
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// 工作目录 (默认为当前目录下以书名命名的目录)
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// 自定义提示词文件 (.txt)，覆盖默认提示词
    #[arg(short, long, value_name = "FILE")]
    pub prompt_file: Option<PathBuf>,

    /// 目标语言
    #[arg(short, long, default_value = service_config::DEFAULT_TARGET_LANGUAGE)]
    pub lang: String,

    /// 输出文件名中的语言后缀
    #[arg(long, default_value = service_config::DEFAULT_LANG_TAG)]
    pub lang_tag: String,

    /// Gemini模型名称
    #[arg(short, long, default_value = api_config::DEFAULT_MODEL)]
    pub model: String,

    /// 限流退避基础延迟（秒）
    #[arg(long, default_value_t = retry_config::DEFAULT_BACKOFF_BASE_SECS)]
    pub backoff_base_secs: u64,

    /// 临时错误重试基础延迟（秒）
    #[arg(long, default_value_t = retry_config::DEFAULT_RETRY_DELAY_SECS)]
    pub retry_delay_secs: u64,

    /// 临时错误最大重试次数
    #[arg(long, default_value_t = retry_config::DEFAULT_MAX_TRANSIENT_RETRIES)]
    pub max_transient_retries: u32,

    /// 单个段落在每把密钥上允许的最大限流响应次数
    #[arg(long, default_value_t = retry_config::DEFAULT_MAX_RATE_LIMIT_RETRIES)]
    pub max_rate_limit_retries: u32,

    /// 所有密钥被限流时单次智能等待的上限（秒）
    #[arg(long, default_value_t = retry_config::DEFAULT_SMART_WAIT_SECS)]
    pub smart_wait_secs: u64,

    /// 智能等待的最大轮次
    #[arg(long, default_value_t = retry_config::DEFAULT_MAX_WAIT_CYCLES)]
    pub max_wait_cycles: u32,

    /// 可翻译文本的最少字母数
    #[arg(long, default_value_t = classifier_config::DEFAULT_MIN_ALPHA_CHARS)]
    pub min_alpha_chars: usize,

    /// 非字母字符占比上限 (0.0-1.0)
    #[arg(long, default_value_t = classifier_config::DEFAULT_MAX_SYMBOL_RATIO)]
    pub max_symbol_ratio: f64,

    /// 请求超时时间（秒）
    #[arg(long, default_value_t = api_config::REQUEST_TIMEOUT_SECONDS)]
    pub request_timeout: u64,

    /// 全部完成后仍保留工作目录
    #[arg(long)]
    pub keep_workspace: bool,

    /// 详细输出模式
    #[arg(short, long)]
    pub verbose: bool,

    /// 静默模式 (仅输出错误)
    #[arg(short, long)]
    pub quiet: bool,

    /// 显示运行统计
    #[arg(long)]
    pub stats: bool,
}
