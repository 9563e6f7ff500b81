/// 翻译API配置常量
///
/// 该文件定义了所有翻译服务相关的常量配置，方便统一管理和维护

/// Gemini API配置
pub mod api_config {
    /// generateContent 接口地址模板，`{model}` 由模型名替换
    pub const GENERATE_CONTENT_URL: &str =
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent";

    /// 默认模型
    pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

    /// 未通过命令行传入密钥时读取的环境变量（支持逗号分隔多个密钥）
    pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

    /// 请求超时时间（秒）
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 60;
}

/// 翻译服务配置
pub mod service_config {
    /// 默认目标语言
    pub const DEFAULT_TARGET_LANGUAGE: &str = "Simplified Chinese";

    /// 默认输出文件语言后缀
    pub const DEFAULT_LANG_TAG: &str = "zh-Hans";

    /// 提示词模板中的目标语言占位符
    pub const TARGET_LANGUAGE_PLACEHOLDER: &str = "{target_language}";

    /// 默认翻译提示词
    pub const DEFAULT_TRANSLATION_PROMPT: &str = "\
Translate the following content into {target_language} only if it clearly consists of meaningful natural language, such as sentences, phrases or conversational text.
Return the input exactly as received, with no modifications, if it is structured content (XML, HTML, JSON, code), markup, configuration, a path, key or variable name, only symbols or placeholders, or an isolated number, acronym or Roman numeral without context.
Do not add any introduction, explanation or label. Output only the translated text, or the original text unchanged when translation is not applicable.

";
}

/// 重试与限流配置
pub mod retry_config {
    /// 限流退避基础延迟（秒）
    pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;

    /// 临时错误重试基础延迟（秒）
    pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

    /// 临时错误最大重试次数
    pub const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 5;

    /// 单个段落在每把密钥上可接受的最大限流响应次数
    pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 32;

    /// 所有密钥冷却时单次智能等待的上限（秒）
    pub const DEFAULT_SMART_WAIT_SECS: u64 = 60;

    /// 智能等待的最大轮次
    pub const DEFAULT_MAX_WAIT_CYCLES: u32 = 5;

    /// 退避指数上限，防止延迟计算溢出
    pub const MAX_BACKOFF_EXPONENT: u32 = 16;

    /// 单次冷却、重试提示与等待时长的上限（秒）
    pub const MAX_COOLDOWN_SECS: u64 = 86_400;
}

/// 内容分类阈值
pub mod classifier_config {
    /// 最少字母字符数
    pub const DEFAULT_MIN_ALPHA_CHARS: usize = 2;

    /// 非字母字符占比上限
    pub const DEFAULT_MAX_SYMBOL_RATIO: f64 = 0.5;

    /// 运算符/括号字符占比上限
    pub const DEFAULT_MAX_OPERATOR_DENSITY: f64 = 0.1;
}

/// 工作目录布局
pub mod workspace_config {
    /// 工作目录名后缀（目录名为 `<书名>` + 后缀）
    pub const WORKSPACE_SUFFIX: &str = "_translation_workspace";

    /// 解压内容子目录
    pub const CONTENT_DIR: &str = "content";

    /// 翻译缓存文件名
    pub const CACHE_FILE: &str = "translation_cache.json";

    /// 单元状态文件名
    pub const STATUS_FILE: &str = "translation_status.json";

    /// 可翻译文档扩展名
    pub const DOCUMENT_EXTENSIONS: &[&str] = &["html", "xhtml", "htm"];
}
