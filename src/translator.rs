//! 翻译后端模块
//!
//! `TranslationBackend` 是编排器调用的翻译接口；`GeminiTranslator` 是基于
//! Gemini generateContent 接口的实现，负责把HTTP结果归类为
//! 限流、临时错误和不可恢复错误。

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::api_constants::api_config;
use crate::config::PipelineConfig;
use crate::error::{TranslateError, TranslateResult};
use crate::rotator::{Credential, RotationPolicy};
use crate::translate_error;

/// 翻译后端
///
/// 每次调用翻译一个段落，使用调用方提供的密钥。
pub trait TranslationBackend {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        prompt: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, TranslateResult<String>>;
}

/// Gemini API 翻译后端
#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    client: Client,
    endpoint: String,
}

impl GeminiTranslator {
    /// 根据配置创建HTTP客户端
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("创建HTTP客户端失败")?;

        let endpoint = api_config::GENERATE_CONTENT_URL.replace("{model}", config.model());
        debug!("Gemini接口: {}", endpoint);

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, text: &str, prompt: &str, credential: &Credential) -> TranslateResult<String> {
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}{}", prompt, text) }]
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", credential.key())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &headers, &response_text));
        }

        let json_val: Value = serde_json::from_str(&response_text)
            .map_err(|e| translate_error!(transient, format!("响应JSON解析失败: {}", e)))?;
        extract_candidate_text(&json_val)
    }
}

impl TranslationBackend for GeminiTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        prompt: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, TranslateResult<String>> {
        self.request(text, prompt, credential).boxed()
    }
}

/// 将失败的HTTP响应归类
pub fn classify_failure(status: StatusCode, headers: &HeaderMap, body: &str) -> TranslateError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let hint = parse_retry_after(headers)
            .or_else(|| parse_retry_delay(body))
            .map(|hint| hint.min(RotationPolicy::max_cooldown()));
        return translate_error!(rate_limited, hint);
    }

    let message = format!("HTTP {}: {}", status, error_message(body));
    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        translate_error!(transient, message)
    } else {
        translate_error!(fatal, message)
    }
}

/// 解析 `Retry-After` 响应头（秒数形式）
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 从错误响应体的 `RetryInfo.retryDelay`（如 `"17s"`）解析等待时间
fn parse_retry_delay(body: &str) -> Option<Duration> {
    let json_val: Value = serde_json::from_str(body).ok()?;
    json_val
        .pointer("/error/details")?
        .as_array()?
        .iter()
        .filter_map(|detail| detail.get("retryDelay").and_then(Value::as_str))
        .find_map(parse_seconds)
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let seconds = value.trim().strip_suffix('s')?.parse::<f64>().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        // 超出 Duration 范围的值按最大值处理
        Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

/// 提取错误响应中的可读信息
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// 从成功响应中取出译文
///
/// 提示词被拦截视为不可恢复；没有候选结果视为临时错误。
pub fn extract_candidate_text(response: &Value) -> TranslateResult<String> {
    if let Some(reason) = response
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(translate_error!(fatal, format!("内容被拦截: {}", reason)));
    }

    let candidate = response
        .pointer("/candidates/0")
        .ok_or_else(|| translate_error!(transient, "响应中没有候选结果"))?;

    let text = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    let translated = text.trim();
    if !translated.is_empty() {
        return Ok(translated.to_string());
    }

    match candidate.get("finishReason").and_then(Value::as_str) {
        Some(reason @ ("SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST")) => {
            Err(translate_error!(fatal, format!("候选结果被拦截: {}", reason)))
        }
        _ => Err(translate_error!(transient, "候选结果为空")),
    }
}
