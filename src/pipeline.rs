//! 翻译流水线编排模块
//!
//! 按稳定顺序处理所有尚未成功的文档单元：提取段落、逐段翻译、写回单元、
//! 记录状态。单元之间相互隔离，一个单元失败不会影响其余单元。
//!
//! 段落级的重试策略：
//! - 非自然语言段落直接跳过，不调用API
//! - 缓存命中直接使用缓存结果
//! - 限流：上报轮换器后换一把密钥重试；所有密钥耗尽时中止当前单元
//! - 临时错误：按指数退避有限重试，超过次数后放弃该段落（保留原文）
//! - 不可恢复错误：放弃该段落（保留原文）

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cache::TranslationCache;
use crate::classifier::ContentClassifier;
use crate::config::PipelineConfig;
use crate::document::{DocumentSource, Segment};
use crate::error::{TranslateError, UnitError};
use crate::rotator::CredentialRotator;
use crate::stats::{RunReport, RunStats};
use crate::status::{UnitState, UnitStatusTracker};
use crate::translator::TranslationBackend;
use crate::utils::preview;

/// 单个段落的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
enum SegmentOutcome {
    /// 非自然语言，保留原文
    Skipped,
    CacheHit(String),
    Translated(String),
    /// 翻译失败，保留原文
    Abandoned,
}

/// 翻译流水线编排器
pub struct PipelineOrchestrator<D, B> {
    config: PipelineConfig,
    documents: D,
    backend: B,
    classifier: ContentClassifier,
    cache: TranslationCache,
    tracker: UnitStatusTracker,
    rotator: CredentialRotator,
    stats: RunStats,
}

impl<D, B> PipelineOrchestrator<D, B>
where
    D: DocumentSource,
    B: TranslationBackend,
{
    pub fn new(
        config: PipelineConfig,
        documents: D,
        backend: B,
        cache: TranslationCache,
        tracker: UnitStatusTracker,
    ) -> Self {
        let classifier = ContentClassifier::new(config.classifier().clone());
        let rotator = CredentialRotator::new(config.credentials().to_vec(), config.rotation().clone());

        Self {
            config,
            documents,
            backend,
            classifier,
            cache,
            tracker,
            rotator,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn tracker(&self) -> &UnitStatusTracker {
        &self.tracker
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// 执行一次完整运行
    ///
    /// 只处理状态为 `pending` 或 `failed` 的单元。单元失败不会中止运行；
    /// 仅当无法枚举文档单元时返回错误。
    pub async fn run(&mut self) -> Result<RunReport> {
        let started_at = Utc::now();
        self.stats = RunStats::default();

        let all_units = self.documents.list_units().context("枚举文档单元失败")?;
        let queue = self.tracker.pending_or_failed_units(&all_units);

        self.stats.units_total = all_units.len();
        self.stats.units_already_done = all_units.len() - queue.len();
        info!(
            "📚 共 {} 个文档单元，已完成 {} 个，待处理 {} 个",
            all_units.len(),
            self.stats.units_already_done,
            queue.len()
        );

        let mut failed_units = Vec::new();
        for (position, unit_id) in queue.iter().enumerate() {
            info!(
                "📖 处理单元 {}/{}: {} (状态: {})",
                position + 1,
                queue.len(),
                unit_id,
                self.tracker.state(unit_id)
            );

            match self.process_unit(unit_id).await {
                Ok(()) => {
                    self.stats.units_succeeded += 1;
                    self.record_state(unit_id, UnitState::Success);
                    info!("✅ 单元完成: {}", unit_id);
                }
                Err(e) => {
                    self.stats.units_failed += 1;
                    self.record_state(unit_id, UnitState::Failed);
                    failed_units.push(unit_id.clone());
                    warn!("❌ 单元失败: {}: {}", unit_id, e);
                }
            }
        }

        let all_succeeded = self.tracker.all_succeeded(&all_units);
        let (pending, success, failed) = self.tracker.summary(&all_units);
        info!(
            "📊 运行结束: 成功 {} / 失败 {} / 待处理 {}",
            success, failed, pending
        );

        Ok(RunReport {
            stats: self.stats.clone(),
            failed_units,
            all_succeeded,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn record_state(&mut self, unit_id: &str, state: UnitState) {
        if let Err(e) = self.tracker.mark(unit_id, state) {
            error!("⚠️  保存单元状态失败 ({} -> {}): {}", unit_id, state, e);
        }
    }

    /// 处理单个文档单元：提取、逐段翻译、写回
    ///
    /// 中止时不写回任何内容，已翻译的段落保留在缓存中。
    async fn process_unit(&mut self, unit_id: &str) -> Result<(), UnitError> {
        let segments = self.documents.extract_segments(unit_id)?;
        debug!("单元 {} 提取到 {} 个段落", unit_id, segments.len());

        let mut rendered = Vec::with_capacity(segments.len());
        for segment in segments {
            self.stats.segments_total += 1;
            let text = match self.translate_segment(&segment.text).await? {
                SegmentOutcome::Skipped => {
                    self.stats.segments_skipped += 1;
                    segment.text
                }
                SegmentOutcome::CacheHit(translated) => {
                    self.stats.cache_hits += 1;
                    translated
                }
                SegmentOutcome::Translated(translated) => {
                    self.stats.segments_translated += 1;
                    translated
                }
                SegmentOutcome::Abandoned => {
                    self.stats.segments_abandoned += 1;
                    segment.text
                }
            };
            rendered.push(Segment {
                ordinal: segment.ordinal,
                text,
            });
        }

        self.documents.render(unit_id, &rendered)
    }

    async fn translate_segment(&mut self, text: &str) -> Result<SegmentOutcome, UnitError> {
        if !self.classifier.is_translatable(text) {
            debug!("跳过非自然语言段落: {}", preview(text));
            return Ok(SegmentOutcome::Skipped);
        }

        if let Some(cached) = self.cache.get(text) {
            debug!("缓存命中: {}", preview(text));
            return Ok(SegmentOutcome::CacheHit(cached.to_string()));
        }

        match self.request_translation(text).await? {
            Some(translated) => {
                if let Err(e) = self.cache.put(text, translated.as_str()) {
                    warn!("⚠️  写入翻译缓存失败: {}", e);
                }
                Ok(SegmentOutcome::Translated(translated))
            }
            None => Ok(SegmentOutcome::Abandoned),
        }
    }

    /// 调用后端翻译一个段落
    ///
    /// 返回 `Ok(None)` 表示放弃该段落；密钥耗尽或限流次数超限时返回错误。
    /// 持续限流通常由轮换器的等待轮次上限结束，限流次数上限按密钥数放大，只兜底防止死循环。
    async fn request_translation(&mut self, text: &str) -> Result<Option<String>, UnitError> {
        let rate_limit_cap = self
            .config
            .max_rate_limit_retries()
            .saturating_mul(self.rotator.len().max(1) as u32);
        let mut rate_limited_count = 0u32;
        let mut transient_attempts = 0u32;

        loop {
            let credential = self.rotator.acquire().await?;
            self.stats.api_calls += 1;

            let result = self
                .backend
                .translate(text, self.config.prompt(), &credential)
                .await;

            match result {
                Ok(translated) => {
                    self.rotator.report_success(&credential);
                    debug!("翻译完成: {} -> {}", preview(text), preview(&translated));
                    return Ok(Some(translated));
                }
                Err(TranslateError::RateLimited { retry_hint }) => {
                    self.stats.rate_limited += 1;
                    self.rotator.report_rate_limited(&credential, retry_hint);
                    rate_limited_count += 1;
                    if rate_limited_count >= rate_limit_cap {
                        return Err(UnitError::RateLimitExceeded {
                            attempts: rate_limited_count,
                        });
                    }
                }
                Err(TranslateError::Transient { message }) => {
                    transient_attempts += 1;
                    let policy = self.config.transient_retry();
                    if transient_attempts > policy.max_retries {
                        warn!(
                            "⚠️  重试 {} 次后放弃段落: {} ({})",
                            policy.max_retries,
                            preview(text),
                            message
                        );
                        return Ok(None);
                    }

                    let delay = policy.delay_for(transient_attempts);
                    self.stats.transient_retries += 1;
                    warn!(
                        "🔄 临时错误，{:.1}秒后重试 ({}/{}): {}",
                        delay.as_secs_f64(),
                        transient_attempts,
                        policy.max_retries,
                        message
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(TranslateError::Fatal { message }) => {
                    warn!("⚠️  放弃段落: {} ({})", preview(text), message);
                    return Ok(None);
                }
            }
        }
    }
}
