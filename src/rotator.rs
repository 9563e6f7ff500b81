// API密钥轮换器
//
// 按顺序轮换密钥，限流的密钥进入冷却期（指数退避），
// 所有密钥都在冷却时进入有上限的智能等待，超过等待轮次后上报耗尽。

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api_constants::retry_config;
use crate::error::UnitError;

/// 轮换器可以交给调用方使用的一把密钥
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    index: usize,
    key: String,
}

impl Credential {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("key", &mask_key(&self.key))
            .finish()
    }
}

/// 只保留密钥末尾4个字符
fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

/// 轮换与智能等待策略
#[derive(Debug, Clone, PartialEq)]
pub struct RotationPolicy {
    /// 限流退避的基础延迟
    pub base_delay: Duration,
    /// 单次智能等待的上限
    pub smart_wait_max: Duration,
    /// 智能等待的最大轮次
    pub max_wait_cycles: u32,
}

impl RotationPolicy {
    /// 冷却时长上限
    pub fn max_cooldown() -> Duration {
        Duration::from_secs(retry_config::MAX_COOLDOWN_SECS)
    }

    /// 第 `exponent` 次连续限流的退避时长，不超过冷却上限
    pub fn backoff(&self, exponent: u32) -> Duration {
        let exponent = exponent.min(retry_config::MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(Self::max_cooldown())
    }

    /// 退避可达到的最长冷却
    pub fn cooldown_ceiling(&self) -> Duration {
        self.backoff(retry_config::MAX_BACKOFF_EXPONENT)
    }

    /// 一次 `acquire` 最多等待的总时长
    pub fn wait_budget(&self) -> Duration {
        self.smart_wait_max
            .min(Self::max_cooldown())
            .saturating_mul(self.max_wait_cycles)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(retry_config::DEFAULT_BACKOFF_BASE_SECS),
            smart_wait_max: Duration::from_secs(retry_config::DEFAULT_SMART_WAIT_SECS),
            max_wait_cycles: retry_config::DEFAULT_MAX_WAIT_CYCLES,
        }
    }
}

/// 单把密钥的运行时状态
#[derive(Debug)]
struct CredentialState {
    credential: Credential,
    rate_limited_until: Option<Instant>,
    backoff_exponent: u32,
}

impl CredentialState {
    fn is_available(&self, now: Instant) -> bool {
        self.rate_limited_until.map_or(true, |until| until <= now)
    }
}

/// API密钥轮换器
///
/// 密钥健康状态不做持久化，每次启动重新学习。
#[derive(Debug)]
pub struct CredentialRotator {
    states: Vec<CredentialState>,
    next_index: usize,
    policy: RotationPolicy,
}

impl CredentialRotator {
    /// 创建轮换器，`keys` 由配置层保证非空
    pub fn new(keys: Vec<String>, policy: RotationPolicy) -> Self {
        let states = keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| CredentialState {
                credential: Credential { index, key },
                rate_limited_until: None,
                backoff_exponent: 0,
            })
            .collect();

        Self {
            states,
            next_index: 0,
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// 获取一把可用密钥
    ///
    /// 所有密钥都在冷却时挂起到最早恢复的时刻，单次等待不超过
    /// `smart_wait_max`；等待 `max_wait_cycles` 轮后仍无可用密钥则返回耗尽错误。
    pub async fn acquire(&mut self) -> Result<Credential, UnitError> {
        let mut wait_cycles = 0u32;

        loop {
            let now = Instant::now();
            if let Some(credential) = self.try_acquire(now) {
                if wait_cycles > 0 {
                    info!("✅ 密钥 {} 已恢复可用 (等待 {} 轮)", credential.index, wait_cycles);
                }
                return Ok(credential);
            }

            if wait_cycles >= self.policy.max_wait_cycles {
                warn!(
                    "❌ 所有 {} 个密钥在 {} 轮等待后仍处于冷却中",
                    self.states.len(),
                    wait_cycles
                );
                return Err(UnitError::AllExhausted {
                    credential_count: self.states.len(),
                    wait_cycles,
                });
            }

            wait_cycles += 1;
            let bound = now
                .checked_add(self.policy.smart_wait_max)
                .unwrap_or(now + RotationPolicy::max_cooldown());
            let wake_at = self.earliest_recovery().map_or(bound, |at| at.min(bound));
            warn!(
                "⏳ 所有密钥均被限流，智能等待 {:.1}秒 (第 {}/{} 轮)",
                wake_at.saturating_duration_since(now).as_secs_f64(),
                wait_cycles,
                self.policy.max_wait_cycles
            );
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// 从上次使用的密钥之后开始轮询，跳过冷却中的密钥
    fn try_acquire(&mut self, now: Instant) -> Option<Credential> {
        let count = self.states.len();
        for offset in 0..count {
            let index = (self.next_index + offset) % count;
            let state = &mut self.states[index];
            if state.is_available(now) {
                state.rate_limited_until = None;
                self.next_index = (index + 1) % count;
                debug!("使用API密钥 {}", index);
                return Some(state.credential.clone());
            }
        }
        None
    }

    /// 记录密钥被限流，进入冷却期
    ///
    /// 按 `base_delay * 2^n` 退避；服务端提示更长时按提示冷却。
    /// 冷却时长不超过 `retry_config::MAX_COOLDOWN_SECS`。
    pub fn report_rate_limited(&mut self, credential: &Credential, retry_hint: Option<Duration>) {
        let Some(state) = self.states.get_mut(credential.index) else {
            return;
        };

        let backoff = self.policy.backoff(state.backoff_exponent);
        let cooldown = retry_hint
            .map_or(backoff, |hint| hint.max(backoff))
            .min(RotationPolicy::max_cooldown());
        state.backoff_exponent = state.backoff_exponent.saturating_add(1);
        state.rate_limited_until = Some(Instant::now() + cooldown);

        warn!(
            "🚦 密钥 {} 被限流，冷却 {:.1}秒 (连续第 {} 次)",
            credential.index,
            cooldown.as_secs_f64(),
            state.backoff_exponent
        );
    }

    /// 记录密钥调用成功，清除冷却并重置退避
    pub fn report_success(&mut self, credential: &Credential) {
        if let Some(state) = self.states.get_mut(credential.index) {
            state.rate_limited_until = None;
            state.backoff_exponent = 0;
        }
    }

    /// 最早恢复可用的时刻
    fn earliest_recovery(&self) -> Option<Instant> {
        self.states.iter().filter_map(|s| s.rate_limited_until).min()
    }

    /// 当前可用的密钥数量
    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.states.iter().filter(|s| s.is_available(now)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{}", i)).collect()
    }

    fn assert_waited(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs) + Duration::from_millis(100),
            "waited {:?}, expected {}s",
            elapsed,
            secs
        );
    }

    fn policy() -> RotationPolicy {
        RotationPolicy {
            base_delay: Duration::from_secs(10),
            smart_wait_max: Duration::from_secs(60),
            max_wait_cycles: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_fairness() {
        let mut rotator = CredentialRotator::new(keys(3), policy());

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rotator.acquire().await.unwrap().index());
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);

        // 第四次回到第一把
        assert_eq!(rotator.acquire().await.unwrap().index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_cooling_credential() {
        let mut rotator = CredentialRotator::new(keys(3), policy());
        let first = rotator.acquire().await.unwrap();
        rotator.report_rate_limited(&first, None);

        let picks: Vec<usize> = {
            let mut v = Vec::new();
            for _ in 0..4 {
                v.push(rotator.acquire().await.unwrap().index());
            }
            v
        };
        assert_eq!(picks, vec![1, 2, 1, 2]);
        assert_eq!(rotator.available_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_smart_wait_returns_when_cooldown_expires() {
        let mut rotator = CredentialRotator::new(keys(2), policy());
        let a = rotator.acquire().await.unwrap();
        let b = rotator.acquire().await.unwrap();
        rotator.report_rate_limited(&a, Some(Duration::from_secs(30)));
        rotator.report_rate_limited(&b, None);

        let start = Instant::now();
        let credential = rotator.acquire().await.unwrap();
        // b 的冷却 (10秒) 先结束
        assert_eq!(credential.index(), b.index());
        assert_waited(start, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_smart_wait_loops_past_bound() {
        let mut rotator = CredentialRotator::new(keys(1), policy());
        let only = rotator.acquire().await.unwrap();
        // 冷却 150秒，超过单次等待上限 60秒，需要3轮等待
        rotator.report_rate_limited(&only, Some(Duration::from_secs(150)));

        let start = Instant::now();
        let credential = rotator.acquire().await.unwrap();
        assert_eq!(credential.index(), 0);
        assert_waited(start, 150);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_exhausted_after_max_wait_cycles() {
        let mut rotator = CredentialRotator::new(keys(2), policy());
        let a = rotator.acquire().await.unwrap();
        let b = rotator.acquire().await.unwrap();
        rotator.report_rate_limited(&a, Some(Duration::from_secs(3600)));
        rotator.report_rate_limited(&b, Some(Duration::from_secs(3600)));

        let start = Instant::now();
        let result = rotator.acquire().await;
        match result {
            Err(UnitError::AllExhausted {
                credential_count,
                wait_cycles,
            }) => {
                assert_eq!(credential_count, 2);
                assert_eq!(wait_cycles, 3);
            }
            other => panic!("expected AllExhausted, got {:?}", other),
        }
        assert_waited(start, 180);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_and_reset() {
        let mut rotator = CredentialRotator::new(keys(1), policy());
        let key = rotator.acquire().await.unwrap();

        // 10s, 20s, 40s
        for expected in [10u64, 20, 40] {
            rotator.report_rate_limited(&key, None);
            let start = Instant::now();
            rotator.acquire().await.unwrap();
            assert_waited(start, expected);
        }

        rotator.report_success(&key);
        rotator.report_rate_limited(&key, None);
        let start = Instant::now();
        rotator.acquire().await.unwrap();
        assert_waited(start, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_success_clears_cooldown() {
        let mut rotator = CredentialRotator::new(keys(1), policy());
        let key = rotator.acquire().await.unwrap();
        rotator.report_rate_limited(&key, Some(Duration::from_secs(500)));
        assert_eq!(rotator.available_count(), 0);

        rotator.report_success(&key);
        let start = Instant::now();
        rotator.acquire().await.unwrap();
        assert_waited(start, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_hint_does_not_shorten_backoff() {
        let mut rotator = CredentialRotator::new(keys(1), policy());
        let key = rotator.acquire().await.unwrap();

        // 提示5秒，退避依次为 10s, 20s, 40s
        for expected in [10u64, 20, 40] {
            rotator.report_rate_limited(&key, Some(Duration::from_secs(5)));
            let start = Instant::now();
            rotator.acquire().await.unwrap();
            assert_waited(start, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_hints_escalate_to_exhaustion() {
        let mut rotator = CredentialRotator::new(keys(1), policy());

        // 冷却: 30, 30, 40, 80, 160, 320；最后一次超过 3 × 60秒 的等待预算
        let mut reports = 0;
        while let Ok(key) = rotator.acquire().await {
            rotator.report_rate_limited(&key, Some(Duration::from_secs(30)));
            reports += 1;
            assert!(reports <= 10, "rotator never gave up");
        }
        assert_eq!(reports, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_hint_is_clamped() {
        let mut rotator = CredentialRotator::new(keys(1), policy());
        let key = rotator.acquire().await.unwrap();
        rotator.report_rate_limited(&key, Some(Duration::MAX));
        assert_eq!(rotator.available_count(), 0);

        let start = Instant::now();
        assert!(matches!(
            rotator.acquire().await,
            Err(UnitError::AllExhausted { wait_cycles: 3, .. })
        ));
        assert_waited(start, 180);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_smart_wait_and_backoff_do_not_overflow() {
        let policy = RotationPolicy {
            base_delay: Duration::MAX,
            smart_wait_max: Duration::MAX,
            max_wait_cycles: 1,
        };
        assert_eq!(policy.cooldown_ceiling(), RotationPolicy::max_cooldown());

        let mut rotator = CredentialRotator::new(keys(1), policy);
        let key = rotator.acquire().await.unwrap();
        rotator.report_rate_limited(&key, None);

        let start = Instant::now();
        rotator.acquire().await.unwrap();
        assert_waited(start, retry_config::MAX_COOLDOWN_SECS);
    }

    #[test]
    fn test_debug_masks_key() {
        let credential = Credential {
            index: 0,
            key: "AIzaSySecretValue1234".to_string(),
        };
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("****1234"));
        assert!(!rendered.contains("Secret"));
    }
}
