use std::time::Duration;

use chrono::{DateTime, Utc};

/// 一次运行的计数统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub units_total: usize,
    pub units_already_done: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub segments_total: usize,
    pub segments_skipped: usize,
    pub cache_hits: usize,
    pub segments_translated: usize,
    pub segments_abandoned: usize,
    pub api_calls: usize,
    pub rate_limited: usize,
    pub transient_retries: usize,
}

/// 运行结果报告
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    /// 本次运行中失败的单元（按处理顺序）
    pub failed_units: Vec<String>,
    /// 所有单元是否均已成功（包括之前运行中完成的单元）
    pub all_succeeded: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }
}

/// 打印运行统计
pub fn print_run_summary(report: &RunReport) {
    let stats = &report.stats;

    println!("\n📊 翻译统计报告:");
    println!("═══════════════════════════════════════");

    println!("⏱️  时间:");
    println!("   开始: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   结束: {}", report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   总耗时: {}", format_duration(report.duration()));

    println!("\n📚 文档单元:");
    println!("   总数: {} 个", stats.units_total);
    println!("   之前已完成: {} 个", stats.units_already_done);
    println!("   本次成功: {} 个", stats.units_succeeded);
    println!("   本次失败: {} 个", stats.units_failed);
    for unit_id in &report.failed_units {
        println!("     - {}", unit_id);
    }

    println!("\n🔤 段落:");
    println!("   处理段落: {} 个", stats.segments_total);
    println!("   跳过(非自然语言): {} 个", stats.segments_skipped);
    println!("   新翻译: {} 个", stats.segments_translated);
    println!("   放弃(保留原文): {} 个", stats.segments_abandoned);

    let lookups = stats.cache_hits + stats.segments_translated + stats.segments_abandoned;
    if lookups > 0 {
        println!("\n💾 缓存统计:");
        println!("   缓存命中: {} 次", stats.cache_hits);
        println!(
            "   命中率: {:.1}%",
            stats.cache_hits as f64 / lookups as f64 * 100.0
        );
    }

    println!("\n🌐 API调用:");
    println!("   请求次数: {} 次", stats.api_calls);
    println!("   限流响应: {} 次", stats.rate_limited);
    println!("   临时错误重试: {} 次", stats.transient_retries);

    let verdict = if report.all_succeeded {
        "✅ 全部完成"
    } else {
        "⚠️  部分单元未完成，重新运行即可续传"
    };
    println!("\n{}", verdict);
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if duration.as_secs() < 60 {
        format!("{:.3}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
