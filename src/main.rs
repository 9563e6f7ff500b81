use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use epub_translation_cli::archive::pack_archive;
use epub_translation_cli::stats::{format_duration, print_run_summary};
use epub_translation_cli::utils::{generate_output_path, init_logging, validate_input_file};
use epub_translation_cli::{
    Cli, EpubDocuments, GeminiTranslator, PipelineConfig, PipelineOrchestrator, Workspace,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = translate_book(&cli).await {
        error!("❌ 翻译失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 翻译整本书：准备工作目录、执行流水线、重新打包、按需清理
async fn translate_book(cli: &Cli) -> Result<()> {
    // 验证输入文件
    validate_input_file(&cli.epub_file)?;
    let epub_path = cli
        .epub_file
        .canonicalize()
        .with_context(|| format!("无法解析输入路径: {}", cli.epub_file.display()))?;

    let config = PipelineConfig::from_cli(cli)?;
    let workspace = Workspace::for_archive(&epub_path, cli.temp_dir.as_deref())?;
    let output_path = generate_output_path(&epub_path, &cli.output_dir, &cli.lang_tag);

    info!("🚀 启动EPUB翻译");
    info!("📂 输入文件: {}", epub_path.display());
    info!("📄 输出文件: {}", output_path.display());
    info!("🌐 目标语言: {}", config.target_lang());
    info!("🔑 API密钥: {} 个", config.credentials().len());
    info!("📁 工作目录: {}", workspace.root().display());

    workspace.prepare(&epub_path)?;

    let backend = GeminiTranslator::new(&config)?;
    let documents = EpubDocuments::new(workspace.content_dir());
    let mut orchestrator = PipelineOrchestrator::new(
        config,
        documents,
        backend,
        workspace.open_cache(),
        workspace.open_tracker(),
    );

    let report = orchestrator.run().await?;
    drop(orchestrator);

    let packed = repack(&workspace.content_dir(), &output_path);
    if !report.all_succeeded {
        warn!(
            "⚠️  {} 个单元未完成，输出文件包含部分译文；重新运行即可续传",
            report.failed_units.len()
        );
    }

    workspace.finish(report.all_succeeded && packed, cli.keep_workspace)?;

    info!("✅ 运行结束，耗时 {}", format_duration(report.duration()));
    if cli.stats || cli.verbose {
        print_run_summary(&report);
    }

    Ok(())
}

/// 重新打包EPUB，失败时记录错误并返回 `false`
fn repack(content_dir: &Path, output_path: &Path) -> bool {
    match pack_archive(content_dir, output_path) {
        Ok(_) => {
            info!("📚 已生成: {}", output_path.display());
            true
        }
        Err(e) => {
            error!("❌ 打包EPUB失败: {:#}", e);
            false
        }
    }
}
