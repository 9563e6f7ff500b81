use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use epub_translation_cli::archive::pack_archive;
use epub_translation_cli::{
    Credential, EpubDocuments, PipelineConfig, PipelineOrchestrator, TranslateError, TranslateResult,
    TranslationBackend, UnitState, Workspace,
};

const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head>
<body><h1>The Harbour</h1><p>The boats came home at dusk.</p><p>***</p></body></html>"#;

const CHAPTER_TWO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Two</title></head>
<body><h1>The Storm</h1><p>Nobody slept that night.</p></body></html>"#;

/// 在 `blocked` 中的原文一律返回限流，其余返回 `【译】原文`
struct FakeGemini {
    blocked: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeGemini {
    fn new(blocked: &[&str]) -> Self {
        Self {
            blocked: blocked.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TranslationBackend for FakeGemini {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _prompt: &'a str,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, TranslateResult<String>> {
        self.calls.lock().unwrap().push(text.to_string());
        let result = if self.blocked.iter().any(|b| b == text) {
            Err(TranslateError::RateLimited {
                retry_hint: Some(Duration::from_secs(3600)),
            })
        } else {
            Ok(format!("【译】{}", text))
        };
        async move { result }.boxed()
    }
}

fn build_epub(dir: &Path) -> PathBuf {
    let path = dir.join("harbour.epub");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", deflated).unwrap();
    zip.write_all(b"<container/>").unwrap();
    zip.start_file("OEBPS/ch1.xhtml", deflated).unwrap();
    zip.write_all(CHAPTER_ONE.as_bytes()).unwrap();
    zip.start_file("OEBPS/ch2.xhtml", deflated).unwrap();
    zip.write_all(CHAPTER_TWO.as_bytes()).unwrap();
    zip.finish().unwrap();
    path
}

fn config() -> PipelineConfig {
    PipelineConfig::new(vec!["key-a".to_string(), "key-b".to_string()])
        .with_smart_wait(Duration::from_secs(1), 1)
        .build()
        .unwrap()
}

fn read_entry(epub: &Path, name: &str) -> String {
    let mut archive = ZipArchive::new(File::open(epub).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}

async fn run_once(
    workspace: &Workspace,
    backend: FakeGemini,
) -> (epub_translation_cli::RunReport, FakeGemini) {
    let mut orchestrator = PipelineOrchestrator::new(
        config(),
        EpubDocuments::new(workspace.content_dir()),
        backend,
        workspace.open_cache(),
        workspace.open_tracker(),
    );
    let report = orchestrator.run().await.unwrap();
    (report, orchestrator.into_backend())
}

#[tokio::test(start_paused = true)]
async fn interrupted_book_resumes_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let epub = build_epub(dir.path());
    let workspace = Workspace::at(dir.path().join("harbour_translation_workspace"));
    let output = dir.path().join("out").join("harbour_zh-Hans.epub");

    // 第一次运行：第二章遇到持续限流
    assert!(workspace.prepare(&epub).unwrap());
    let (report, backend) = run_once(&workspace, FakeGemini::new(&["Nobody slept that night."])).await;
    assert!(!report.all_succeeded);
    assert_eq!(report.failed_units, vec!["OEBPS/ch2.xhtml"]);
    assert_eq!(
        backend.calls(),
        vec![
            "The Harbour",
            "The boats came home at dusk.",
            "The Storm",
            // 两把密钥各被限流一次
            "Nobody slept that night.",
            "Nobody slept that night."
        ]
    );

    pack_archive(&workspace.content_dir(), &output).unwrap();
    assert!(!workspace.finish(report.all_succeeded, false).unwrap());

    let partial_one = read_entry(&output, "OEBPS/ch1.xhtml");
    assert!(partial_one.starts_with("<?xml"));
    assert!(partial_one.contains("<h1>【译】The Harbour</h1>"));
    assert!(partial_one.contains("<p>***</p>"));
    assert!(partial_one.contains("<title>One</title>"));
    assert_eq!(read_entry(&output, "OEBPS/ch2.xhtml"), CHAPTER_TWO);

    let tracker = workspace.open_tracker();
    assert_eq!(tracker.state("OEBPS/ch1.xhtml"), UnitState::Success);
    assert_eq!(tracker.state("OEBPS/ch2.xhtml"), UnitState::Failed);

    // 第二次运行：只处理第二章，已缓存的 "The Storm" 不再调用API
    assert!(!workspace.prepare(&epub).unwrap());
    let (report, backend) = run_once(&workspace, FakeGemini::new(&[])).await;
    assert!(report.all_succeeded);
    assert_eq!(backend.calls(), vec!["Nobody slept that night."]);
    assert_eq!(report.stats.cache_hits, 1);

    pack_archive(&workspace.content_dir(), &output).unwrap();
    assert!(workspace.finish(report.all_succeeded, false).unwrap());
    assert!(!workspace.root().exists());

    let final_two = read_entry(&output, "OEBPS/ch2.xhtml");
    assert!(final_two.contains("<p>【译】Nobody slept that night.</p>"));

    let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
    assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
    assert!(fs::metadata(&epub).is_ok());
}
