//! End-to-end harvest tests against a throwaway site checkout.
//!
//! PDFs are synthesised with lopdf and served by a one-shot HTTP server on
//! 127.0.0.1, so no external network is touched. The first-page fallback uses
//! a fake renderer; nothing here needs the pdfium library.

use image::{DynamicImage, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use pubfig::pipeline::extract::{extract_figure, ExtractOptions};
use pubfig::pipeline::fetch::Fetcher;
use pubfig::{
    harvest, harvest_sync, FigureOrigin, HarvestConfig, HarvestProgressCallback, PageRenderer,
    PubFigError, RecordError, RecordOutcome, SkipReason,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs through the test harness; `RUST_LOG=pubfig=debug` to see them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve `routes` (path → body) over HTTP/1.1; unknown paths get a 404.
async fn serve(routes: HashMap<&'static str, Vec<u8>>) -> String {
    serve_after(routes, Duration::ZERO).await
}

/// Like [`serve`], but every response waits `delay` before the status line.
async fn serve_after(routes: HashMap<&'static str, Vec<u8>>, delay: Duration) -> String {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                tokio::time::sleep(delay).await;
                let (status, body) = match routes.get(path.as_str()) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", b"not found".to_vec()),
                };
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = sock.write_all(head.as_bytes()).await;
                let _ = sock.write_all(&body).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// A PDF whose pages carry DCT-encoded images of the given sizes.
fn pdf_bytes(pages: &[&[usize]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (p, sizes) in pages.iter().enumerate() {
        let mut xobjects = Dictionary::new();
        for (i, &len) in sizes.iter().enumerate() {
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 64,
                "Height" => 64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            };
            let fill = (p * 16 + i + 1) as u8;
            let id = doc.add_object(Stream::new(dict, vec![fill; len]));
            xobjects.set(format!("Im{i}"), id);
        }
        let content = doc.add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        kids.push(page.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

#[derive(Default)]
struct FakeRenderer {
    calls: AtomicUsize,
}

impl PageRenderer for FakeRenderer {
    fn render_page(
        &self,
        _pdf: &Path,
        _page_index: usize,
        _dpi: u32,
        _max_pixels: u32,
    ) -> Result<DynamicImage, RecordError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            20,
            30,
            image::Rgb([0, 0, 255]),
        )))
    }
}

/// Records every progress event as a short string.
#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl HarvestProgressCallback for EventLog {
    fn on_harvest_start(&self, total: usize) {
        self.0.lock().unwrap().push(format!("start {total}"));
    }
    fn on_record_skipped(&self, index: usize, _: usize, _: &str, reason: SkipReason) {
        self.0.lock().unwrap().push(format!("skip {index} {reason}"));
    }
    fn on_record_complete(&self, index: usize, _: usize, _: &str, _: &Path) {
        self.0.lock().unwrap().push(format!("ok {index}"));
    }
    fn on_record_error(&self, index: usize, _: usize, _: &str, _: &str) {
        self.0.lock().unwrap().push(format!("err {index}"));
    }
    fn on_harvest_complete(&self, total: usize, extracted: usize) {
        self.0.lock().unwrap().push(format!("done {total} {extracted}"));
    }
}

struct Site {
    dir: tempfile::TempDir,
}

impl Site {
    fn with_yaml(yaml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("_data")).unwrap();
        std::fs::write(dir.path().join("_data/publications.yml"), yaml).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn yaml(&self) -> String {
        std::fs::read_to_string(self.root().join("_data/publications.yml")).unwrap()
    }

    fn image(&self, name: &str) -> PathBuf {
        self.root().join("images/publications").join(name)
    }
}

fn config(site: &Site, renderer: Arc<FakeRenderer>) -> HarvestConfig {
    HarvestConfig::builder()
        .site_root(site.root())
        .renderer(renderer)
        .download_timeout_secs(5)
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_updates_only_new_pictures() {
    let mut routes = HashMap::new();
    routes.insert("/figure.pdf", pdf_bytes(&[&[5_000, 20_000]]));
    routes.insert("/text-only.pdf", pdf_bytes(&[&[], &[]]));
    let base = serve(routes).await;

    let site = Site::with_yaml(&format!(
        r#"- title: "Figure Paper: Détection de 水印"
  venue: ACL 2025
  year: 2025
  links:
    - type: pdf
      url: {base}/figure.pdf
- title: Already Done
  year: 2025
  picture: /images/publications/done.png
- title: Dead Link
  links:
    - type: pdf
      url: {base}/missing.pdf
- title: No Links At All
- title: Text Only
  links:
    - type: pdf
      url: {base}/text-only.pdf
  authors: [A, B]
"#
    ));
    let renderer = Arc::new(FakeRenderer::default());
    let events = Arc::new(EventLog::default());
    let config = HarvestConfig::builder()
        .site_root(site.root())
        .renderer(renderer.clone())
        .progress_callback(events.clone())
        .download_timeout_secs(5)
        .build()
        .unwrap();

    let report = harvest(&config).await.unwrap();

    assert!(report.source_written);
    assert_eq!(report.stats.total_records, 5);
    assert_eq!(report.stats.extracted, 2);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.failed, 2);

    // Embedded 20 KB image chosen over the 5 KB one.
    let saved = std::fs::read(site.image("figure-paper-d-tection-de.jpg")).unwrap();
    assert_eq!(saved.len(), 20_000);
    match &report.records[0].outcome {
        Ok(RecordOutcome::Extracted { figure, picture, .. }) => {
            assert_eq!(
                figure.origin,
                FigureOrigin::Embedded {
                    page: 1,
                    encoded_bytes: 20_000
                }
            );
            assert_eq!(
                picture.as_deref(),
                Some("/images/publications/figure-paper-d-tection-de.jpg")
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert!(matches!(
        report.records[2].outcome,
        Err(RecordError::DownloadFailed { ref reason, .. }) if reason.contains("404")
    ));
    assert_eq!(report.records[3].outcome, Err(RecordError::NoPdfLink));

    // Page-1 render fallback.
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert!(site.image("text-only.png").exists());

    let yaml = site.yaml();
    assert!(yaml.contains("picture: /images/publications/figure-paper-d-tection-de.jpg"));
    assert!(yaml.contains("picture: /images/publications/text-only.png"));
    assert!(yaml.contains("picture: /images/publications/done.png"));
    assert!(yaml.contains("Détection de 水印"), "non-ASCII text must survive: {yaml}");
    assert!(yaml.contains("venue: ACL 2025"));
    // Key order within a record is preserved; picture is appended last.
    let venue = yaml.find("venue:").unwrap();
    let year = yaml.find("year: 2025").unwrap();
    assert!(venue < year);

    let log = events.0.lock().unwrap().clone();
    assert_eq!(log.first().map(String::as_str), Some("start 5"));
    assert!(log.contains(&"skip 2 already has picture".to_string()));
    assert!(log.contains(&"err 3".to_string()));
    assert_eq!(log.last().map(String::as_str), Some("done 5 2"));
}

#[tokio::test]
async fn second_run_leaves_source_untouched() {
    let mut routes = HashMap::new();
    routes.insert("/a.pdf", pdf_bytes(&[&[15_000]]));
    let base = serve(routes).await;

    let site = Site::with_yaml(&format!(
        "- title: Paper A\n  links:\n    - type: pdf\n      url: {base}/a.pdf\n"
    ));
    let renderer = Arc::new(FakeRenderer::default());

    let first = harvest(&config(&site, renderer.clone())).await.unwrap();
    assert!(first.source_written);
    let after_first = site.yaml();

    let second = harvest(&config(&site, renderer)).await.unwrap();
    assert!(!second.source_written);
    assert!(!second.changed());
    assert_eq!(second.stats.skipped, 1);
    assert_eq!(site.yaml(), after_first);
}

#[tokio::test]
async fn nothing_to_do_does_not_rewrite_file() {
    // Quoting style is not what serde_yaml would emit; a rewrite would change it.
    let original = "- title: 'Quoted'\n  picture: \"/images/publications/q.png\"\n";
    let site = Site::with_yaml(original);

    let report = harvest(&config(&site, Arc::new(FakeRenderer::default())))
        .await
        .unwrap();
    assert!(!report.source_written);
    assert_eq!(site.yaml(), original);
}

#[tokio::test]
async fn non_pdf_body_is_rejected() {
    let mut routes = HashMap::new();
    routes.insert("/landing.pdf", b"<!doctype html><html></html>".to_vec());
    let base = serve(routes).await;

    let site = Site::with_yaml(&format!(
        "- title: Landing\n  links:\n    - type: pdf\n      url: {base}/landing.pdf\n"
    ));
    let report = harvest(&config(&site, Arc::new(FakeRenderer::default())))
        .await
        .unwrap();

    assert!(matches!(
        report.records[0].outcome,
        Err(RecordError::NotAPdf { ref magic, .. }) if magic.as_slice() == b"<!do"
    ));
    assert!(!report.source_written);
}

#[tokio::test]
async fn zero_page_pdf_is_empty_document() {
    let mut routes = HashMap::new();
    routes.insert("/empty.pdf", pdf_bytes(&[]));
    let base = serve(routes).await;

    let site = Site::with_yaml(&format!(
        "- title: Empty\n  links:\n    - type: pdf\n      url: {base}/empty.pdf\n"
    ));
    let renderer = Arc::new(FakeRenderer::default());
    let report = harvest(&config(&site, renderer.clone())).await.unwrap();

    assert_eq!(report.records[0].outcome, Err(RecordError::EmptyDocument));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert!(!site.image("empty.png").exists());
}

#[tokio::test]
async fn year_filter_skips_other_years() {
    let site = Site::with_yaml("- title: Old\n  year: 2023\n  links:\n    - type: pdf\n      url: http://127.0.0.1:9/old.pdf\n");
    let config = HarvestConfig::builder()
        .site_root(site.root())
        .year(2025)
        .build()
        .unwrap();

    let report = harvest(&config).await.unwrap();
    assert_eq!(
        report.records[0].outcome,
        Ok(RecordOutcome::Skipped {
            reason: SkipReason::YearFiltered
        })
    );
}

#[tokio::test]
async fn override_table_supplies_missing_link() {
    let mut routes = HashMap::new();
    routes.insert("/manual.pdf", pdf_bytes(&[&[11_000]]));
    let base = serve(routes).await;

    let site = Site::with_yaml("- title: MetaAgent\n");
    let config = HarvestConfig::builder()
        .site_root(site.root())
        .url_override("MetaAgent", format!("{base}/manual.pdf"))
        .build()
        .unwrap();

    let report = harvest(&config).await.unwrap();
    assert!(report.records[0].is_extracted());
    assert!(site.image("metaagent.jpg").exists());
}

#[tokio::test]
async fn html_source_writes_images_but_not_the_page() {
    let mut routes = HashMap::new();
    routes.insert("/p.pdf", pdf_bytes(&[&[12_000]]));
    let base = serve(routes).await;

    let dir = tempfile::tempdir().unwrap();
    let page = format!(
        r#"<table><tr class="publication">
  <td><img src="/images/publications/guard.png"></td>
  <td><b>Guard</b> <a href="{base}/p.pdf">pdf</a></td>
</tr></table>"#
    );
    std::fs::write(dir.path().join("index.html"), &page).unwrap();

    let config = HarvestConfig::builder()
        .site_root(dir.path())
        .html_source("index.html")
        .build()
        .unwrap();
    let report = harvest(&config).await.unwrap();

    assert!(report.records[0].is_extracted());
    assert!(!report.source_written);
    // Stem comes from the declared image; extension from the native encoding.
    assert!(dir.path().join("images/publications/guard.jpg").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("index.html")).unwrap(),
        page
    );
}

#[tokio::test]
async fn html_figure_lands_beside_the_declared_image() {
    let mut routes = HashMap::new();
    routes.insert("/p.pdf", pdf_bytes(&[&[12_000]]));
    let base = serve(routes).await;

    let dir = tempfile::tempdir().unwrap();
    let page = format!(
        r#"<table><tr class="publication">
  <td><img src="/assets/thumbs/guard.png"></td>
  <td><b>Guard</b> <a href="{base}/p.pdf">pdf</a></td>
</tr></table>"#
    );
    std::fs::write(dir.path().join("index.html"), &page).unwrap();

    let config = HarvestConfig::builder()
        .site_root(dir.path())
        .html_source("index.html")
        .build()
        .unwrap();
    let report = harvest(&config).await.unwrap();

    assert!(dir.path().join("assets/thumbs/guard.jpg").exists());
    assert!(!dir.path().join("images/publications/guard.jpg").exists());
    match &report.records[0].outcome {
        Ok(RecordOutcome::Extracted { picture, .. }) => {
            assert_eq!(picture.as_deref(), Some("/assets/thumbs/guard.jpg"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn titles_without_ascii_get_distinct_files() {
    let mut routes = HashMap::new();
    routes.insert("/a.pdf", pdf_bytes(&[&[11_000]]));
    routes.insert("/b.pdf", pdf_bytes(&[&[13_000]]));
    let base = serve(routes).await;

    let site = Site::with_yaml(&format!(
        "- title: 水印检测\n  links:\n    - type: pdf\n      url: {base}/a.pdf\n\
         - title: 提示注入\n  links:\n    - type: pdf\n      url: {base}/b.pdf\n"
    ));
    let report = harvest(&config(&site, Arc::new(FakeRenderer::default())))
        .await
        .unwrap();

    assert_eq!(report.stats.extracted, 2);
    assert_eq!(std::fs::read(site.image("paper-0.jpg")).unwrap().len(), 11_000);
    assert_eq!(std::fs::read(site.image("paper-1.jpg")).unwrap().len(), 13_000);
    assert!(!site.image(".jpg").exists());
    let yaml = site.yaml();
    assert!(yaml.contains("picture: /images/publications/paper-0.jpg"));
    assert!(yaml.contains("picture: /images/publications/paper-1.jpg"));
}

#[tokio::test]
async fn slug_clash_with_existing_picture_gets_suffix() {
    let mut routes = HashMap::new();
    routes.insert("/a.pdf", pdf_bytes(&[&[11_000]]));
    let base = serve(routes).await;

    let site = Site::with_yaml(&format!(
        "- title: Guard\n  picture: /images/publications/guard.png\n\
         - title: Guard!\n  links:\n    - type: pdf\n      url: {base}/a.pdf\n"
    ));
    harvest(&config(&site, Arc::new(FakeRenderer::default())))
        .await
        .unwrap();

    assert!(site.image("guard-2.jpg").exists());
    assert!(site.yaml().contains("picture: /images/publications/guard-2.jpg"));
}

#[tokio::test]
async fn slow_server_hits_download_timeout() {
    let mut routes = HashMap::new();
    routes.insert("/slow.pdf", pdf_bytes(&[&[11_000]]));
    let base = serve_after(routes, Duration::from_secs(3)).await;

    let site = Site::with_yaml(&format!(
        "- title: Slow\n  links:\n    - type: pdf\n      url: {base}/slow.pdf\n"
    ));
    let config = HarvestConfig::builder()
        .site_root(site.root())
        .renderer(Arc::new(FakeRenderer::default()))
        .download_timeout_secs(1)
        .build()
        .unwrap();
    let report = harvest(&config).await.unwrap();

    assert!(
        matches!(
            report.records[0].outcome,
            Err(RecordError::DownloadTimeout { secs: 1, .. })
        ),
        "got: {:?}",
        report.records[0].outcome
    );
    assert!(!report.source_written);
}

#[tokio::test]
async fn download_dir_is_removed_after_success_and_failure() {
    let mut routes = HashMap::new();
    routes.insert("/ok.pdf", pdf_bytes(&[&[11_000]]));
    routes.insert("/empty.pdf", pdf_bytes(&[]));
    let base = serve(routes).await;
    let fetcher = Fetcher::new(5).unwrap();

    let pdf = fetcher.fetch(&format!("{base}/ok.pdf")).await.unwrap();
    let temp = pdf.path().parent().unwrap().to_path_buf();
    assert_eq!(std::fs::metadata(pdf.path()).unwrap().len(), pdf.len());
    drop(pdf);
    assert!(!temp.exists());

    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::from(
        &HarvestConfig::builder().site_root(out.path()).build().unwrap(),
    );
    let pdf = fetcher.fetch(&format!("{base}/empty.pdf")).await.unwrap();
    let temp = pdf.path().parent().unwrap().to_path_buf();
    let err = extract_figure(pdf.path(), "empty", &options, &FakeRenderer::default()).unwrap_err();
    assert_eq!(err, RecordError::EmptyDocument);
    drop(pdf);
    assert!(!temp.exists());
}

#[tokio::test]
async fn missing_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarvestConfig::builder().site_root(dir.path()).build().unwrap();

    let err = harvest(&config).await.unwrap_err();
    assert!(matches!(err, PubFigError::SourceNotFound { .. }));
    assert!(err.to_string().starts_with("Could not find "));
    assert!(err.to_string().ends_with("_data/publications.yml"));
}

#[test]
fn sync_wrapper_reports_fatal_errors() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = HarvestConfig::builder()
        .site_root(dir.path())
        .yaml_source("nope.yml")
        .build()
        .unwrap();

    let err = tokio_test::assert_err!(harvest_sync(&config));
    assert!(matches!(err, PubFigError::SourceNotFound { ref path } if path.ends_with("nope.yml")));
}

#[test]
fn sync_wrapper_handles_empty_list() {
    let site = Site::with_yaml("");
    let report = tokio_test::assert_ok!(harvest_sync(&config(
        &site,
        Arc::new(FakeRenderer::default())
    )));
    assert_eq!(report.stats.total_records, 0);
    assert!(!report.source_written);
}
