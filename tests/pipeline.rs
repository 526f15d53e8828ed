//! Integration tests for the batch pipeline.
//!
//! Collaborators are instrumented fakes for the renderer and rasterizer (so
//! concurrency can be sampled) and the real lopdf library. Remote references
//! are served by `wiremock`.
//!
//! Every fake writes a one-page PDF whose MediaBox width identifies its
//! source, so page order in the merged output can be checked exactly.
//!
//! The Chrome-backed test at the bottom is gated behind `E2E_ENABLED`.

use async_trait::async_trait;
use edgequake_pdfmerge::backend::lopdf::LopdfLibrary;
use edgequake_pdfmerge::{
    BackendError, CancellationToken, FailurePolicy, ItemError, ItemStatus, Kind, MergeConfig,
    MergeProgressCallback, Origin, PaperSize, PdfLibrary, PdfMergeError, Pipeline, PrintOptions,
    Rasterizer, RenderService, Stage,
};
use lopdf::{dictionary, Document, Object};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

const RASTER_WIDTH: u32 = 555;
const RENDER_WIDTH: u32 = 777;

/// One blank page per entry in `widths`, each identified by its MediaBox width.
fn write_pdf(path: &Path, widths: &[u32]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = widths
        .iter()
        .map(|w| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (*w as i64).into(), 800.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => widths.len() as u32,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn pdf_bytes(widths: &[u32]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("body.pdf");
    write_pdf(&p, widths);
    std::fs::read(p).unwrap()
}

fn page_widths(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                .as_i64()
                .unwrap()
        })
        .collect()
}

fn temp_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Tracks how many calls are inside a fake at once.
#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Gauge {
    async fn hold(&self, delay: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Serves a fixed body after `hold`, logging when each request arrived.
struct Paced {
    body: Vec<u8>,
    hold: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for Paced {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().push(Instant::now());
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/pdf")
            .set_body_bytes(self.body.clone())
            .set_delay(self.hold)
    }
}

/// Most requests being served at any one arrival, each counted for `hold`.
fn peak_in_flight(arrivals: &[Instant], hold: Duration) -> usize {
    arrivals
        .iter()
        .map(|t| {
            arrivals
                .iter()
                .filter(|u| **u <= *t && **u + hold > *t)
                .count()
        })
        .max()
        .unwrap_or(0)
}

struct MockRender {
    gauge: Gauge,
    delay: Duration,
    seen: Mutex<Vec<(String, PrintOptions)>>,
}

impl MockRender {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            gauge: Gauge::default(),
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(url, _)| url.clone()).collect()
    }
}

#[async_trait]
impl RenderService for MockRender {
    async fn render(
        &self,
        url: &str,
        dest: &Path,
        _timeout: Duration,
        options: &PrintOptions,
    ) -> Result<(), BackendError> {
        self.seen.lock().push((url.to_string(), options.clone()));
        self.gauge.hold(self.delay).await;
        write_pdf(dest, &[RENDER_WIDTH]);
        Ok(())
    }
}

struct MockRaster {
    gauge: Gauge,
    delay: Duration,
}

impl MockRaster {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            gauge: Gauge::default(),
            delay,
        })
    }
}

#[async_trait]
impl Rasterizer for MockRaster {
    async fn rasterize(&self, _image: &Path, dest: &Path) -> Result<(), BackendError> {
        self.gauge.hold(self.delay).await;
        write_pdf(dest, &[RASTER_WIDTH]);
        Ok(())
    }
}

struct Fixture {
    inputs: tempfile::TempDir,
    scratch: tempfile::TempDir,
    render: Arc<MockRender>,
    raster: Arc<MockRaster>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            inputs: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
            render: MockRender::new(Duration::from_millis(10)),
            raster: MockRaster::new(Duration::from_millis(100)),
        }
    }

    fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render = MockRender::new(delay);
        self
    }

    fn pdf(&self, name: &str, width: u32) -> String {
        let p = self.inputs.path().join(name);
        write_pdf(&p, &[width]);
        p.display().to_string()
    }

    fn file(&self, name: &str, body: &[u8]) -> String {
        let p = self.inputs.path().join(name);
        std::fs::write(&p, body).unwrap();
        p.display().to_string()
    }

    fn builder(&self) -> edgequake_pdfmerge::MergeConfigBuilder {
        MergeConfig::builder().temp_dir(self.scratch.path())
    }

    fn pipeline(&self, config: MergeConfig) -> Pipeline {
        Pipeline::with_backends(
            config,
            self.render.clone(),
            self.raster.clone(),
            Arc::new(LopdfLibrary::new()),
        )
        .unwrap()
    }

    fn leftovers(&self) -> Vec<PathBuf> {
        temp_files(self.scratch.path())
    }
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mixed_batch_merges_in_submission_order_with_metadata() {
    let fx = Fixture::new();
    let refs = vec![
        fx.pdf("A.pdf", 100),
        fx.file("B.jpg", b"jpeg bytes"),
        fx.file("C.html", b"<html><body>C</body></html>"),
    ];
    let config = fx
        .builder()
        .author("Records Office")
        .creator("pdfmerge tests")
        .build()
        .unwrap();

    let output = fx.pipeline(config).run(&refs).await.unwrap();

    // The image is the slowest converter but still lands in position 1.
    assert_eq!(
        page_widths(output.document.path()),
        vec![100, RASTER_WIDTH as i64, RENDER_WIDTH as i64]
    );
    let meta = LopdfLibrary::new()
        .read_metadata(output.document.path())
        .unwrap();
    assert_eq!(meta.author.as_deref(), Some("Records Office"));
    assert_eq!(meta.creator.as_deref(), Some("pdfmerge tests"));

    let kinds: Vec<_> = output.items.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![Some(Kind::Pdf), Some(Kind::Image), Some(Kind::Html)]);
    assert!(output.items.iter().all(|r| r.is_included()));
    assert_eq!(output.stats.page_count, 3);
    assert!(output.stats.merged);

    let urls = fx.render.urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].starts_with("file://"), "renderer got {}", urls[0]);
}

#[tokio::test]
async fn order_does_not_depend_on_completion_timing() {
    let fx = Fixture::new().with_render_delay(Duration::from_millis(150));
    let refs = vec![
        fx.file("0.html", b"<p>0</p>"),
        fx.pdf("1.pdf", 101),
        fx.file("2.png", b"png"),
        fx.pdf("3.pdf", 103),
    ];
    let output = fx
        .pipeline(fx.builder().build().unwrap())
        .run(&refs)
        .await
        .unwrap();

    assert_eq!(
        page_widths(output.document.path()),
        vec![RENDER_WIDTH as i64, 101, RASTER_WIDTH as i64, 103]
    );
}

// ── Partial failure ──────────────────────────────────────────────────────────

#[tokio::test]
async fn timed_out_fetch_is_dropped_and_rest_merges() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(pdf_bytes(&[999]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let bad = format!("{}/slow.pdf", server.uri());
    let refs = vec![fx.pdf("A.pdf", 100), bad.clone(), fx.pdf("C.pdf", 300)];
    let config = fx.builder().timeout_secs(1).build().unwrap();

    let output = fx.pipeline(config).run(&refs).await.unwrap();

    assert_eq!(page_widths(output.document.path()), vec![100, 300]);
    let report = &output.items[1];
    assert_eq!(report.reference, bad);
    match &report.status {
        ItemStatus::Dropped { stage, reason } => {
            assert_eq!(*stage, Stage::Fetch);
            assert!(reason.contains("timed out"), "reason: {reason}");
        }
        other => panic!("expected drop, got {other:?}"),
    }
    assert_eq!(output.stats.dropped_items, 1);
}

#[tokio::test]
async fn http_error_and_unknown_type_are_dropped() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let refs = vec![
        format!("{}/gone.pdf", server.uri()),
        fx.pdf("B.pdf", 200),
        fx.file("notes.docx", b"docx"),
        "ftp://example.com/x.pdf".to_string(),
    ];
    let output = fx
        .pipeline(fx.builder().build().unwrap())
        .run(&refs)
        .await
        .unwrap();

    let stages: Vec<Option<Stage>> = output
        .items
        .iter()
        .map(|r| match &r.status {
            ItemStatus::Included => None,
            ItemStatus::Dropped { stage, .. } => Some(*stage),
        })
        .collect();
    assert_eq!(
        stages,
        vec![Some(Stage::Fetch), None, Some(Stage::Classify), Some(Stage::Fetch)]
    );
    assert_eq!(output.dropped().count(), 3);
    assert_eq!(fx.render.gauge.calls() + fx.raster.gauge.calls(), 0);
}

#[tokio::test]
async fn nothing_to_merge_cleans_up() {
    let fx = Fixture::new();
    let refs = vec![fx.file("a.txt", b"a"), "/no/such/file.pdf".to_string()];
    let err = fx
        .pipeline(fx.builder().build().unwrap())
        .run(&refs)
        .await
        .unwrap_err();
    assert!(matches!(err, PdfMergeError::NothingToMerge { total: 2 }));
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn fail_fast_returns_first_item_failure() {
    let fx = Fixture::new();
    let refs = vec![
        fx.pdf("A.pdf", 100),
        "/no/such/file.pdf".to_string(),
        fx.file("C.png", b"png"),
    ];
    let config = fx
        .builder()
        .failure_policy(FailurePolicy::FailFast)
        .build()
        .unwrap();

    let err = fx.pipeline(config).run(&refs).await.unwrap_err();
    match err {
        PdfMergeError::ItemFailed {
            index,
            reference,
            source,
        } => {
            assert_eq!(index, 1);
            assert_eq!(reference, "/no/such/file.pdf");
            assert!(matches!(source, ItemError::InvalidReference { .. }));
        }
        other => panic!("expected ItemFailed, got {other:?}"),
    }
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn merge_failure_is_fatal_and_cleans_up() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes(&[100])))
        .mount(&server)
        .await;

    let refs = vec![
        format!("{}/a.pdf", server.uri()),
        fx.file("bad.pdf", b"%PDF-1.5 truncated garbage"),
        fx.file("c.png", b"png"),
    ];
    let err = fx
        .pipeline(fx.builder().build().unwrap())
        .run(&refs)
        .await
        .unwrap_err();

    assert!(
        matches!(err, PdfMergeError::MergeFailed { inputs: 3, .. }),
        "got {err:?}"
    );
    // Download, rasterized page and partial merge output are all gone.
    assert!(fx.leftovers().is_empty(), "left {:?}", fx.leftovers());
}

// ── Single survivor ──────────────────────────────────────────────────────────

#[tokio::test]
async fn single_survivor_is_unchanged_apart_from_metadata() {
    let fx = Fixture::new();
    let a = fx.pdf("A.pdf", 100);
    let before = std::fs::read(&a).unwrap();
    let refs = vec![a.clone(), fx.file("b.bin", b"??")];
    let config = fx.builder().subject("Only one").build().unwrap();

    let output = fx.pipeline(config).run(&refs).await.unwrap();

    assert!(!output.stats.merged);
    assert_eq!(page_widths(output.document.path()), vec![100]);
    let meta = LopdfLibrary::new()
        .read_metadata(output.document.path())
        .unwrap();
    assert_eq!(meta.subject.as_deref(), Some("Only one"));
    // The caller's file is neither stamped nor deleted.
    assert_eq!(std::fs::read(&a).unwrap(), before);
    drop(output);
    assert!(Path::new(&a).exists());
}

// ── Concurrency bounds ───────────────────────────────────────────────────────

#[tokio::test]
async fn render_concurrency_never_exceeds_worker() {
    let fx = Fixture::new().with_render_delay(Duration::from_millis(100));
    let refs: Vec<String> = (0..5)
        .map(|i| fx.file(&format!("{i}.html"), b"<p>x</p>"))
        .collect();
    let config = fx.builder().worker(2).build().unwrap();

    let output = fx.pipeline(config).run(&refs).await.unwrap();

    assert_eq!(fx.render.gauge.calls(), 5);
    assert!(fx.render.gauge.peak() <= 2, "peak {}", fx.render.gauge.peak());
    assert_eq!(output.stats.page_count, 5);
}

#[tokio::test]
async fn image_and_html_share_the_conversion_pool() {
    let fx = Fixture::new().with_render_delay(Duration::from_millis(100));
    let mut refs = Vec::new();
    for i in 0..3 {
        refs.push(fx.file(&format!("{i}.html"), b"<p>x</p>"));
        refs.push(fx.file(&format!("{i}.gif"), b"gif"));
    }
    let config = fx.builder().convert_workers(1).build().unwrap();

    let start = Instant::now();
    fx.pipeline(config).run(&refs).await.unwrap();
    let elapsed = start.elapsed();

    // One permit for both kinds: six 100 ms conversions run back to back.
    assert!(elapsed >= Duration::from_millis(600), "took {elapsed:?}");
    assert_eq!(fx.render.gauge.peak(), 1);
    assert_eq!(fx.raster.gauge.peak(), 1);
}

#[tokio::test]
async fn fetches_are_bounded_by_fetch_workers() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    let hold = Duration::from_millis(200);
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .respond_with(Paced {
            body: pdf_bytes(&[400]),
            hold,
            arrivals: arrivals.clone(),
        })
        .mount(&server)
        .await;

    let refs: Vec<String> = (0..6)
        .map(|i| format!("{}/doc{i}.pdf", server.uri()))
        .collect();
    let config = fx.builder().fetch_workers(2).build().unwrap();

    let start = Instant::now();
    let output = fx.pipeline(config).run(&refs).await.unwrap();
    let elapsed = start.elapsed();

    // Six 200 ms responses through two slots take at least three rounds.
    assert!(elapsed >= Duration::from_millis(600), "took {elapsed:?}");
    assert_eq!(output.stats.page_count, 6);
    assert!(output.items.iter().all(|r| r.origin == Some(Origin::Remote)));

    let arrivals = arrivals.lock();
    assert_eq!(arrivals.len(), 6);
    let peak = peak_in_flight(&arrivals, hold);
    assert!(peak <= 2, "{peak} requests in flight");
}

// ── Remote references ────────────────────────────────────────────────────────

#[tokio::test]
async fn extension_comes_from_content_type_when_url_has_none() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(pdf_bytes(&[250])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/thumbnail"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(b"png".to_vec()),
        )
        .mount(&server)
        .await;

    let refs = vec![
        format!("{}/export", server.uri()),
        format!("{}/thumbnail", server.uri()),
    ];
    let output = fx
        .pipeline(fx.builder().build().unwrap())
        .run(&refs)
        .await
        .unwrap();

    assert_eq!(output.items[0].kind, Some(Kind::Pdf));
    assert_eq!(output.items[1].kind, Some(Kind::Image));
    assert_eq!(
        page_widths(output.document.path()),
        vec![250, RASTER_WIDTH as i64]
    );
}

// ── Resource lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn temp_files_are_released_after_delivery() {
    let fx = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/remote.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_bytes(&[600])))
        .mount(&server)
        .await;

    let refs = vec![
        format!("{}/remote.pdf", server.uri()),
        fx.file("b.png", b"png"),
        fx.file("c.html", b"<p>c</p>"),
    ];
    let config = fx.builder().release_grace_secs(1).build().unwrap();
    let output = fx.pipeline(config).run(&refs).await.unwrap();

    // Only the response-bound document is left once the batch returns.
    assert_eq!(fx.leftovers(), vec![output.document.path().to_path_buf()]);

    let mut sink = Vec::new();
    let written = output.document.deliver(&mut sink).await.unwrap();
    assert!(written > 0);
    assert!(sink.starts_with(b"%PDF"));
    assert_eq!(fx.leftovers().len(), 1, "released before the grace window");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn persist_leaves_no_temp_files() {
    let fx = Fixture::new();
    let refs = vec![fx.pdf("a.pdf", 1), fx.pdf("b.pdf", 2)];
    let output = fx
        .pipeline(fx.builder().build().unwrap())
        .run(&refs)
        .await
        .unwrap();

    let dest = fx.inputs.path().join("out/merged.pdf");
    output.document.persist(&dest).await.unwrap();

    assert_eq!(page_widths(&dest), vec![1, 2]);
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn cancelled_batch_releases_everything() {
    let fx = Fixture::new().with_render_delay(Duration::from_secs(10));
    let refs = vec![fx.file("slow.html", b"<p>slow</p>"), fx.pdf("a.pdf", 1)];
    let pipeline = fx.pipeline(fx.builder().build().unwrap());

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = pipeline.run_with_cancel(&refs, token).await.unwrap_err();
    assert!(matches!(err, PdfMergeError::Cancelled { total: 2, .. }));
    assert!(fx.leftovers().is_empty());
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    dropped: AtomicUsize,
    batch_included: AtomicUsize,
}

impl MergeProgressCallback for Counting {
    fn on_item_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_complete(&self, _index: usize, _total: usize, _kind: Kind) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_dropped(&self, _index: usize, _total: usize, _error: &str) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _total: usize, included: usize) {
        self.batch_included.store(included, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_item() {
    let fx = Fixture::new();
    let counting = Arc::new(Counting::default());
    let refs = vec![fx.pdf("a.pdf", 1), fx.file("x.txt", b"x"), fx.file("c.jpg", b"jpg")];
    let config = fx
        .builder()
        .progress_callback(counting.clone())
        .build()
        .unwrap();

    fx.pipeline(config).run(&refs).await.unwrap();

    assert_eq!(counting.started.load(Ordering::SeqCst), 3);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counting.dropped.load(Ordering::SeqCst), 1);
    assert_eq!(counting.batch_included.load(Ordering::SeqCst), 2);
}

// ── Single-document renders ──────────────────────────────────────────────────

#[tokio::test]
async fn render_html_stamps_metadata_and_cleans_source() {
    let fx = Fixture::new();
    let config = fx.builder().keywords("inline").build().unwrap();
    let pipeline = fx.pipeline(config);

    let doc = pipeline
        .render_html(b"<html><body>hello</body></html>")
        .await
        .unwrap();

    assert_eq!(page_widths(doc.path()), vec![RENDER_WIDTH as i64]);
    let meta = LopdfLibrary::new().read_metadata(doc.path()).unwrap();
    assert_eq!(meta.keywords.as_deref(), Some("inline"));
    // The HTML source was released; only the rendered document remains.
    assert_eq!(fx.leftovers(), vec![doc.path().to_path_buf()]);
}

#[tokio::test]
async fn render_link_uses_caller_print_options() {
    let fx = Fixture::new();
    let config = fx.builder().author("Link Desk").build().unwrap();
    let pipeline = fx.pipeline(config);
    let options = PrintOptions {
        paper: PaperSize::Letter,
        landscape: true,
        scale: 0.8,
        ..PrintOptions::default()
    };

    let doc = pipeline
        .render_link("https://example.com/report", &options)
        .await
        .unwrap();

    let seen = fx.render.seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "https://example.com/report");
    assert_eq!(seen[0].1, options);

    assert_eq!(page_widths(doc.path()), vec![RENDER_WIDTH as i64]);
    let meta = LopdfLibrary::new().read_metadata(doc.path()).unwrap();
    assert_eq!(meta.author.as_deref(), Some("Link Desk"));
    assert_eq!(fx.leftovers(), vec![doc.path().to_path_buf()]);

    drop(doc);
    assert!(fx.leftovers().is_empty());
}

// ── Real browser (E2E) ───────────────────────────────────────────────────────

#[cfg(feature = "chrome")]
#[tokio::test]
async fn chrome_renders_local_html() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run browser tests");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut builder = MergeConfig::builder()
        .temp_dir(scratch.path())
        .timeout_secs(60)
        .author("e2e");
    if let Ok(chrome) = std::env::var("PDFMERGE_CHROME_PATH") {
        builder = builder.chrome_path(chrome);
    }
    let pipeline = Pipeline::from_config(builder.build().unwrap()).unwrap();

    let doc = pipeline
        .render_html(b"<html><body><h1>Hello</h1></body></html>")
        .await
        .unwrap();
    let meta = LopdfLibrary::new().read_metadata(doc.path()).unwrap();
    assert!(meta.page_count >= 1);
    assert_eq!(meta.author.as_deref(), Some("e2e"));
}
