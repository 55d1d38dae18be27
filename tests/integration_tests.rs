//! Integration tests for the confirmation preview and export pipeline.
//!
//! Delays run on tokio's paused clock, so settle and measurement waits are
//! virtual. Text is painted with the built-in placeholder metrics, which
//! keeps pixel output identical across machines.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use receipt_forge::document::{self, Document, NodeRole};
use receipt_forge::download::{DirectorySink, DownloadSink, MemorySink};
use receipt_forge::error::{ExportError, RasterError};
use receipt_forge::export::{output_height, ExportPipeline};
use receipt_forge::fonts::FontManager;
use receipt_forge::layout_config::{LayoutBox, SurfaceLayout};
use receipt_forge::notify::{RecordingNotifier, EXPORT_FAILED_MESSAGE};
use receipt_forge::preview::PreviewRenderer;
use receipt_forge::raster::{CaptureTarget, RasterImage, RasterOptions, Rasterizer, SkiaRasterizer};
use receipt_forge::sizing::DisplayHeight;
use receipt_forge::{
    ExportConfig, ExportOutcome, ExportState, FieldName, FieldSet, Session, SkipReason,
};

// =====================================================================
// Fixtures
// =====================================================================

/// Rasterizer that always fails.
struct FailingRasterizer;

impl Rasterizer for FailingRasterizer {
    async fn rasterize(
        &self,
        _target: CaptureTarget,
        _options: RasterOptions,
    ) -> Result<RasterImage, RasterError> {
        Err(RasterError::Other("canvas context unavailable".to_string()))
    }
}

/// Records every captured layout, then paints with tiny-skia.
#[derive(Clone, Default)]
struct SpyRasterizer {
    seen: Arc<Mutex<Vec<(SurfaceLayout, RasterOptions)>>>,
}

impl SpyRasterizer {
    fn seen(&self) -> Vec<(SurfaceLayout, RasterOptions)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Rasterizer for SpyRasterizer {
    async fn rasterize(
        &self,
        target: CaptureTarget,
        options: RasterOptions,
    ) -> Result<RasterImage, RasterError> {
        self.seen
            .lock()
            .unwrap()
            .push((target.layout.clone(), options));
        SkiaRasterizer.rasterize(target, options).await
    }
}

/// Returns a solid raster of a fixed size regardless of the surface.
struct FixedRasterizer(u32, u32);

impl Rasterizer for FixedRasterizer {
    async fn rasterize(
        &self,
        _target: CaptureTarget,
        _options: RasterOptions,
    ) -> Result<RasterImage, RasterError> {
        Ok(RasterImage::new(image::RgbaImage::from_pixel(
            self.0,
            self.1,
            image::Rgba([0, 106, 78, 255]),
        )))
    }
}

struct FailingSink;

impl DownloadSink for FailingSink {
    fn deliver(&self, _filename: &str, _bytes: &[u8]) -> io::Result<Option<PathBuf>> {
        Err(io::Error::other("disk full"))
    }
}

fn session_with<R: Rasterizer, S: DownloadSink>(
    rasterizer: R,
    sink: S,
    config: ExportConfig,
) -> (Session<R, S, RecordingNotifier>, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    let session = Session::new(
        config,
        FieldSet::default(),
        FontManager::default(),
        rasterizer,
        sink,
        notifier.clone(),
    );
    (session, notifier)
}

fn default_session() -> (Session<SkiaRasterizer, MemorySink, RecordingNotifier>, MemorySink) {
    let sink = MemorySink::new();
    let (session, _) = session_with(SkiaRasterizer, sink.clone(), ExportConfig::default());
    (session, sink)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn clone_count<R, S, N>(session: &Session<R, S, N>) -> usize
where
    R: Rasterizer,
    S: DownloadSink,
    N: receipt_forge::notify::Notifier,
{
    document::lock(&session.document()).clone_count()
}

fn decode_png(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

fn visit(lb: &LayoutBox, f: &mut dyn FnMut(&LayoutBox)) {
    f(lb);
    for child in &lb.children {
        visit(child, f);
    }
}

// =====================================================================
// Field store & preview
// =====================================================================

#[tokio::test(start_paused = true)]
async fn valid_edit_updates_only_that_field() {
    let (mut session, _) = default_session();
    session.mount();
    let before = session.fields().clone();

    assert!(session.set_field("beneficiaryName", "ACME TRADERS"));
    assert_eq!(session.fields().get(FieldName::BeneficiaryName), "ACME TRADERS");
    for name in FieldName::ALL {
        if name != FieldName::BeneficiaryName {
            assert_eq!(session.fields().get(name), before.get(name));
        }
    }
    assert_eq!(session.revision(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_field_leaves_everything_unchanged() {
    let (mut session, _) = default_session();
    session.mount();
    let fields = session.fields().clone();
    let layout = session.surface_layout().unwrap().unwrap();

    assert!(!session.set_field("swiftCode", "HABBPKKA"));
    assert_eq!(session.fields(), &fields);
    assert_eq!(session.revision(), 0);
    assert_eq!(session.surface_layout().unwrap().unwrap(), layout);
}

#[test]
fn confirmation_lays_out_at_source_width() {
    let doc = Document::new(360.0, Arc::new(FontManager::default()));
    let mut doc = doc;
    let surface = PreviewRenderer::new(420.0).render(&FieldSet::default());
    let handle = doc.attach(surface, NodeRole::Surface);
    let layout = doc.layout(handle).unwrap();

    assert_eq!(layout.width, 420.0);
    assert!(layout.height > 200.0, "height {}", layout.height);

    let mut texts = Vec::new();
    visit(&layout.root, &mut |b| {
        if let Some(t) = &b.text {
            for line in &t.lines {
                texts.push(line.text.clone());
            }
        }
    });
    let all = texts.join(" ");
    assert!(all.contains("PKR 9,000"), "{all}");
    assert!(all.contains("MEEZAN 0102-0105678934"), "{all}");
}

#[test]
fn longer_values_make_a_taller_surface() {
    let renderer = PreviewRenderer::new(420.0);
    let mut doc = Document::new(360.0, Arc::new(FontManager::default()));
    let short = doc.attach(renderer.render(&FieldSet::default()), NodeRole::Surface);

    let mut fields = FieldSet::default();
    fields.set(
        FieldName::Comments,
        "Invoice 2291 for the October media buy, second instalment, balance due on delivery",
    );
    let long = doc.attach(renderer.render(&fields), NodeRole::Surface);

    assert!(doc.measure_height(long).unwrap() > doc.measure_height(short).unwrap());
}

#[test]
fn detail_values_that_fit_stay_on_one_line() {
    let mut doc = Document::new(360.0, Arc::new(FontManager::default()));
    let surface = PreviewRenderer::new(420.0).render(&FieldSet::default());
    let handle = doc.attach(surface, NodeRole::Surface);
    let layout = doc.layout(handle).unwrap();

    let mut date_lines = Vec::new();
    visit(&layout.root, &mut |b| {
        if let Some(t) = &b.text {
            if t.lines.iter().any(|l| l.text.contains("03:42")) {
                date_lines = t.lines.iter().map(|l| l.text.clone()).collect();
            }
        }
    });
    assert_eq!(date_lines, ["17 Oct 2025, 03:42 PM"]);
}

// =====================================================================
// Layout sizing
// =====================================================================

#[tokio::test(start_paused = true)]
async fn display_height_follows_measured_height() {
    let (mut session, _) = default_session();
    assert_eq!(session.sizing().display_height(), DisplayHeight::Auto);

    session.mount();
    session.sizing_mut().settled().await;

    let live = session.surface_layout().unwrap().unwrap();
    let scale = 360.0 / 420.0;
    assert!((session.sizing().scale() - scale).abs() < 1e-6);
    assert!((live.transform_scale - scale).abs() < 1e-6);
    match session.sizing().display_height() {
        DisplayHeight::Px(h) => assert!((h - live.height * scale).abs() < 1e-3),
        DisplayHeight::Auto => panic!("expected a measured height"),
    }
}

#[tokio::test(start_paused = true)]
async fn newer_trigger_supersedes_pending_measurement() {
    let (mut session, _) = default_session();
    session.mount();
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.set_field("comments", "A much longer comment that wraps onto a second line in the card");
    tokio::time::sleep(Duration::from_millis(60)).await;
    // The first measurement would have fired at 100ms; it was aborted.
    assert_eq!(session.sizing().display_height(), DisplayHeight::Auto);

    session.sizing_mut().settled().await;
    let live = session.surface_layout().unwrap().unwrap();
    assert_eq!(
        session.sizing().display_height(),
        DisplayHeight::Px(live.height * session.sizing().scale())
    );
}

#[tokio::test(start_paused = true)]
async fn resize_remeasures_to_the_same_height() {
    let (mut session, _) = default_session();
    session.mount();
    session.sizing_mut().settled().await;
    let settled = session.sizing().display_height();
    assert!(matches!(settled, DisplayHeight::Px(_)));

    for width in [320.0, 1024.0, 360.0] {
        session.resize(width);
        assert!(session.sizing().has_pending());
        session.sizing_mut().settled().await;
        assert_eq!(session.sizing().display_height(), settled, "after resize to {width}");
    }
    assert_eq!(session.sizing().measure_now(session.surface()), settled);
    assert_eq!(session.sizing().measure_now(session.surface()), settled);
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_measurement() {
    let (mut session, _) = default_session();
    session.mount();
    session.teardown();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.sizing().display_height(), DisplayHeight::Auto);
    assert!(session.surface().is_none());
}

// =====================================================================
// Export – happy path
// =====================================================================

#[tokio::test(start_paused = true)]
async fn default_export_is_840_wide_png() {
    let (mut session, sink) = default_session();
    session.mount();

    let outcome = session.export().await;
    let file = outcome.file().expect("export should succeed").clone();

    assert_eq!(file.width, 840);
    assert_eq!(file.filename, format!("hbl-confirmation-840x{}.png", file.height));

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, file.filename);
    let png = decode_png(&files[0].1);
    assert_eq!(png.dimensions(), (840, file.height));

    assert_eq!(clone_count(&session), 0);
    assert_eq!(session.pipeline().state(), ExportState::Idle);
}

#[tokio::test(start_paused = true)]
async fn output_height_matches_surface_aspect() {
    let spy = SpyRasterizer::default();
    let sink = MemorySink::new();
    let (mut session, _) = session_with(spy.clone(), sink, ExportConfig::default());
    session.mount();

    let file = session.export().await.file().cloned().unwrap();
    let (captured, _) = &spy.seen()[0];
    let expected = (840.0 * captured.height / captured.width).round() as u32;
    assert!(file.height.abs_diff(expected) <= 1, "{} vs {}", file.height, expected);
}

#[tokio::test(start_paused = true)]
async fn export_is_deterministic() {
    let (mut a, sink_a) = default_session();
    let (mut b, sink_b) = default_session();
    a.mount();
    b.mount();

    a.export().await;
    a.export().await;
    b.export().await;

    let files_a = sink_a.files();
    let files_b = sink_b.files();
    assert_eq!(files_a[0].0, files_b[0].0);
    assert_eq!(sha256_hex(&files_a[0].1), sha256_hex(&files_a[1].1));
    assert_eq!(sha256_hex(&files_a[0].1), sha256_hex(&files_b[0].1));
}

#[tokio::test(start_paused = true)]
async fn edits_change_the_exported_image() {
    let (mut session, sink) = default_session();
    session.mount();
    session.export().await;
    session.set_field("amount", "125,000,000");
    session.export().await;

    let files = sink.files();
    assert_ne!(sha256_hex(&files[0].1), sha256_hex(&files[1].1));
}

#[tokio::test(start_paused = true)]
async fn capture_uses_canonical_untransformed_clone() {
    let spy = SpyRasterizer::default();
    let (mut session, _) = session_with(spy.clone(), MemorySink::new(), ExportConfig::default());
    session.mount();
    let live = session.surface_layout().unwrap().unwrap();

    session.export().await;
    let (captured, options) = &spy.seen()[0];

    assert_eq!(captured.width, 420.0);
    assert_eq!(captured.transform_scale, 1.0);
    assert_eq!(captured.origin, [-10000.0, 0.0]);
    assert_eq!(captured.height, live.height);
    assert!(live.transform_scale < 1.0);
    assert_eq!(*options, RasterOptions::default());

    // Same content as the live surface, only the root placement differs.
    let mut live_root = live.root.clone();
    live_root.x = captured.root.x;
    live_root.y = captured.root.y;
    assert_eq!(live_root, captured.root);
}

#[tokio::test(start_paused = true)]
async fn resample_preserves_aspect_for_any_raster() {
    for (w, h) in [(840, 1311), (1000, 333), (7, 3), (640, 2000)] {
        let sink = MemorySink::new();
        let (mut session, _) = session_with(FixedRasterizer(w, h), sink.clone(), ExportConfig::default());
        session.mount();
        let file = session.export().await.file().cloned().unwrap();

        assert_eq!(file.width, 840);
        assert_eq!(file.height, output_height(840, w, h));
        let source_ratio = w as f64 / h as f64;
        let out_ratio = file.width as f64 / file.height as f64;
        // Within one pixel of height.
        assert!((840.0 / source_ratio - file.height as f64).abs() <= 1.0, "{source_ratio} {out_ratio}");
        assert_eq!(decode_png(&sink.files()[0].1).dimensions(), (840, file.height));
    }
}

#[tokio::test(start_paused = true)]
async fn zero_settle_delay_is_allowed() {
    let config = ExportConfig::from_json(r#"{"settle_delay_ms": 0}"#).unwrap();
    let (mut session, _) = session_with(SkiaRasterizer, MemorySink::new(), config);
    session.mount();
    let start = tokio::time::Instant::now();
    assert!(session.export().await.file().is_some());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn directory_sink_writes_named_file() {
    let dir = std::env::temp_dir().join(format!("receipt-forge-it-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let (mut session, _) =
        session_with(SkiaRasterizer, DirectorySink::new(&dir), ExportConfig::default());
    session.mount();

    let file = session.export().await.file().cloned().unwrap();
    let path = file.location.unwrap();
    assert_eq!(path, dir.join(&file.filename));
    assert_eq!(decode_png(&std::fs::read(&path).unwrap()).width(), 840);
    let _ = std::fs::remove_dir_all(&dir);
}

// =====================================================================
// Export – busy flag and cleanup
// =====================================================================

#[tokio::test(start_paused = true)]
async fn busy_between_start_and_completion() {
    let (mut session, sink) = default_session();
    session.mount();
    assert!(!session.pipeline().is_busy());

    let (first, (state, clones, second)) = tokio::join!(session.export(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = session.pipeline().state();
        let clones = clone_count(&session);
        let second = session.export().await;
        (state, clones, second)
    });

    assert_eq!(state, ExportState::Capturing);
    assert_eq!(clones, 1);
    assert!(matches!(second, ExportOutcome::Skipped(SkipReason::Busy)));
    assert!(first.file().is_some());
    assert_eq!(sink.len(), 1);
    assert!(!session.pipeline().is_busy());
    assert_eq!(clone_count(&session), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_rasterizer_notifies_and_cleans_up() {
    let sink = MemorySink::new();
    let (mut session, notifier) =
        session_with(FailingRasterizer, sink.clone(), ExportConfig::default());
    session.mount();

    let outcome = session.export().await;
    assert!(matches!(outcome, ExportOutcome::Failed(ExportError::Raster(_))));
    assert_eq!(notifier.messages(), vec![EXPORT_FAILED_MESSAGE.to_string()]);
    assert!(!session.pipeline().is_busy());
    assert_eq!(clone_count(&session), 0);
    assert!(sink.is_empty());

    // The pipeline is usable again afterwards.
    let again = session.export().await;
    assert!(matches!(again, ExportOutcome::Failed(_)));
    assert_eq!(notifier.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn delivery_failure_is_reported() {
    let (mut session, notifier) =
        session_with(SkiaRasterizer, FailingSink, ExportConfig::default());
    session.mount();

    let outcome = session.export().await;
    assert!(matches!(outcome, ExportOutcome::Failed(ExportError::Delivery(_))));
    assert_eq!(notifier.messages().len(), 1);
    assert_eq!(clone_count(&session), 0);
    assert_eq!(session.pipeline().state(), ExportState::Idle);
}

#[tokio::test(start_paused = true)]
async fn missing_surface_is_a_silent_no_op() {
    let sink = MemorySink::new();
    let (mut session, notifier) = session_with(SkiaRasterizer, sink.clone(), ExportConfig::default());

    let outcome = session.export().await;
    assert!(matches!(outcome, ExportOutcome::Skipped(SkipReason::NoSurface)));

    session.mount();
    session.unmount();
    let outcome = session.export().await;
    assert!(matches!(outcome, ExportOutcome::Skipped(SkipReason::NoSurface)));

    assert!(notifier.messages().is_empty());
    assert!(sink.is_empty());
    assert_eq!(clone_count(&session), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_handle_is_treated_as_unmounted() {
    let doc = Document::new(360.0, Arc::new(FontManager::default())).into_shared();
    let surface = PreviewRenderer::new(420.0).render(&FieldSet::default());
    let handle = document::lock(&doc).attach(surface, NodeRole::Surface);
    document::lock(&doc).detach(handle);

    let pipeline = ExportPipeline::new(
        Arc::clone(&doc),
        SkiaRasterizer,
        MemorySink::new(),
        RecordingNotifier::new(),
        ExportConfig::default(),
    );
    let outcome = pipeline.export(Some(handle)).await;
    assert!(matches!(outcome, ExportOutcome::Skipped(SkipReason::NoSurface)));
    assert!(document::lock(&doc).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_export_still_detaches_clone() {
    let (mut session, sink) = default_session();
    session.mount();

    let timed_out = tokio::time::timeout(Duration::from_millis(50), session.export()).await;
    assert!(timed_out.is_err());
    assert_eq!(clone_count(&session), 0);
    assert!(!session.pipeline().is_busy());
    assert!(sink.is_empty());
}

// =====================================================================
// Configuration
// =====================================================================

#[tokio::test(start_paused = true)]
async fn custom_target_width_and_prefix() {
    let config = ExportConfig::from_json(
        r#"{"target_width": 1080, "filename_prefix": "transfer", "oversample": 1.0}"#,
    )
    .unwrap();
    let sink = MemorySink::new();
    let (mut session, _) = session_with(SkiaRasterizer, sink.clone(), config);
    session.mount();

    let file = session.export().await.file().cloned().unwrap();
    assert_eq!(file.width, 1080);
    assert!(file.filename.starts_with("transfer-1080x"));
}

#[test]
fn surface_layout_json_roundtrip() {
    let mut doc = Document::new(360.0, Arc::new(FontManager::default()));
    let handle = doc.attach(
        PreviewRenderer::new(420.0).render(&FieldSet::default()),
        NodeRole::Surface,
    );
    let layout = doc.layout(handle).unwrap();
    let parsed = SurfaceLayout::from_json(&layout.to_json()).unwrap();
    assert_eq!(parsed, layout);
}
