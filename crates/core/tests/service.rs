mod common;

use common::{pdf_with_pages, FakeDecoder, MB, TWO_MB_PAGE};
use stave_core::{
    EngineConfig, LopdfDecoder, PageKey, PageSize, RenderError, RenderPriority, RenderingService,
    ViewMode,
};
use std::sync::Arc;
use std::time::Duration;

fn service_with(decoder: Arc<FakeDecoder>, config: EngineConfig) -> RenderingService {
    RenderingService::new(decoder, config)
}

fn ten_mb_config() -> EngineConfig {
    EngineConfig::default()
        .with_memory_budget_mb(10)
        .with_max_concurrent_renders(1)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn cold_miss_renders_and_caches_then_hits() {
    let decoder = Arc::new(FakeDecoder::new(6, TWO_MB_PAGE));
    let service = service_with(decoder.clone(), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    let first = service.get_rendered_page(doc, 1, 1.0).await.expect("render");
    assert_eq!(first.byte_size(), 2 * MB);
    assert_eq!(decoder.calls(), vec![1]);

    let metrics = service.metrics();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.current_bytes, 2 * MB);

    let second = service.get_rendered_page(doc, 1, 1.0).await.expect("hit");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(decoder.calls(), vec![1]);

    let metrics = service.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hit_rate, 0.5);
}

#[tokio::test]
async fn sixth_page_evicts_least_recently_used() {
    let decoder = Arc::new(FakeDecoder::new(6, TWO_MB_PAGE));
    let service = service_with(decoder, ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    for page in 1..=6 {
        service.get_rendered_page(doc, page, 1.0).await.expect("render");
    }

    let metrics = service.metrics();
    assert_eq!(metrics.current_bytes, 10 * MB);
    assert_eq!(metrics.entry_count, 5);
    assert_eq!(metrics.evictions, 1);
    assert!(!service.cache().contains(&PageKey::new(doc, 1, 1.0)));
    for page in 2..=6 {
        assert!(service.cache().contains(&PageKey::new(doc, page, 1.0)));
    }
}

#[tokio::test]
async fn concurrent_requests_share_one_render() {
    let decoder = Arc::new(FakeDecoder::gated(3, TWO_MB_PAGE));
    let service = service_with(decoder.clone(), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    let (a, b, ()) = tokio::join!(
        service.get_rendered_page(doc, 2, 1.0),
        service.get_rendered_page(doc, 2, 1.0),
        async {
            wait_until(|| service.scheduler().stats().jobs_deduplicated == 1).await;
            decoder.release();
        }
    );

    let (a, b) = (a.expect("first caller"), b.expect("second caller"));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(decoder.calls(), vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn current_request_overtakes_queued_preloads() {
    let decoder = Arc::new(FakeDecoder::gated(10, TWO_MB_PAGE));
    let service = Arc::new(service_with(decoder.clone(), ten_mb_config()));
    let doc = service.open_document(Vec::new()).expect("open").id();
    let key = |page| PageKey::new(doc, page, 1.0);

    // Occupy the only render slot, then queue preloads behind it
    let busy = service.scheduler().enqueue(key(1), RenderPriority::Current);
    service.scheduler().enqueue(key(3), RenderPriority::Preload);
    service.scheduler().enqueue(key(4), RenderPriority::Preload);

    let viewer = Arc::clone(&service);
    let current = tokio::spawn(async move { viewer.get_rendered_page(doc, 5, 1.0).await });

    wait_until(|| service.scheduler().queued_keys().first() == Some(&key(5))).await;
    assert_eq!(service.scheduler().queued_keys(), vec![key(5), key(3), key(4)]);

    decoder.release();
    busy.wait().await.expect("busy page");
    current.await.expect("join").expect("current page");

    wait_until(|| service.scheduler().stats().jobs_completed == 4).await;
    assert_eq!(decoder.calls(), vec![1, 5, 3, 4]);
}

#[tokio::test]
async fn invalidated_document_always_misses() {
    let decoder = Arc::new(FakeDecoder::new(3, TWO_MB_PAGE));
    let service = service_with(decoder.clone(), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    service.get_rendered_page(doc, 1, 1.0).await.expect("render");
    service.get_rendered_page(doc, 2, 2.0).await.expect("render");
    assert_eq!(service.invalidate_document(doc), 2);
    assert_eq!(service.metrics().current_bytes, 0);

    service.get_rendered_page(doc, 1, 1.0).await.expect("re-render");
    assert_eq!(decoder.calls(), vec![1, 2, 1]);
    assert_eq!(service.metrics().misses, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidation_mid_flight_does_not_repopulate_cache() {
    let decoder = Arc::new(FakeDecoder::gated(3, TWO_MB_PAGE));
    let service = Arc::new(service_with(decoder.clone(), ten_mb_config()));
    let doc = service.open_document(Vec::new()).expect("open").id();
    let key = PageKey::new(doc, 2, 1.0);

    let viewer = Arc::clone(&service);
    let in_flight = tokio::spawn(async move { viewer.get_rendered_page(doc, 2, 1.0).await });
    wait_until(|| decoder.calls() == vec![2]).await;

    service.invalidate_document(doc);
    decoder.release();

    let page = in_flight.await.expect("join").expect("in-flight render completes");
    assert_eq!(page.key, key);
    assert!(!service.cache().contains(&key));

    let misses = service.metrics().misses;
    service.get_rendered_page(doc, 2, 1.0).await.expect("fresh render");
    assert_eq!(service.metrics().misses, misses + 1);
    assert_eq!(decoder.calls(), vec![2, 2]);
}

#[tokio::test]
async fn invalidation_cancels_queued_jobs() {
    let decoder = Arc::new(FakeDecoder::gated(10, TWO_MB_PAGE));
    let service = service_with(decoder.clone(), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    let busy = service
        .scheduler()
        .enqueue(PageKey::new(doc, 1, 1.0), RenderPriority::Current);
    let queued = service
        .scheduler()
        .enqueue(PageKey::new(doc, 2, 1.0), RenderPriority::Preload);

    service.invalidate_document(doc);
    assert_eq!(queued.wait().await.map(|_| ()), Err(RenderError::Cancelled));

    decoder.release();
    busy.wait().await.expect("in-flight page");
    assert_eq!(decoder.calls(), vec![1]);
    assert_eq!(service.scheduler().stats().jobs_cancelled, 1);
}

#[tokio::test]
async fn bad_requests_fail_without_rendering() {
    let decoder = Arc::new(FakeDecoder::new(3, TWO_MB_PAGE));
    let service = service_with(decoder.clone(), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    assert_eq!(
        service.get_rendered_page(doc, 4, 1.0).await.map(|_| ()),
        Err(RenderError::OutOfRange { page: 4, page_count: 3 })
    );
    assert_eq!(
        service.get_rendered_page(doc, 0, 1.0).await.map(|_| ()),
        Err(RenderError::OutOfRange { page: 0, page_count: 3 })
    );
    assert!(matches!(
        service.get_rendered_page(doc, 1, -2.0).await,
        Err(RenderError::InvalidScale(_))
    ));
    assert_eq!(
        service.get_rendered_page(doc + 1, 1, 1.0).await.map(|_| ()),
        Err(RenderError::UnknownDocument(doc + 1))
    );

    assert!(decoder.calls().is_empty());
    assert_eq!(service.scheduler().stats().jobs_submitted, 0);
}

#[tokio::test]
async fn closed_document_is_forgotten() {
    let decoder = Arc::new(FakeDecoder::new(3, TWO_MB_PAGE));
    let service = service_with(decoder, ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    service.get_rendered_page(doc, 1, 1.0).await.expect("render");
    assert!(service.close_document(doc));
    assert!(!service.close_document(doc));

    assert_eq!(service.metrics().entry_count, 0);
    assert_eq!(
        service.get_rendered_page(doc, 1, 1.0).await.map(|_| ()),
        Err(RenderError::UnknownDocument(doc))
    );
}

#[tokio::test]
async fn preloads_run_nearest_first_and_skip_cached_pages() {
    let decoder = Arc::new(FakeDecoder::gated(20, TWO_MB_PAGE));
    let config = EngineConfig::default()
        .with_preload_radius(1)
        .with_max_concurrent_renders(1);
    let service = service_with(decoder.clone(), config);
    let doc = service.open_document(Vec::new()).expect("open").id();

    assert_eq!(service.preload_around(doc, 5, 1.0, ViewMode::Double), Ok(4));
    decoder.release();
    wait_until(|| service.scheduler().stats().jobs_completed == 4).await;
    assert_eq!(decoder.calls(), vec![7, 8, 3, 4]);

    // Page 4 is cached now, so only page 6 is queued
    assert_eq!(service.preload_around(doc, 5, 1.0, ViewMode::Single), Ok(1));
    wait_until(|| service.scheduler().stats().jobs_completed == 5).await;
    assert_eq!(decoder.calls(), vec![7, 8, 3, 4, 6]);

    // Preloading never counts as a cache lookup
    assert_eq!(service.metrics().hits + service.metrics().misses, 0);
}

#[tokio::test]
async fn preload_around_rejects_unknown_document() {
    let service = service_with(Arc::new(FakeDecoder::new(3, TWO_MB_PAGE)), ten_mb_config());

    assert_eq!(
        service.preload_around(42, 1, 1.0, ViewMode::Single),
        Err(RenderError::UnknownDocument(42))
    );
}

#[tokio::test]
async fn shrinking_budget_evicts_immediately() {
    let decoder = Arc::new(FakeDecoder::new(6, TWO_MB_PAGE));
    let service = service_with(decoder, ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    for page in 1..=4 {
        service.get_rendered_page(doc, page, 1.0).await.expect("render");
    }
    service.set_memory_budget(4 * MB);

    let metrics = service.metrics();
    assert_eq!(metrics.budget_bytes, 4 * MB);
    assert_eq!(metrics.current_bytes, 4 * MB);
    assert!(service.cache().contains(&PageKey::new(doc, 4, 1.0)));
    assert!(!service.cache().contains(&PageKey::new(doc, 1, 1.0)));
}

#[tokio::test]
async fn metrics_serialize_to_json() {
    let service = service_with(Arc::new(FakeDecoder::new(2, TWO_MB_PAGE)), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();
    service.get_rendered_page(doc, 1, 0.5).await.expect("render");

    let value = serde_json::to_value(service.metrics()).expect("serialize");
    assert_eq!(value["budget_bytes"], 10 * MB);
    assert_eq!(value["entry_count"], 1);
    assert_eq!(value["queued_jobs"], 0);
    assert!(value["avg_render_ms"].is_number());
    assert!(value["hit_rate"].is_number());
}

#[tokio::test]
async fn oversized_pages_show_up_in_metrics() {
    let service = service_with(
        Arc::new(FakeDecoder::new(2, TWO_MB_PAGE)),
        EngineConfig::default().with_memory_budget_mb(1),
    );
    let doc = service.open_document(Vec::new()).expect("open").id();

    service.get_rendered_page(doc, 1, 1.0).await.expect("render");
    service.get_rendered_page(doc, 2, 1.0).await.expect("render");

    let metrics = service.metrics();
    assert_eq!(metrics.oversized_inserts, 2);
    assert_eq!(metrics.entry_count, 1);
    assert_eq!(metrics.current_bytes, 2 * MB);

    let value = serde_json::to_value(metrics).expect("serialize");
    assert_eq!(value["oversized_inserts"], 2);
}

#[tokio::test]
async fn large_scales_render_at_full_size() {
    let thin = PageSize {
        width_pt: 1.0,
        height_pt: 0.0001,
    };
    let service = service_with(Arc::new(FakeDecoder::new(1, thin)), ten_mb_config());
    let doc = service.open_document(Vec::new()).expect("open").id();

    let page = service.get_rendered_page(doc, 1, 5000.0).await.expect("render");
    assert_eq!((page.width, page.height), (5000, 1));
    assert_eq!(page.key, PageKey::new(doc, 1, 5000.0));
    assert_ne!(page.key, PageKey::new(doc, 1, 4500.0));

    assert!(matches!(
        service.get_rendered_page(doc, 1, 1e20).await,
        Err(RenderError::InvalidScale(_))
    ));
}

#[tokio::test]
async fn renders_real_pdf_with_default_decoder() {
    let service = RenderingService::new(Arc::new(LopdfDecoder::new()), EngineConfig::constrained());
    let doc = service
        .open_document(pdf_with_pages(&[(612, 792), (200, 100)]))
        .expect("open");

    assert_eq!(doc.page_count(), 2);
    let page = service
        .get_rendered_page(doc.id(), 2, 1.5)
        .await
        .expect("render");
    assert_eq!((page.width, page.height), (300, 150));
    assert_eq!(page.pixels.len(), 300 * 150 * 4);
}

#[tokio::test]
async fn garbage_bytes_fail_to_open() {
    let service = RenderingService::new(Arc::new(LopdfDecoder::new()), EngineConfig::default());

    assert!(matches!(
        service.open_document(b"not a pdf".to_vec()),
        Err(RenderError::Decode(_))
    ));
}
