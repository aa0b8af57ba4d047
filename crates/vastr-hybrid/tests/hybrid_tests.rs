use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use vastr_core::catalog::{InMemoryCatalog, JsonCatalog};
use vastr_core::config::Settings;
use vastr_core::types::{Product, SearchFilters};
use vastr_embed::{FakeImageEmbedder, ImageEmbedder, ImageExtractor, ImageInput, DEFAULT_EMBEDDING_DIM};
use vastr_hybrid::{
    hybrid_search, Capability, SearchContext, SearchRequest, SearchService, SearchStatus, ServiceError,
};
use vastr_vector::{ImageIndex, VectorStore};

fn product(id: &str, title: &str, brand: &str, brand_id: &str, ptype: &str, price: f64) -> Product {
    let mut p = Product::new(id, title);
    p.brand_name = brand.into();
    p.brand_id = brand_id.into();
    p.product_type = ptype.into();
    p.price_min = price;
    p.price_max = price;
    p.available = true;
    p
}

fn corpus() -> Vec<Product> {
    vec![
        product("1", "Embroidered Lawn Suit", "Nishat Linen", "nishat", "Suit", 4000.0),
        product("2", "Casual Cotton Kurta", "Ethnic", "ethnic", "Kurta", 2000.0),
        product("3", "Formal Silk Dress", "Maria B", "mariab", "Dress", 9000.0),
    ]
}

fn service() -> SearchService {
    SearchService::new(Arc::new(InMemoryCatalog::new(corpus())), Settings::default())
}

fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 48, Rgb(color)));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
    buf.into_inner()
}

fn ids(resp: &[vastr_core::types::ScoredProduct]) -> Vec<&str> {
    resp.iter().map(|p| p.product.product_id.as_str()).collect()
}

#[test]
fn embroidered_lawn_ranks_the_lawn_suit_first() {
    let resp = service().search(&SearchRequest::new("embroidered lawn")).expect("search");
    assert_eq!(resp.status, SearchStatus::Found);
    assert_eq!(resp.products[0].product.product_id, "1");
    assert!(resp.products[0].search_score > 0.0);
    for p in &resp.products[1..] { assert_eq!(p.search_score, 0.0); }
    assert_eq!(resp.insights.brands.get("Nishat Linen"), Some(&1));
}

#[test]
fn price_filter_drops_the_expensive_dress() {
    let filters = SearchFilters { max_price: Some(5000.0), ..Default::default() };
    let resp = service().search(&SearchRequest::new("dress").filters(filters.clone())).expect("search");
    assert!(!ids(&resp.products).contains(&"3"));
    assert_eq!(resp.filters_applied, filters);
    if resp.products.is_empty() { assert_eq!(resp.status, SearchStatus::NoMatches); }
}

#[test]
fn fused_scores_stay_within_weight_sum_and_components_peak_at_one() -> anyhow::Result<()> {
    let settings = Settings::default();
    let ctx = SearchContext::from_products(corpus(), &settings.search)?;
    for (wb, wc) in [(0.5, 0.5), (1.0, 0.0), (0.2, 0.9), (1.0, 1.0)] {
        let ranking = hybrid_search(&ctx, "cotton silk dress kurta", 100, wb, wc, &SearchFilters::default())?;
        assert!(!ranking.products.is_empty());
        for p in &ranking.products {
            assert!(p.search_score >= 0.0 && p.search_score <= wb + wc + 1e-6, "{} outside [0, {}]", p.search_score, wb + wc);
            assert!((0.0..=1.0).contains(&p.bm25_score));
            assert!((0.0..=1.0).contains(&p.cosine_score));
        }
        let max_bm25 = ranking.products.iter().map(|p| p.bm25_score).fold(0f32, f32::max);
        let max_cosine = ranking.products.iter().map(|p| p.cosine_score).fold(0f32, f32::max);
        assert_eq!(max_bm25, 1.0);
        assert_eq!(max_cosine, 1.0);
        assert!(ranking.products.windows(2).all(|w| w[0].search_score >= w[1].search_score));
    }
    Ok(())
}

#[test]
fn filtered_results_are_a_subset_of_unfiltered() {
    let svc = service();
    let all = svc.search(&SearchRequest::new("cotton silk lawn")).expect("search");
    let filters = SearchFilters { brand_id: Some("ethnic".into()), available_only: true, ..Default::default() };
    let some = svc.search(&SearchRequest::new("cotton silk lawn").filters(filters)).expect("search");
    assert!(some.products.len() <= all.products.len());
    for p in &some.products {
        let same = all.products.iter().find(|q| q.product.product_id == p.product.product_id).expect("present unfiltered");
        assert_eq!(same.search_score, p.search_score);
        assert_eq!(p.product.brand_id, "ethnic");
    }
}

#[test]
fn repeated_queries_are_identical() {
    let svc = service();
    let req = SearchRequest::new("formal silk").weights(0.7, 0.3);
    let a = svc.search(&req).expect("search");
    let b = svc.search(&req).expect("search");
    assert_eq!(a.products, b.products);
    assert_eq!(a.expanded_query, b.expanded_query);
}

#[test]
fn expansion_is_reported_and_can_be_disabled() {
    let resp = service().search(&SearchRequest::new("red dress")).expect("search");
    assert!(resp.expanded_query.starts_with("red dress"));
    assert!(resp.expanded_query.contains("maroon"));

    let mut settings = Settings::default();
    settings.search.expand_queries = false;
    let svc = SearchService::new(Arc::new(InMemoryCatalog::new(corpus())), settings);
    let resp = svc.search(&SearchRequest::new("red dress")).expect("search");
    assert_eq!(resp.expanded_query, "red dress");
}

#[test]
fn bad_requests_are_rejected() {
    let svc = service();
    let invalid = |r: Result<vastr_hybrid::SearchResponse, ServiceError>| matches!(r, Err(ServiceError::InvalidInput(_)));
    assert!(invalid(svc.search(&SearchRequest::new("dress").limit(0))));
    assert!(invalid(svc.search(&SearchRequest::new("dress").weights(1.5, 0.5))));
    assert!(invalid(svc.search(&SearchRequest::new("dress").weights(0.5, f32::NAN))));
    let filters = SearchFilters { min_price: Some(5000.0), max_price: Some(100.0), ..Default::default() };
    let err = svc.search(&SearchRequest::new("dress").filters(filters)).unwrap_err();
    assert_eq!(err.status_code(), 400);

    let capped = svc.search(&SearchRequest::new("suit kurta dress").limit(10_000)).expect("capped");
    assert!(capped.products.len() <= svc.settings().search.max_limit);

    let blank = svc.search(&SearchRequest::new("   ")).expect("blank");
    assert_eq!(blank.status, SearchStatus::NoMatches);
    assert!(blank.products.is_empty());
}

#[test]
fn empty_corpus_reports_no_products_indexed() {
    let svc = SearchService::new(Arc::new(InMemoryCatalog::default()), Settings::default());
    let resp = svc.search(&SearchRequest::new("dress")).expect("search");
    assert_eq!(resp.status, SearchStatus::NoProductsIndexed);
    assert_eq!(resp.total_results, 0);
    assert!(resp.insights.price_range.is_none());
    assert!(svc.stats().text_ready);
    assert_eq!(svc.stats().products_indexed, 0);
}

#[test]
fn missing_catalog_leaves_text_search_unavailable() {
    let svc = SearchService::new(Arc::new(JsonCatalog::new("/nonexistent/vastr/catalog.jsonl")), Settings::default());
    let err = svc.search(&SearchRequest::new("dress")).unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable { capability: Capability::TextSearch, .. }));
    assert_eq!(err.status_code(), 503);
    let stats = svc.stats();
    assert!(!stats.text_ready);
    assert!(stats.text_unavailable_reason.is_some());
}

#[test]
fn image_search_before_load_is_not_ready() {
    let svc = service();
    let err = svc.image_search(&ImageInput::Bytes(png_bytes([1, 2, 3])), None).unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable { capability: Capability::ImageSearch, .. }));
    assert_eq!(err.status_code(), 503);

    // none of the configured store files exist in the test working dir
    let mut settings = Settings::default();
    settings.image.store_files = vec!["/nonexistent/vastr/a.npz".into()];
    let svc = SearchService::new(Arc::new(InMemoryCatalog::new(corpus())), settings);
    let err = svc.load_image(Arc::new(FakeImageEmbedder::new(DEFAULT_EMBEDDING_DIM))).unwrap_err();
    assert_eq!(err.status_code(), 503);
    assert!(!svc.stats().image_ready);
}

fn image_fixture() -> (ImageIndex, Arc<dyn ImageEmbedder>) {
    let embedder: Arc<dyn ImageEmbedder> = Arc::new(FakeImageEmbedder::new(DEFAULT_EMBEDDING_DIM));
    let extractor = ImageExtractor::new(Arc::clone(&embedder), &Settings::default().image);
    let rows = vec![
        extractor.embed_bytes(&png_bytes([200, 30, 90])).expect("embed"),
        extractor.embed_bytes(&png_bytes([10, 220, 40])).expect("embed"),
        extractor.embed_bytes(&png_bytes([90, 90, 250])).expect("embed"),
    ];
    let store = VectorStore::from_rows(vec!["1".into(), "2".into(), "ghost".into()], rows).expect("store");
    (ImageIndex::new(store), embedder)
}

#[test]
fn image_search_finds_the_exact_image_first() {
    let svc = service();
    let (index, embedder) = image_fixture();
    svc.attach_image(index, embedder).expect("attach");

    let resp = svc.image_search(&ImageInput::Bytes(png_bytes([200, 30, 90])), Some(3)).expect("image search");
    assert_eq!(resp.total_results, 3);
    assert_eq!(resp.results[0].product_id, "1");
    assert!((resp.results[0].similarity - 1.0).abs() < 1e-4);
    assert!(resp.results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    let card = resp.results[0].product.as_ref().expect("card");
    assert_eq!(card.name, "Nishat Linen - Embroidered Lawn Suit");
    assert_eq!(card.price, 4000);

    let ghost = resp.results.iter().find(|h| h.product_id == "ghost").expect("ghost hit");
    assert!(ghost.product.is_none());

    let err = svc.image_search(&ImageInput::Bytes(b"not an image".to_vec()), None).unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert_eq!(svc.stats().image_rows, 3);
}

#[test]
fn failed_image_download_is_an_image_processing_error() {
    use std::io::{Read, Write};
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        }
    });

    let svc = service();
    let (index, embedder) = image_fixture();
    svc.attach_image(index, embedder).expect("attach");
    let err = svc.image_search(&ImageInput::Url(format!("http://{addr}/missing.jpg")), None).unwrap_err();
    assert!(matches!(err, ServiceError::ImageProcessing(ref reason) if reason.contains("404")), "got {err:?}");
    assert_eq!(err.status_code(), 500);
}

#[test]
fn store_files_resolve_against_the_config_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (index, embedder) = image_fixture();
    let ids: Vec<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
    let rows = ids.iter().map(|id| index.vector_for(id).expect("row").to_vec()).collect();
    VectorStore::from_rows(ids, rows).expect("store").write(&dir.path().join("stores/a.npz")).expect("write");

    let mut settings = Settings::default();
    settings.image.store_files = vec!["stores/a.npz".into()];
    settings.resolve_paths(dir.path());
    let svc = SearchService::new(Arc::new(InMemoryCatalog::new(corpus())), settings);
    let report = svc.load_image(embedder).expect("stores load");
    assert_eq!(report.loaded_files(), 1);
    assert_eq!(svc.stats().image_rows, 2);
}

#[test]
fn attach_rejects_dimension_mismatch() {
    let svc = service();
    let (index, _) = image_fixture();
    let err = svc.attach_image(index, Arc::new(FakeImageEmbedder::new(16))).unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable { capability: Capability::ImageSearch, .. }));
}

#[tokio::test]
async fn image_search_runs_on_the_blocking_pool() {
    let svc = Arc::new(service());
    let (index, embedder) = image_fixture();
    svc.attach_image(index, embedder).expect("attach");
    let resp = svc.image_search_async(ImageInput::Bytes(png_bytes([10, 220, 40])), Some(1)).await.expect("async search");
    assert_eq!(resp.results.len(), 1);
    assert_eq!(resp.results[0].product_id, "2");
}

#[test]
fn suggestions_match_titles_and_types() {
    let svc = service();
    let resp = svc.suggest("SU", Some(2)).expect("suggest");
    assert_eq!(resp.suggestions, vec!["Casual Cotton Kurta".to_string(), "Embroidered Lawn Suit".to_string()]);

    let resp = svc.suggest("suit", None).expect("suggest");
    assert_eq!(
        resp.suggestions,
        vec!["Embroidered Lawn Suit".to_string(), "Nishat Linen Embroidered Lawn Suit".to_string(), "Suit".to_string()]
    );

    assert!(matches!(svc.suggest("s", None), Err(ServiceError::InvalidInput(_))));
    assert!(svc.suggest("velvet", None).expect("suggest").suggestions.is_empty());
}

#[test]
fn similar_excludes_the_target() {
    let mut products = corpus();
    products.push(product("4", "Embroidered Chiffon Suit", "Sana Safinaz", "sana", "Suit", 7000.0));
    let svc = SearchService::new(Arc::new(InMemoryCatalog::new(products)), Settings::default());

    let resp = svc.similar("1", Some(5)).expect("similar");
    assert_eq!(resp.target_product_title, "Embroidered Lawn Suit");
    assert!(!ids(&resp.similar_products).contains(&"1"));
    assert_eq!(resp.similar_products[0].product.product_id, "4");

    let err = svc.similar("missing", None).unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn reload_swaps_in_new_snapshot_and_keeps_old_on_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("products.jsonl");
    std::fs::write(&path, "{\"product_id\": \"1\", \"title\": \"Embroidered Lawn Suit\"}\n")?;
    let svc = SearchService::new(Arc::new(JsonCatalog::new(&path)), Settings::default());
    assert_eq!(svc.stats().products_indexed, 1);

    std::fs::write(
        &path,
        "{\"product_id\": \"1\", \"title\": \"Embroidered Lawn Suit\"}\n{\"product_id\": \"2\", \"title\": \"Formal Silk Dress\"}\nnot json\n",
    )?;
    let report = svc.reload()?;
    assert_eq!(report.loaded, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(svc.stats().products_indexed, 2);
    assert_eq!(svc.search(&SearchRequest::new("silk"))?.products[0].product.product_id, "2");

    std::fs::remove_file(&path)?;
    assert!(svc.reload().is_err());
    assert_eq!(svc.stats().products_indexed, 2);
    Ok(())
}
