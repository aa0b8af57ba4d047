use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use vastr_core::config::ImageSettings;
use vastr_embed::{get_default_embedder, ExtractionError, ImageExtractor, ImageInput, DEFAULT_EMBEDDING_DIM};

fn png_bytes(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
    buf.into_inner()
}

fn fake_extractor() -> ImageExtractor {
    // Force fake embedder to avoid loading the vit weights
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");
    let settings = ImageSettings::default();
    let embedder = get_default_embedder(&settings).expect("embedder");
    ImageExtractor::new(embedder, &settings)
}

#[test]
fn fake_embedder_is_unit_length_and_deterministic() {
    let extractor = fake_extractor();
    assert_eq!(extractor.dim(), DEFAULT_EMBEDDING_DIM);
    let bytes = png_bytes(64, 48, [200, 30, 90]);
    let v1 = extractor.extract(&ImageInput::Bytes(bytes.clone())).expect("embed");
    let v2 = extractor.extract(&ImageInput::Bytes(bytes)).expect("embed");
    assert_eq!(v1.len(), DEFAULT_EMBEDDING_DIM);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(v1, v2);

    let other = extractor.extract(&ImageInput::Bytes(png_bytes(64, 48, [10, 220, 40]))).expect("embed");
    assert_ne!(v1, other);
}

#[test]
fn base64_and_raw_bytes_agree() {
    use base64::Engine;
    let extractor = fake_extractor();
    let bytes = png_bytes(900, 300, [12, 34, 56]);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let from_b64 = extractor.extract(&ImageInput::Base64(format!("data:image/png;base64,{encoded}"))).expect("embed");
    let from_bytes = extractor.extract(&ImageInput::Bytes(bytes)).expect("embed");
    assert_eq!(from_b64, from_bytes);
}

#[test]
fn bad_inputs_are_typed_failures() {
    let extractor = fake_extractor();
    assert!(matches!(extractor.extract(&ImageInput::Bytes(b"definitely not a png".to_vec())), Err(ExtractionError::Decode(_))));
    assert!(matches!(extractor.extract(&ImageInput::Bytes(Vec::new())), Err(ExtractionError::EmptyInput)));
    assert!(matches!(extractor.extract(&ImageInput::Base64("!!".into())), Err(ExtractionError::InvalidBase64(_))));
    assert!(matches!(extractor.extract(&ImageInput::Url("not-a-url".into())), Err(ExtractionError::InvalidUrl(_))));
}

#[test]
fn fake_embedder_shared_across_threads() {
    let extractor = Arc::new(fake_extractor());
    let bytes = png_bytes(16, 16, [1, 2, 3]);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (e, b) = (Arc::clone(&extractor), bytes.clone());
            std::thread::spawn(move || e.extract(&ImageInput::Bytes(b)).expect("embed"))
        })
        .collect();
    let results: Vec<Vec<f32>> = handles.into_iter().map(|h| h.join().expect("join")).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn zero_dim_fake_embedder_is_clamped() {
    use vastr_embed::{FakeImageEmbedder, ImageEmbedder};
    let embedder = FakeImageEmbedder::new(0);
    assert_eq!(embedder.dim(), 1);
    let rgb = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
    let v = embedder.embed_rgb(&rgb).expect("embed");
    assert_eq!(v.len(), 1);
    assert!((v[0] - 1.0).abs() < 1e-3);
}
