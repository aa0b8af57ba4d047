use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use image::RgbImage;
use vastr_core::config::{expand_path, ImageSettings};

pub mod device;
pub mod error;
pub mod input;
pub mod pool;
pub mod preprocess;
pub mod vit;

pub use error::ExtractionError;
pub use input::{decode_base64, ImageFetcher, ImageInput};
pub use pool::cls_l2;
pub use vit::{ViTConfig, ViTModel};

/// Width of vit-base embeddings, also used by the fake embedder.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

pub trait ImageEmbedder: Send + Sync {
    fn dim(&self) -> usize;
    /// Unit-length embedding of an already size-bounded RGB image.
    fn embed_rgb(&self, image: &RgbImage) -> Result<Vec<f32>, ExtractionError>;
}

pub struct ViTEmbedder { model: ViTModel, config: ViTConfig, device: Device }

impl ViTEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        tracing::info!(dir = %model_dir.display(), "loading vit encoder");
        let config_path = model_dir.join("config.json");
        let config: ViTConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
            .map_err(|e| anyhow!("Failed to parse {}: {}", config_path.display(), e))?;

        let safetensors_path = model_dir.join("model.safetensors");
        let pickle_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = if safetensors_path.exists() {
            candle_core::safetensors::load(&safetensors_path, &device)?
        } else if pickle_path.exists() {
            candle_core::pickle::read_all(&pickle_path)?.into_iter().collect()
        } else {
            return Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()));
        };
        let prefixed = weights.contains_key("vit.embeddings.cls_token");
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let vb = if prefixed { vb.pp("vit") } else { vb };
        let model = ViTModel::new(&config, vb)?;
        tracing::info!(hidden = config.hidden_size, layers = config.num_hidden_layers, "vit encoder loaded");
        Ok(Self { model, config, device })
    }
}

impl ImageEmbedder for ViTEmbedder {
    fn dim(&self) -> usize { self.config.hidden_size }

    fn embed_rgb(&self, image: &RgbImage) -> Result<Vec<f32>, ExtractionError> {
        let start = Instant::now();
        let size = self.config.image_size;
        let values = preprocess::pixel_values(image, size as u32);
        let pixels = Tensor::from_vec(values, (1, self.config.num_channels, size, size), &self.device)?;
        let hidden = self.model.forward(&pixels)?;
        let embedding = cls_l2(&hidden)?.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "image embedded");
        Ok(embedding)
    }
}

/// Deterministic stand-in for tests: hashes a tiny thumbnail into `dim` buckets.
pub struct FakeImageEmbedder { dim: usize }

impl FakeImageEmbedder {
    /// `dim` is clamped to at least 1.
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }
}

impl ImageEmbedder for FakeImageEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_rgb(&self, image: &RgbImage) -> Result<Vec<f32>, ExtractionError> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let thumb = image::imageops::resize(image, 8, 8, image::imageops::FilterType::Triangle);
        let mut v = vec![0f32; self.dim];
        for (i, pixel) in thumb.pixels().enumerate() {
            for c in 0..3 {
                let mut hasher = XxHash64::with_seed(0);
                (i, c).hash(&mut hasher);
                let idx = (hasher.finish() as usize) % self.dim;
                v[idx] += f32::from(pixel[c]) / 255.0 + 0.01;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + pool::NORM_EPS as f32;
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

/// Turns any [`ImageInput`] into an embedding. Every failure is logged and
/// returned as an [`ExtractionError`].
#[derive(Clone)]
pub struct ImageExtractor {
    embedder: Arc<dyn ImageEmbedder>,
    fetcher: ImageFetcher,
    max_side: u32,
}

impl ImageExtractor {
    pub fn new(embedder: Arc<dyn ImageEmbedder>, settings: &ImageSettings) -> Self {
        Self {
            embedder,
            fetcher: ImageFetcher::new(Duration::from_secs(settings.fetch_timeout_secs)),
            max_side: settings.max_side,
        }
    }

    pub fn dim(&self) -> usize { self.embedder.dim() }

    pub fn extract(&self, input: &ImageInput) -> Result<Vec<f32>, ExtractionError> {
        let result = self.fetcher.resolve(input).and_then(|bytes| self.embed_bytes(&bytes));
        if let Err(e) = &result { tracing::warn!(error = %e, "embedding extraction failed"); }
        result
    }

    pub fn embed_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>, ExtractionError> {
        let decoded = preprocess::decode(bytes)?;
        let rgb = preprocess::bound_size(&decoded, self.max_side);
        self.embedder.embed_rgb(&rgb)
    }
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &ImageSettings) -> Result<Arc<dyn ImageEmbedder>> {
    if use_fake_embeddings() {
        tracing::info!("using fake image embedder");
        return Ok(Arc::new(FakeImageEmbedder::new(DEFAULT_EMBEDDING_DIM)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(ViTEmbedder::load(&model_dir)?))
}

/// Configured dir, then `APP_MODEL_DIR`, `MODEL_DIR`, then the conventional local paths.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(str::to_string)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok())
        .chain(std::env::var("MODEL_DIR").ok())
        .map(expand_path)
        .chain([PathBuf::from("models/vit-base-patch16-224-in21k"), PathBuf::from("../models/vit-base-patch16-224-in21k")]);
    for p in candidates {
        if p.exists() {
            tracing::info!(dir = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate ViT model directory"))
}
