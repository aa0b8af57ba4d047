//! Vision transformer encoder, inference only.
//!
//! Weight names follow the Hugging Face `ViTModel` checkpoints
//! (`embeddings.*`, `encoder.layer.{i}.*`, `layernorm.*`), with or without the
//! `vit.` prefix used by classification checkpoints. The forward pass returns
//! the final layer-normed hidden state `[B, 1 + patches, hidden]`.

use anyhow::Result;
use candle_core::{Module, Tensor, D};
use candle_nn::{conv2d, layer_norm, linear, Conv2d, Conv2dConfig, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;

fn default_hidden_size() -> usize { 768 }
fn default_num_hidden_layers() -> usize { 12 }
fn default_num_attention_heads() -> usize { 12 }
fn default_intermediate_size() -> usize { 3072 }
fn default_layer_norm_eps() -> f64 { 1e-12 }
fn default_image_size() -> usize { crate::preprocess::VIT_IMAGE_SIZE as usize }
fn default_patch_size() -> usize { 16 }
fn default_num_channels() -> usize { 3 }

/// The subset of `config.json` the encoder needs. Defaults are vit-base-patch16-224.
#[derive(Debug, Clone, Deserialize)]
pub struct ViTConfig {
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_num_hidden_layers")]
    pub num_hidden_layers: usize,
    #[serde(default = "default_num_attention_heads")]
    pub num_attention_heads: usize,
    #[serde(default = "default_intermediate_size")]
    pub intermediate_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
}

impl Default for ViTConfig {
    fn default() -> Self {
        Self {
            hidden_size: default_hidden_size(),
            num_hidden_layers: default_num_hidden_layers(),
            num_attention_heads: default_num_attention_heads(),
            intermediate_size: default_intermediate_size(),
            layer_norm_eps: default_layer_norm_eps(),
            image_size: default_image_size(),
            patch_size: default_patch_size(),
            num_channels: default_num_channels(),
        }
    }
}

impl ViTConfig {
    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size;
        side * side
    }
}

struct Embeddings {
    cls_token: Tensor,
    position_embeddings: Tensor,
    projection: Conv2d,
}

impl Embeddings {
    fn new(cfg: &ViTConfig, vb: VarBuilder) -> Result<Self> {
        let h = cfg.hidden_size;
        let cls_token = vb.get((1, 1, h), "cls_token")?;
        let position_embeddings = vb.get((1, cfg.num_patches() + 1, h), "position_embeddings")?;
        let conv_cfg = Conv2dConfig { stride: cfg.patch_size, ..Default::default() };
        let projection = conv2d(cfg.num_channels, h, cfg.patch_size, conv_cfg, vb.pp("patch_embeddings").pp("projection"))?;
        Ok(Self { cls_token, position_embeddings, projection })
    }

    fn forward(&self, pixel_values: &Tensor) -> Result<Tensor> {
        let batch = pixel_values.dim(0)?;
        // [B, H, 14, 14] -> [B, 196, H]
        let patches = self.projection.forward(pixel_values)?.flatten_from(2)?.transpose(1, 2)?;
        let (_, _, h) = patches.dims3()?;
        let cls = self.cls_token.broadcast_as((batch, 1, h))?.contiguous()?;
        let tokens = Tensor::cat(&[&cls, &patches], 1)?;
        Ok(tokens.broadcast_add(&self.position_embeddings)?)
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn new(cfg: &ViTConfig, vb: VarBuilder) -> Result<Self> {
        let h = cfg.hidden_size;
        anyhow::ensure!(h % cfg.num_attention_heads == 0, "hidden size {} not divisible by {} heads", h, cfg.num_attention_heads);
        let attn = vb.pp("attention");
        Ok(Self {
            query: linear(h, h, attn.pp("query"))?,
            key: linear(h, h, attn.pp("key"))?,
            value: linear(h, h, attn.pp("value"))?,
            output: linear(h, h, vb.pp("output").pp("dense"))?,
            num_heads: cfg.num_attention_heads,
            head_dim: h / cfg.num_attention_heads,
        })
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, _) = x.dims3()?;
        Ok(x.reshape((b, t, self.num_heads, self.head_dim))?.transpose(1, 2)?.contiguous()?)
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, h) = x.dims3()?;
        let q = self.split_heads(&self.query.forward(x)?)?;
        let k = self.split_heads(&self.key.forward(x)?)?;
        let v = self.split_heads(&self.value.forward(x)?)?;
        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?)? * scale)?;
        let probs = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let context = probs.matmul(&v)?.transpose(1, 2)?.reshape((b, t, h))?;
        Ok(self.output.forward(&context)?)
    }
}

struct Layer {
    layernorm_before: LayerNorm,
    attention: SelfAttention,
    layernorm_after: LayerNorm,
    intermediate: Linear,
    output: Linear,
}

impl Layer {
    fn new(cfg: &ViTConfig, vb: VarBuilder) -> Result<Self> {
        let h = cfg.hidden_size;
        Ok(Self {
            layernorm_before: layer_norm(h, cfg.layer_norm_eps, vb.pp("layernorm_before"))?,
            attention: SelfAttention::new(cfg, vb.pp("attention"))?,
            layernorm_after: layer_norm(h, cfg.layer_norm_eps, vb.pp("layernorm_after"))?,
            intermediate: linear(h, cfg.intermediate_size, vb.pp("intermediate").pp("dense"))?,
            output: linear(cfg.intermediate_size, h, vb.pp("output").pp("dense"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attended = (self.attention.forward(&self.layernorm_before.forward(x)?)? + x)?;
        let mlp = self.intermediate.forward(&self.layernorm_after.forward(&attended)?)?.gelu_erf()?;
        Ok((self.output.forward(&mlp)? + attended)?)
    }
}

pub struct ViTModel {
    embeddings: Embeddings,
    layers: Vec<Layer>,
    layernorm: LayerNorm,
}

impl ViTModel {
    pub fn new(cfg: &ViTConfig, vb: VarBuilder) -> Result<Self> {
        let embeddings = Embeddings::new(cfg, vb.pp("embeddings"))?;
        let encoder = vb.pp("encoder").pp("layer");
        let layers = (0..cfg.num_hidden_layers).map(|i| Layer::new(cfg, encoder.pp(i))).collect::<Result<Vec<_>>>()?;
        let layernorm = layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("layernorm"))?;
        Ok(Self { embeddings, layers, layernorm })
    }

    /// `pixel_values`: `[B, C, image_size, image_size]`.
    pub fn forward(&self, pixel_values: &Tensor) -> Result<Tensor> {
        let mut hidden = self.embeddings.forward(pixel_values)?;
        for layer in &self.layers { hidden = layer.forward(&hidden)?; }
        Ok(self.layernorm.forward(&hidden)?)
    }
}
