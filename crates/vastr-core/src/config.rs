//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, so
//! `APP_SEARCH__DEFAULT_LIMIT=10` sets `search.default_limit`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`Config::load`] but looks for the toml files under `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        settings.validate()?;
        if matches!(env, "prod" | "production") && settings.image.store_files.is_empty() {
            tracing::warn!("no image store files configured; image search will stay unavailable");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub search: SearchSettings,
    pub image: ImageSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let s = &self.search;
        for (name, w) in [("search.bm25_weight", s.bm25_weight), ("search.cosine_weight", s.cosine_weight)] {
            if !(0.0..=1.0).contains(&w) {
                return Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {w}")));
            }
        }
        if s.default_limit == 0 || s.default_limit > s.max_limit {
            return Err(Error::InvalidConfig(format!(
                "search.default_limit must be in 1..={}, got {}",
                s.max_limit, s.default_limit
            )));
        }
        if s.candidate_k == 0 {
            return Err(Error::InvalidConfig("search.candidate_k must be positive".into()));
        }
        if self.image.max_side == 0 {
            return Err(Error::InvalidConfig("image.max_side must be positive".into()));
        }
        Ok(())
    }

    /// Makes the catalog, model and store file paths absolute against `base`,
    /// normally the directory the config was loaded from.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &str| resolve_with_base(base, p).to_string_lossy().into_owned();
        self.catalog.path = resolve(&self.catalog.path);
        self.image.model_dir = self.image.model_dir.as_deref().map(resolve);
        self.image.store_files = self.image.store_files.iter().map(|p| resolve(p)).collect();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub path: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self { path: "data/products.jsonl".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Candidates pulled from each index before fusion.
    pub candidate_k: usize,
    pub bm25_weight: f32,
    pub cosine_weight: f32,
    pub expand_queries: bool,
    pub max_features: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            candidate_k: 100,
            bm25_weight: 0.5,
            cosine_weight: 0.5,
            expand_queries: true,
            max_features: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub model_dir: Option<String>,
    pub store_files: Vec<String>,
    pub default_limit: usize,
    pub fetch_timeout_secs: u64,
    pub max_side: u32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            store_files: vec![
                "image_search_data_mergeduse.npz".to_string(),
                "image_search_data_first1326.npz".to_string(),
            ],
            default_limit: 24,
            fetch_timeout_secs: 10,
            max_side: 800,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
