use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

pub type Number = f32;

/// The projection always targets a plane.
pub const OUTPUT_DIMENSIONS: usize = 2;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "bluesky";
pub const DEFAULT_ATTRIBUTE_KEY: &str = "compound";
pub const DEFAULT_FETCH_LIMIT: usize = 1000;
pub const DEFAULT_NEIGHBORHOOD_SIZE: f64 = 30.0;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;
pub const DEFAULT_EARLY_EXAGGERATION: f64 = 12.0;
pub const DEFAULT_OUTPUT_PATH: &str = "tsne.png";
pub const DEFAULT_IMAGE_WIDTH: u32 = 1000;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 700;
const MIN_IMAGE_SIDE: u32 = 200;

/// What to do when every point carries the same attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatAttributePolicy {
    /// Draw every point in a single neutral color.
    Neutral,
    /// Abort with [`PipelineError::NoVariance`].
    Fail,
}

impl FlatAttributePolicy {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(Self::Neutral),
            "fail" => Ok(Self::Fail),
            other => Err(PipelineError::InvalidConfig(format!(
                "flat_attribute must be 'neutral' or 'fail', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Fail => "fail",
        }
    }
}

/// Raw values as they come out of the config file / environment layer.
#[derive(Default)]
pub struct VecplotConfig {
    pub store_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub collection_name: Option<String>,
    pub vector_name: Option<String>,
    pub attribute_key: Option<String>,
    pub fetch_limit: Option<usize>,
    pub neighborhood_size: Option<f64>,
    pub random_seed: Option<u64>,
    pub max_iterations: Option<usize>,
    pub early_exaggeration: Option<f64>,
    pub learning_rate: Option<f64>,
    pub output_path: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub flat_attribute: Option<String>,
    pub verbose: Option<bool>,
}

fn optional<T: DeserializeOwned>(config: &Config, key: &str) -> std::result::Result<Option<T>, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl VecplotConfig {
    pub fn try_from(config: &Config) -> std::result::Result<Self, ConfigError> {
        Ok(VecplotConfig {
            store_endpoint: optional(config, "store_endpoint")?,
            api_key: optional(config, "api_key")?,
            collection_name: optional(config, "collection_name")?,
            vector_name: optional(config, "vector_name")?,
            attribute_key: optional(config, "attribute_key")?,
            fetch_limit: optional(config, "fetch_limit")?,
            neighborhood_size: optional(config, "neighborhood_size")?,
            random_seed: optional(config, "random_seed")?,
            max_iterations: optional(config, "max_iterations")?,
            early_exaggeration: optional(config, "early_exaggeration")?,
            learning_rate: optional(config, "learning_rate")?,
            output_path: optional(config, "output_path")?,
            image_width: optional(config, "image_width")?,
            image_height: optional(config, "image_height")?,
            flat_attribute: optional(config, "flat_attribute")?,
            verbose: optional(config, "verbose")?,
        })
    }

    /// Reads `vecplot_config.*` from the working directory, then `VECPLOT_*`
    /// environment variables on top of it.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        #[allow(deprecated)]
        {
            config.merge(ConfigFile::with_name("vecplot_config").required(false))?;
            config.merge(Environment::with_prefix("VECPLOT"))?;
        }
        Ok(Self::try_from(&config)?)
    }

    /// Fields set on `other` win.
    pub fn overlay(self, other: VecplotConfig) -> Self {
        VecplotConfig {
            store_endpoint: other.store_endpoint.or(self.store_endpoint),
            api_key: other.api_key.or(self.api_key),
            collection_name: other.collection_name.or(self.collection_name),
            vector_name: other.vector_name.or(self.vector_name),
            attribute_key: other.attribute_key.or(self.attribute_key),
            fetch_limit: other.fetch_limit.or(self.fetch_limit),
            neighborhood_size: other.neighborhood_size.or(self.neighborhood_size),
            random_seed: other.random_seed.or(self.random_seed),
            max_iterations: other.max_iterations.or(self.max_iterations),
            early_exaggeration: other.early_exaggeration.or(self.early_exaggeration),
            learning_rate: other.learning_rate.or(self.learning_rate),
            output_path: other.output_path.or(self.output_path),
            image_width: other.image_width.or(self.image_width),
            image_height: other.image_height.or(self.image_height),
            flat_attribute: other.flat_attribute.or(self.flat_attribute),
            verbose: other.verbose.or(self.verbose),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub store_endpoint: String,
    pub api_key: Option<String>,
    pub collection_name: String,
    pub vector_name: Option<String>,
    pub attribute_key: String,
    pub fetch_limit: usize,
}

#[derive(Debug, Clone)]
pub struct ReducerSettings {
    pub neighborhood_size: f64,
    pub random_seed: u64,
    pub max_iterations: usize,
    pub early_exaggeration: f64,
    pub learning_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub output_path: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    pub flat_attribute: FlatAttributePolicy,
    pub title: String,
    pub attribute_label: String,
}

/// Fully resolved configuration, one section per pipeline stage.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub reducer: ReducerSettings,
    pub render: RenderSettings,
    pub verbose: bool,
}

impl Settings {
    pub fn resolve(raw: VecplotConfig) -> Result<Self> {
        let collection_name = raw
            .collection_name
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        let attribute_key = raw
            .attribute_key
            .unwrap_or_else(|| DEFAULT_ATTRIBUTE_KEY.to_string());

        let store = StoreSettings {
            store_endpoint: raw
                .store_endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: raw.api_key.filter(|k| !k.is_empty()),
            collection_name: collection_name.clone(),
            vector_name: raw.vector_name.filter(|n| !n.is_empty()),
            attribute_key: attribute_key.clone(),
            fetch_limit: raw.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
        };

        let reducer = ReducerSettings {
            neighborhood_size: raw.neighborhood_size.unwrap_or(DEFAULT_NEIGHBORHOOD_SIZE),
            random_seed: raw.random_seed.unwrap_or(DEFAULT_SEED),
            max_iterations: raw.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            early_exaggeration: raw
                .early_exaggeration
                .unwrap_or(DEFAULT_EARLY_EXAGGERATION),
            learning_rate: raw.learning_rate,
        };

        let flat_attribute = match raw.flat_attribute {
            Some(value) => FlatAttributePolicy::parse(&value)?,
            None => FlatAttributePolicy::Neutral,
        };

        let render = RenderSettings {
            output_path: PathBuf::from(
                raw.output_path
                    .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
            ),
            image_width: raw.image_width.unwrap_or(DEFAULT_IMAGE_WIDTH),
            image_height: raw.image_height.unwrap_or(DEFAULT_IMAGE_HEIGHT),
            flat_attribute,
            title: format!("2D t-SNE Visualization of {}", collection_name),
            attribute_label: format!("{} value (normalized)", attribute_key),
        };

        let settings = Self {
            store,
            reducer,
            render,
            verbose: raw.verbose.unwrap_or(false),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.store.collection_name.trim().is_empty() {
            return invalid("collection_name must not be empty".to_string());
        }
        if self.store.attribute_key.trim().is_empty() {
            return invalid("attribute_key must not be empty".to_string());
        }
        let perplexity = self.reducer.neighborhood_size;
        if !perplexity.is_finite() || perplexity <= 0.0 {
            return invalid(format!("neighborhood_size must be positive, got {}", perplexity));
        }
        if self.reducer.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".to_string());
        }
        let exaggeration = self.reducer.early_exaggeration;
        if !exaggeration.is_finite() || exaggeration < 1.0 {
            return invalid(format!("early_exaggeration must be >= 1, got {}", exaggeration));
        }
        if let Some(rate) = self.reducer.learning_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return invalid(format!("learning_rate must be positive, got {}", rate));
            }
        }
        if self.render.image_width < MIN_IMAGE_SIDE || self.render.image_height < MIN_IMAGE_SIDE {
            return invalid(format!(
                "image must be at least {}x{}, got {}x{}",
                MIN_IMAGE_SIDE, MIN_IMAGE_SIDE, self.render.image_width, self.render.image_height
            ));
        }
        Ok(())
    }

    pub fn print_config(&self) {
        println!("store_endpoint={}", self.store.store_endpoint);
        println!("api_key={}", if self.store.api_key.is_some() { "<set>" } else { "<unset>" });
        println!("collection_name={}", self.store.collection_name);
        println!("vector_name={}", self.store.vector_name.as_deref().unwrap_or("<default>"));
        println!("attribute_key={}", self.store.attribute_key);
        println!("fetch_limit={}", self.store.fetch_limit);
        println!("neighborhood_size={}", self.reducer.neighborhood_size);
        println!("random_seed={}", self.reducer.random_seed);
        println!("output_dimensions={}", OUTPUT_DIMENSIONS);
        println!("max_iterations={}", self.reducer.max_iterations);
        println!("early_exaggeration={}", self.reducer.early_exaggeration);
        match self.reducer.learning_rate {
            Some(rate) => println!("learning_rate={}", rate),
            None => println!("learning_rate=auto"),
        }
        println!("output_path={}", self.render.output_path.display());
        println!("image_width={}", self.render.image_width);
        println!("image_height={}", self.render.image_height);
        println!("flat_attribute={}", self.render.flat_attribute.as_str());
        println!("verbose={}", self.verbose);
    }
}
