use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ensemble::ModelRole;
use crate::learning::LearningSettings;
use crate::pipeline::PipelineSettings;
use crate::store::StoreSettings;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub model_roles: Vec<String>,
    #[serde(default = "default_min_quorum")]
    pub min_quorum: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl: String,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: "5s".to_string(),
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    pub max_age: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_age: "60s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearningConfig {
    pub threshold: f64,
    pub window: usize,
    pub weight_floor: f64,
    pub sweep_interval: String,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            window: 50,
            weight_floor: 0.1,
            sweep_interval: "5m".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    pub lookback: usize,
    pub min_samples: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "data/outcomes.sqlite".to_string(),
            lookback: 500,
            min_samples: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: default_log_file(),
        }
    }
}

fn default_min_quorum() -> usize {
    2
}

fn default_history_capacity() -> usize {
    100
}

fn default_log_file() -> String {
    "adaptive-ensemble.log".to_string()
}

/// Parse a duration string (e.g. "250ms", "5s", "5m", "1h", "1d") into milliseconds.
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .with_context(|| format!("invalid duration '{}': missing unit suffix", s))?;
    let (num_str, suffix) = s.split_at(split_at);
    if num_str.is_empty() {
        bail!("invalid duration '{}': expected format like '5s'", s);
    }
    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid duration '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid duration '{}': quantity must be > 0", s);
    }

    let unit_ms = match suffix {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => bail!(
            "invalid duration '{}': unsupported suffix '{}', expected one of ms/s/m/h/d",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid duration '{}': value is too large", s))
}

impl EngineConfig {
    /// Configured roles in declaration order, duplicates dropped.
    pub fn roles(&self) -> Result<Vec<ModelRole>> {
        let mut out: Vec<ModelRole> = Vec::new();
        for raw in &self.model_roles {
            let role: ModelRole = raw
                .parse()
                .with_context(|| format!("engine.model_roles contains unknown role '{}'", raw))?;
            if !out.contains(&role) {
                out.push(role);
            }
        }
        if out.is_empty() {
            bail!("engine.model_roles must name at least one role");
        }
        Ok(out)
    }
}

impl Config {
    /// Load from `ENGINE_CONFIG_PATH` (or `config/default.toml`), after reading `.env`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var("ENGINE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.engine.roles()?;
        parse_duration_ms(&self.cache.ttl).context("cache.ttl is invalid")?;
        parse_duration_ms(&self.quality.max_age).context("quality.max_age is invalid")?;
        parse_duration_ms(&self.learning.sweep_interval)
            .context("learning.sweep_interval is invalid")?;
        if !(0.0..=1.0).contains(&self.learning.threshold) {
            bail!("learning.threshold must be within [0, 1]");
        }
        if !(0.0..1.0).contains(&self.learning.weight_floor) {
            bail!("learning.weight_floor must be within [0, 1)");
        }
        if self.learning.window == 0 {
            bail!("learning.window must be > 0");
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            roles: self.engine.roles()?,
            min_quorum: self.engine.min_quorum.max(1),
            cache_ttl: Duration::from_millis(parse_duration_ms(&self.cache.ttl)?),
            cache_max_entries: self.cache.max_entries.max(1),
            history_capacity: self.engine.history_capacity.max(1),
            max_age_ms: parse_duration_ms(&self.quality.max_age)?,
        })
    }

    pub fn learning_settings(&self) -> LearningSettings {
        LearningSettings {
            threshold: self.learning.threshold,
            window: self.learning.window,
            weight_floor: self.learning.weight_floor,
        }
    }

    pub fn sweep_interval(&self) -> Result<Duration> {
        Ok(Duration::from_millis(parse_duration_ms(
            &self.learning.sweep_interval,
        )?))
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            path: PathBuf::from(&self.store.path),
            lookback: self.store.lookback.max(1),
            min_samples: self.store.min_samples,
        }
    }
}
