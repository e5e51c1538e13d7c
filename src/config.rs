use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub resampler: ResamplerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Fingerprints buffered before the worker blocks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Sinc resampler quality. Longer filters cost more and alias less.
#[derive(Debug, Clone, Deserialize)]
pub struct ResamplerConfig {
    #[serde(default = "default_sinc_len")]
    pub sinc_len: usize,
    #[serde(default = "default_f_cutoff")]
    pub f_cutoff: f32,
    #[serde(default = "default_oversampling_factor")]
    pub oversampling_factor: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            sinc_len: default_sinc_len(),
            f_cutoff: default_f_cutoff(),
            oversampling_factor: default_oversampling_factor(),
            chunk_size: default_chunk_size(),
        }
    }
}

pub fn default_queue_capacity() -> usize { 64 }
fn default_sinc_len() -> usize { 128 }
fn default_f_cutoff() -> f32 { 0.95 }
fn default_oversampling_factor() -> usize { 64 }
fn default_chunk_size() -> usize { 1024 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Explicit path first, then `./sonoprint.toml`, then the per-user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("sonoprint.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonoprint").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonoprint").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.pipeline.queue_capacity, 64);
        assert_eq!(cfg.resampler.sinc_len, 128);
        assert_eq!(cfg.resampler.chunk_size, 1024);
        assert_eq!(cfg.output.format, OutputFormat::Json);
    }

    #[test]
    fn partial_sections_fill_in() {
        let cfg: Config = toml::from_str(
            "[pipeline]\nqueue_capacity = 8\n\n[resampler]\nsinc_len = 32\n\n[output]\nformat = \"text\"\n",
        )
        .unwrap();
        assert_eq!(cfg.pipeline.queue_capacity, 8);
        assert_eq!(cfg.resampler.sinc_len, 32);
        assert_eq!(cfg.resampler.oversampling_factor, 64);
        assert_eq!(cfg.output.format, OutputFormat::Text);
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let err = load_config(Path::new("/nonexistent/sonoprint.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("custom.toml");
        assert_eq!(find_config(Some(p)), Some(PathBuf::from("custom.toml")));
    }
}
