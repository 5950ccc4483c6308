use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::shared::constants::{
    APP_NAME, CONFIG_FILE_NAME, DEFAULT_ALIGNED_PATH, DEFAULT_CONFIDENCE, DEFAULT_ERODE_AMOUNT,
    DEFAULT_FILTERED_FILES, DEFAULT_FRAME_SKIP, DEFAULT_IMG_THRESH, DEFAULT_OUT_EXTENSION,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} exists and is not a directory")]
    NotADirectory(PathBuf),
}

/// Which command section of a config file applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Align,
    Framedrop,
}

/// One layer of settings. Every key is optional; later layers win.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigLayer {
    pub img_thresh: Option<f64>,
    pub predictor_path: Option<PathBuf>,
    pub landmarks_file: Option<PathBuf>,
    pub input_glob: Option<String>,
    pub aligned_path: Option<PathBuf>,
    pub out_extension: Option<String>,
    pub frame_skip: Option<usize>,
    pub erode_amount: Option<usize>,
    pub ref_color: Option<[f64; 3]>,
    pub filtered_files: Option<PathBuf>,
    pub workers: Option<usize>,
    pub confidence: Option<f64>,
}

macro_rules! overlay_fields {
    ($dst:ident, $src:ident, $($field:ident),+) => {
        $(if $src.$field.is_some() { $dst.$field = $src.$field; })+
    };
}

impl ConfigLayer {
    /// Overwrite every key that `other` sets.
    pub fn overlay(&mut self, other: ConfigLayer) {
        overlay_fields!(
            self,
            other,
            img_thresh,
            predictor_path,
            landmarks_file,
            input_glob,
            aligned_path,
            out_extension,
            frame_skip,
            erode_amount,
            ref_color,
            filtered_files,
            workers,
            confidence
        );
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    global: ConfigLayer,
    #[serde(default)]
    align: ConfigLayer,
    #[serde(default)]
    framedrop: ConfigLayer,
}

/// Candidate config files in the order they are read: the user config
/// directory, the system-wide config directory, then `explicit` (the
/// `--config` path).
pub fn config_paths(explicit: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for dir in dirs::config_dir().into_iter().chain(site_config_dir()) {
        paths.push(dir.join(APP_NAME).join(CONFIG_FILE_NAME));
    }
    paths.push(explicit.to_path_buf());
    paths
}

/// System-wide config directory shared by all users.
#[cfg(target_os = "linux")]
fn site_config_dir() -> Option<PathBuf> {
    Some(first_xdg_dir(std::env::var_os("XDG_CONFIG_DIRS")))
}

#[cfg(target_os = "macos")]
fn site_config_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/Library/Application Support"))
}

#[cfg(windows)]
fn site_config_dir() -> Option<PathBuf> {
    std::env::var_os("ProgramData").map(PathBuf::from)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn site_config_dir() -> Option<PathBuf> {
    None
}

/// First absolute entry of an `XDG_CONFIG_DIRS` value, or `/etc/xdg`.
#[cfg(target_os = "linux")]
fn first_xdg_dir(value: Option<std::ffi::OsString>) -> PathBuf {
    value
        .as_ref()
        .and_then(|v| std::env::split_paths(v).find(|p| p.is_absolute()))
        .unwrap_or_else(|| PathBuf::from("/etc/xdg"))
}

/// Merge the `global` and `command` sections of every file in `paths`.
///
/// Missing files are skipped with a warning; files that exist but cannot be
/// read or parsed are errors.
pub fn load_layers(paths: &[PathBuf], command: Command) -> Result<ConfigLayer, ConfigError> {
    let mut merged = ConfigLayer::default();
    for path in paths {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Could not open config file {}", path.display());
                continue;
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };
        let file: ConfigFile =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        log::info!("Read config file {}", path.display());

        merged.overlay(file.global);
        merged.overlay(match command {
            Command::Align => file.align,
            Command::Framedrop => file.framedrop,
        });
    }
    Ok(merged)
}

/// Where landmarks come from.
#[derive(Debug, Clone, PartialEq)]
pub enum LandmarkSource {
    /// ONNX face model; `None` resolves the default model through the cache.
    Model {
        path: Option<PathBuf>,
        confidence: f64,
    },
    /// Precomputed landmarks replayed from a JSON file.
    File(PathBuf),
}

impl LandmarkSource {
    fn from_layer(layer: &ConfigLayer) -> Result<Self, ConfigError> {
        if let Some(path) = &layer.landmarks_file {
            return Ok(Self::File(path.clone()));
        }
        let confidence = layer.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(confidence > 0.0 && confidence <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "confidence",
                reason: format!("{confidence} is outside (0, 1]"),
            });
        }
        Ok(Self::Model {
            path: layer.predictor_path.clone(),
            confidence,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignSettings {
    pub input_glob: String,
    pub aligned_path: PathBuf,
    pub img_thresh: f64,
    pub out_extension: String,
    pub ref_color: Option<[f64; 3]>,
    pub landmarks: LandmarkSource,
    pub workers: usize,
}

impl AlignSettings {
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self, ConfigError> {
        let input_glob = layer
            .input_glob
            .clone()
            .ok_or(ConfigError::Missing("input_glob"))?;
        let img_thresh = layer.img_thresh.unwrap_or(DEFAULT_IMG_THRESH);
        if img_thresh.is_nan() || img_thresh < 0.0 {
            return Err(ConfigError::Invalid {
                key: "img_thresh",
                reason: format!("{img_thresh} is negative"),
            });
        }
        if let Some(color) = layer.ref_color {
            if color.iter().any(|&c| !(c > 0.0 && c.is_finite())) {
                return Err(ConfigError::Invalid {
                    key: "ref_color",
                    reason: format!("{color:?} must be positive"),
                });
            }
        }
        Ok(Self {
            input_glob,
            aligned_path: aligned_path(layer),
            img_thresh,
            out_extension: out_extension(layer)?,
            ref_color: layer.ref_color,
            landmarks: LandmarkSource::from_layer(layer)?,
            workers: workers(layer)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramedropSettings {
    pub aligned_path: PathBuf,
    pub out_extension: String,
    pub frame_skip: usize,
    pub erode_amount: usize,
    pub filtered_files: PathBuf,
    pub landmarks: LandmarkSource,
}

impl FramedropSettings {
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self, ConfigError> {
        let frame_skip = layer.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP);
        if frame_skip == 0 {
            return Err(ConfigError::Invalid {
                key: "frame_skip",
                reason: "must be at least 1".into(),
            });
        }
        let erode_amount = layer.erode_amount.unwrap_or(DEFAULT_ERODE_AMOUNT);
        if erode_amount > 1 && erode_amount % 2 == 0 {
            return Err(ConfigError::Invalid {
                key: "erode_amount",
                reason: format!("{erode_amount} is not odd"),
            });
        }
        Ok(Self {
            aligned_path: aligned_path(layer),
            out_extension: out_extension(layer)?,
            frame_skip,
            erode_amount,
            filtered_files: layer
                .filtered_files
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILTERED_FILES)),
            landmarks: LandmarkSource::from_layer(layer)?,
        })
    }
}

fn aligned_path(layer: &ConfigLayer) -> PathBuf {
    layer
        .aligned_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ALIGNED_PATH))
}

fn out_extension(layer: &ConfigLayer) -> Result<String, ConfigError> {
    let ext = layer
        .out_extension
        .as_deref()
        .unwrap_or(DEFAULT_OUT_EXTENSION)
        .trim_start_matches('.')
        .to_ascii_lowercase();
    if ext.is_empty() || image::ImageFormat::from_extension(&ext).is_none() {
        return Err(ConfigError::Invalid {
            key: "out_extension",
            reason: format!("`{ext}` is not a known image format"),
        });
    }
    Ok(ext)
}

fn workers(layer: &ConfigLayer) -> Result<usize, ConfigError> {
    match layer.workers {
        Some(0) => Err(ConfigError::Invalid {
            key: "workers",
            reason: "must be at least 1".into(),
        }),
        Some(n) => Ok(n),
        None => Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)),
    }
}
