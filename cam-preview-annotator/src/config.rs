//! Run configuration.
//!
//! Credentials and the server address come from the command line (or the
//! environment). Everything else has built-in defaults which an optional TOML
//! file can override:
//!
//! ```toml
//! max_preview_wait_secs = 10.0
//! preview_check_interval_secs = 1.0
//!
//! [render]
//! alpha = 0.4
//! contour_thickness = 3
//!
//! [[cameras]]
//! uuid = "3dafba3a-e99f-4738-9fe4-129602719e6d"
//! name = "Enter"
//! output_filename = "~/previews/camera_enter_1.jpg"
//! ```

use std::{collections::BTreeSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use cam_api_session::SessionCookies;
use region_overlay::RenderStyle;

use crate::types::Camera;

/// Default number of cameras processed at the same time.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default directory for the log file.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Name of the log file inside the log directory.
pub const LOG_FILENAME: &str = "camera_processor.log";

/// The default value for [ConfigFile::max_preview_wait_secs].
pub const DEFAULT_MAX_PREVIEW_WAIT_SECS: f64 = 10.0;

/// The default value for [ConfigFile::preview_check_interval_secs].
pub const DEFAULT_PREVIEW_CHECK_INTERVAL_SECS: f64 = 1.0;

/// The configuration error type.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("lookup error on variable: {source}")]
    ShellExpandLookupVarError {
        #[from]
        source: shellexpand::LookupError<std::env::VarError>,
    },
    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// The cameras processed when the configuration file names none.
pub fn default_cameras() -> Vec<Camera> {
    vec![
        Camera {
            uuid: "3dafba3a-e99f-4738-9fe4-129602719e6d".into(),
            name: "Enter".into(),
            output_filename: "camera_enter_1.jpg".into(),
        },
        Camera {
            uuid: "d9991689-2e0b-49f2-b854-9943e6c30be2".into(),
            name: "Exit".into(),
            output_filename: "camera_exit_2.jpg".into(),
        },
    ]
}

/// Timing of the wait for a regenerated preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Give up when no new preview appeared this long after the trigger.
    pub max_wait: Duration,
    /// Pause between two metadata fetches.
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs_f64(DEFAULT_MAX_PREVIEW_WAIT_SECS),
            interval: Duration::from_secs_f64(DEFAULT_PREVIEW_CHECK_INTERVAL_SECS),
        }
    }
}

/// Contents of the optional TOML configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Cameras to process. Empty means [default_cameras].
    pub cameras: Vec<Camera>,
    pub max_preview_wait_secs: f64,
    pub preview_check_interval_secs: f64,
    pub render: RenderStyle,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            max_preview_wait_secs: DEFAULT_MAX_PREVIEW_WAIT_SECS,
            preview_check_interval_secs: DEFAULT_PREVIEW_CHECK_INTERVAL_SECS,
            render: RenderStyle::default(),
        }
    }
}

impl ConfigFile {
    pub fn from_toml_str(buf: &str) -> Result<Self> {
        let mut cfg: Self = toml::from_str(buf)?;
        cfg.expand_output_paths()?;
        Ok(cfg)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let buf = std::fs::read_to_string(path)?;
        Self::from_toml_str(&buf)
    }

    /// Expand `~` and environment variables in output filenames.
    fn expand_output_paths(&mut self) -> Result<()> {
        for camera in self.cameras.iter_mut() {
            if let Some(s) = camera.output_filename.to_str() {
                let expanded = shellexpand::full(s)?;
                camera.output_filename = expanded.as_ref().into();
            }
        }
        Ok(())
    }

    fn polling(&self) -> Result<PollingConfig> {
        let to_duration = |name: &str, secs: f64| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| ConfigError::Invalid(format!("{name} = {secs}: {e}")))
        };
        let polling = PollingConfig {
            max_wait: to_duration("max_preview_wait_secs", self.max_preview_wait_secs)?,
            interval: to_duration(
                "preview_check_interval_secs",
                self.preview_check_interval_secs,
            )?,
        };
        if polling.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "preview_check_interval_secs must be positive".into(),
            ));
        }
        Ok(polling)
    }
}

/// Everything a run needs. Built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server address, e.g. `https://cams.example.com`.
    pub base_url: String,
    pub cookies: SessionCookies,
    pub cameras: Vec<Camera>,
    pub polling: PollingConfig,
    pub render: RenderStyle,
    /// Maximum number of cameras processed at the same time.
    pub max_workers: usize,
}

impl Config {
    pub fn new(
        base_url: String,
        cookies: SessionCookies,
        file: ConfigFile,
        max_workers: usize,
    ) -> Result<Self> {
        if max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        let polling = file.polling()?;
        let cameras = if file.cameras.is_empty() {
            default_cameras()
        } else {
            file.cameras
        };

        // Two cameras writing the same file would race.
        let mut seen = BTreeSet::new();
        for camera in cameras.iter() {
            if !seen.insert(&camera.output_filename) {
                return Err(ConfigError::Invalid(format!(
                    "output filename \"{}\" used by more than one camera",
                    camera.output_filename.display()
                )));
            }
        }

        Ok(Self {
            base_url,
            cookies,
            cameras,
            polling,
            render: file.render,
            max_workers,
        })
    }
}
