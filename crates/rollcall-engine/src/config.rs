use chrono::NaiveTime;
use rollcall_core::MatchMetric;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration.
///
/// Built from defaults, then an optional TOML file, then `ROLLCALL_*`
/// environment variables (highest precedence).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Requested capture resolution; the driver may pick another.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    pub match_metric: MatchMetric,
    /// Overrides the metric's default threshold.
    pub match_threshold: Option<f32>,
    /// Minimum detector score for a face.
    pub detector_confidence: f32,
    /// Frames skipped between analysed frames (2 = analyse every third).
    pub skip_frames: usize,
    /// Capacity of the queue between capture and recognition.
    pub frame_queue: usize,
    /// Minimum gap between write attempts for the same student.
    pub cooldown_secs: u64,
    /// Frames discarded after opening the camera.
    pub warmup_frames: usize,
    /// Single-face frames collected before picking a registration embedding.
    pub frames_per_enroll: usize,
    /// Marks after this local time are recorded as late.
    pub late_after: Option<NaiveTime>,
    /// Value written to `attendance.recorded_by` by live sessions.
    pub recorded_by: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            model_dir: rollcall_core::default_model_dir(),
            db_path: data_dir().join("attendance.db"),
            match_metric: MatchMetric::Euclidean,
            match_threshold: None,
            detector_confidence: 0.5,
            skip_frames: 2,
            frame_queue: 2,
            cooldown_secs: 300,
            warmup_frames: 5,
            frames_per_enroll: 5,
            late_after: None,
            recorded_by: "face_recognition".to_string(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Otherwise `ROLLCALL_CONFIG` or the
    /// default location is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(p) => Self::from_file(&p)?,
            None => {
                let p = default_config_path();
                if p.exists() {
                    Self::from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = get("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("ROLLCALL_RECORDED_BY") {
            self.recorded_by = v;
        }
        set_parsed(&get, "ROLLCALL_CAPTURE_WIDTH", &mut self.capture_width);
        set_parsed(&get, "ROLLCALL_CAPTURE_HEIGHT", &mut self.capture_height);
        set_parsed(&get, "ROLLCALL_MATCH_METRIC", &mut self.match_metric);
        set_parsed(&get, "ROLLCALL_DETECTOR_CONFIDENCE", &mut self.detector_confidence);
        set_parsed(&get, "ROLLCALL_SKIP_FRAMES", &mut self.skip_frames);
        set_parsed(&get, "ROLLCALL_FRAME_QUEUE", &mut self.frame_queue);
        set_parsed(&get, "ROLLCALL_COOLDOWN_SECS", &mut self.cooldown_secs);
        set_parsed(&get, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        set_parsed(&get, "ROLLCALL_FRAMES_PER_ENROLL", &mut self.frames_per_enroll);

        let mut threshold = self.match_threshold.unwrap_or(f32::NAN);
        if set_parsed(&get, "ROLLCALL_MATCH_THRESHOLD", &mut threshold) {
            self.match_threshold = Some(threshold);
        }
        let mut late = NaiveTime::default();
        if set_parsed(&get, "ROLLCALL_LATE_AFTER", &mut late) {
            self.late_after = Some(late);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, reason: &str| {
            Err(ConfigError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };
        if self.frame_queue == 0 {
            return invalid("frame_queue", "must be at least 1");
        }
        if !(0.0..1.0).contains(&self.detector_confidence) {
            return invalid("detector_confidence", "must be in [0, 1)");
        }
        let t = self.threshold();
        match self.match_metric {
            MatchMetric::Euclidean if !(t.is_finite() && t > 0.0) => {
                invalid("match_threshold", "euclidean threshold must be a positive distance")
            }
            MatchMetric::Cosine if !(-1.0..=1.0).contains(&t) => {
                invalid("match_threshold", "cosine threshold must be in [-1, 1]")
            }
            _ => Ok(()),
        }
    }

    /// Effective match threshold for the configured metric.
    pub fn threshold(&self) -> f32 {
        self.match_threshold
            .unwrap_or_else(|| self.match_metric.default_threshold())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(rollcall_core::DETECTOR_MODEL_FILE)
    }

    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(rollcall_core::RECOGNIZER_MODEL_FILE)
    }
}

fn set_parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> bool {
    let Some(raw) = get(key) else {
        return false;
    };
    match raw.trim().parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable override");
            false
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

/// `$XDG_CONFIG_HOME/rollcall/config.toml`.
pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("rollcall")
        .join("config.toml")
}
