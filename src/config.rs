//! Configuration for the biostream agent.

use crate::core::session::{SessionGoal, SessionLength};
use crate::core::spectral::{BandEdges, Goal};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Incoming stream parameters
    pub stream: StreamConfig,

    /// EEG band-power engine parameters
    pub spectral: SpectralConfig,

    /// ECG beat detection and HRV parameters
    pub cardiac: CardiacConfig,

    /// Display-state debouncing
    pub state: StateConfig,

    /// Session scoring defaults
    pub session: SessionConfig,

    /// Goal used for the online score
    pub goal: Goal,

    /// Capacity of each worker's request and response queue
    pub worker_queue: usize,

    /// Path for storing telemetry and session reports
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("biostream-agent");

        Self {
            stream: StreamConfig::default(),
            spectral: SpectralConfig::default(),
            cardiac: CardiacConfig::default(),
            state: StateConfig::default(),
            session: SessionConfig::default(),
            goal: Goal::Anxiety,
            worker_queue: 64,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("biostream-agent")
            .join("config.json")
    }

    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.sample_rate <= 0.0 || !self.stream.sample_rate.is_finite() {
            return Err(ConfigError::Invalid("stream.sample_rate must be positive".into()));
        }
        if let Some(modulus) = self.stream.counter_modulus {
            if modulus < 2 {
                return Err(ConfigError::Invalid("stream.counter_modulus must be >= 2".into()));
            }
        }
        if self.spectral.fft_size < 8 || !self.spectral.fft_size.is_power_of_two() {
            return Err(ConfigError::Invalid(
                "spectral.fft_size must be a power of two >= 8".into(),
            ));
        }
        if self.spectral.hop == 0 {
            return Err(ConfigError::Invalid("spectral.hop must be non-zero".into()));
        }
        if !(self.spectral.smoothing > 0.0 && self.spectral.smoothing <= 1.0) {
            return Err(ConfigError::Invalid("spectral.smoothing must be in (0, 1]".into()));
        }
        if self.cardiac.batch == 0 || (self.cardiac.capacity as u64) < self.cardiac.batch {
            return Err(ConfigError::Invalid(
                "cardiac.capacity must hold at least one batch".into(),
            ));
        }
        if self.cardiac.bpm_window == 0 {
            return Err(ConfigError::Invalid("cardiac.bpm_window must be non-zero".into()));
        }
        if self.state.interval.is_zero() {
            return Err(ConfigError::Invalid("state.interval must be non-zero".into()));
        }
        if self.worker_queue == 0 {
            return Err(ConfigError::Invalid("worker_queue must be non-zero".into()));
        }
        Ok(())
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Device stream parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Nominal sample rate in Hz
    pub sample_rate: f64,
    /// Wraparound modulus of the device sample counter, if it wraps
    pub counter_modulus: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 500.0,
            counter_modulus: Some(256),
        }
    }
}

/// Band-power engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Window length in samples
    pub fft_size: usize,
    /// Emit a frame every `hop` samples once the window is full
    pub hop: u64,
    /// Exponential smoothing factor applied to raw band powers
    pub smoothing: f64,
    /// Frequency edges of each band
    pub bands: BandEdges,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            hop: 10,
            smoothing: 0.3,
            bands: BandEdges::default(),
        }
    }
}

/// ECG beat detection and HRV parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardiacConfig {
    /// Rolling ECG window in samples (5 s at 500 Hz)
    pub capacity: usize,
    /// Analyse once per `batch` new samples
    pub batch: u64,
    /// Minimum spacing between two beats
    #[serde(with = "millis_serde")]
    pub refractory: Duration,
    /// Peak threshold as a fraction of the window maximum
    pub threshold_ratio: f64,
    /// Shortest RR interval accepted, in ms
    pub min_rr_ms: f64,
    /// Longest RR interval accepted, in ms
    pub max_rr_ms: f64,
    /// Upper bound of the HRV value fed downstream, in ms
    pub hrv_clamp_ms: f64,
    /// Number of BPM readings averaged by the display filter
    pub bpm_window: usize,
    /// Largest change of the displayed BPM per update
    pub bpm_max_step: f64,
}

impl Default for CardiacConfig {
    fn default() -> Self {
        Self {
            capacity: 2500,
            batch: 500,
            refractory: Duration::from_millis(300),
            threshold_ratio: 0.6,
            min_rr_ms: 250.0,
            max_rr_ms: 2000.0,
            hrv_clamp_ms: 1500.0,
            bpm_window: 5,
            bpm_max_step: 2.0,
        }
    }
}

/// Display-state debouncing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Grace period, vote window and minimum time between display changes
    #[serde(with = "duration_serde")]
    pub interval: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Length used when none is given
    pub default_length: SessionLength,
    /// Goal whose weight table feeds the weighted EEG score
    pub default_goal: SessionGoal,
    /// Average symmetry below this is reported as balanced
    pub symmetry_threshold: f64,
    /// Stop and summarize an active session when the device disconnects
    pub stop_on_disconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_length: SessionLength::Three,
            default_goal: SessionGoal::Meditation,
            symmetry_threshold: 0.05,
            stop_on_disconnect: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stream.sample_rate, 500.0);
        assert_eq!(config.spectral.fft_size, 256);
        assert_eq!(config.cardiac.capacity, 2500);
        assert_eq!(config.state.interval, Duration::from_secs(5));
        assert!(config.session.stop_on_disconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip_keeps_durations() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"refractory\":300"));
        assert!(json.contains("\"interval\":5"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cardiac.refractory, Duration::from_millis(300));
        assert_eq!(parsed.goal, Goal::Anxiety);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.spectral.fft_size = 250;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.cardiac.capacity = 100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.counter_modulus = Some(1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.state.interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
