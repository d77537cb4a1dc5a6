//! Server configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use geotrack_core::{NmeaSource, PositionSource, SimulatedSource, SimulationSettings, SourceOptions};
use geotrack_types::Position;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Position source settings.
    pub position: PositionConfig,
    /// Controller behavior.
    pub controller: ControllerConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use geotrack_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.position.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8484").
    pub bind: String,
    /// Capacity of the response broadcast channel. Slow subscribers lose the
    /// oldest responses once it fills.
    pub broadcast_buffer: usize,
    /// Capacity of the controller's event queue.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8484".to_string(),
            broadcast_buffer: 100,
            queue_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{port}': must be a number 1-65535"),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "broadcast buffer must be at least 1",
            ));
        }
        if self.queue_capacity == 0 {
            errors.push(ValidationError::new(
                "server.queue_capacity",
                "queue capacity must be at least 1",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: geotrack_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Which position source to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// NMEA sentences from a serial device or file.
    #[default]
    Nmea,
    /// A random walk, for running without hardware.
    Simulated,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Nmea => "nmea",
            SourceKind::Simulated => "simulated",
        }
    }
}

/// Minimum fix interval in milliseconds.
pub const MIN_FIX_INTERVAL_MS: u64 = 100;
/// Maximum fix interval in milliseconds (1 hour).
pub const MAX_FIX_INTERVAL_MS: u64 = 3_600_000;

/// Position source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub source: SourceKind,
    /// Device or file the NMEA source reads from.
    pub device: PathBuf,
    /// Minimum time between recorded fixes, in milliseconds.
    pub min_interval_ms: u64,
    pub simulated: SimulatedConfig,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Nmea,
            device: PathBuf::from("/dev/ttyACM0"),
            min_interval_ms: 5000,
            simulated: SimulatedConfig::default(),
        }
    }
}

impl PositionConfig {
    /// Validate position configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.source == SourceKind::Nmea && self.device.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "position.device",
                "device path cannot be empty",
            ));
        }

        if self.min_interval_ms < MIN_FIX_INTERVAL_MS {
            errors.push(ValidationError::new(
                "position.min_interval_ms",
                format!(
                    "interval {} is too short (minimum {} ms)",
                    self.min_interval_ms, MIN_FIX_INTERVAL_MS
                ),
            ));
        } else if self.min_interval_ms > MAX_FIX_INTERVAL_MS {
            errors.push(ValidationError::new(
                "position.min_interval_ms",
                format!(
                    "interval {} is too long (maximum {} ms / 1 hour)",
                    self.min_interval_ms, MAX_FIX_INTERVAL_MS
                ),
            ));
        }

        errors.extend(self.simulated.validate());
        errors
    }

    /// Options passed to the source on every start.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions::with_interval(Duration::from_millis(self.min_interval_ms))
    }

    /// Build the configured position source.
    pub fn build_source(&self) -> geotrack_core::Result<Arc<dyn PositionSource>> {
        let source: Arc<dyn PositionSource> = match self.source {
            SourceKind::Nmea => Arc::new(NmeaSource::new(&self.device)),
            SourceKind::Simulated => Arc::new(SimulatedSource::new(self.simulated.settings())?),
        };
        Ok(source)
    }
}

/// Settings for the simulated source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Largest per-fix change of each coordinate, in degrees.
    pub step_degrees: f64,
    /// Seed for a reproducible walk.
    pub seed: Option<u64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        let settings = SimulationSettings::default();
        Self {
            latitude: settings.origin.latitude,
            longitude: settings.origin.longitude,
            step_degrees: settings.step_degrees,
            seed: settings.seed,
        }
    }
}

impl SimulatedConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Err(e) = Position::new(self.latitude, self.longitude).validate() {
            errors.push(ValidationError::new(
                "position.simulated",
                format!("invalid origin: {e}"),
            ));
        }
        if !self.step_degrees.is_finite() || self.step_degrees < 0.0 {
            errors.push(ValidationError::new(
                "position.simulated.step_degrees",
                "step must be a non-negative number",
            ));
        }
        errors
    }

    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            origin: Position::new(self.latitude, self.longitude),
            step_degrees: self.step_degrees,
            seed: self.seed,
        }
    }
}

/// Controller behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Treat SIGTERM as the machine shutting down and close the open session.
    /// By default SIGTERM keeps the session for the next process to resume.
    pub terminate_closes_session: bool,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `position.min_interval_ms`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geotrack")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8484");
        assert_eq!(config.server.broadcast_buffer, 100);
        assert_eq!(config.position.source, SourceKind::Nmea);
        assert_eq!(config.position.min_interval_ms, 5000);
        assert!(!config.controller.terminate_closes_session);
        assert_eq!(config.storage.path, geotrack_store::default_db_path());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9000"
            queue_capacity = 16

            [storage]
            path = "/data/geotrack.db"

            [position]
            source = "simulated"
            min_interval_ms = 1000

            [position.simulated]
            latitude = 51.5
            longitude = -0.12
            seed = 3

            [controller]
            terminate_closes_session = true
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.queue_capacity, 16);
        assert_eq!(config.server.broadcast_buffer, 100);
        assert_eq!(config.storage.path, PathBuf::from("/data/geotrack.db"));
        assert_eq!(config.position.source, SourceKind::Simulated);
        assert_eq!(config.position.simulated.seed, Some(3));
        assert_eq!(config.position.simulated.latitude, 51.5);
        assert!(config.controller.terminate_closes_session);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let mut config = Config::default();
        config.server.bind = "127.0.0.1:9191".to_string();
        config.position.device = PathBuf::from("/dev/ttyUSB1");
        config.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.server.bind, "127.0.0.1:9191");
        assert_eq!(loaded.position.device, PathBuf::from("/dev/ttyUSB1"));
    }

    #[test]
    fn test_config_load_errors() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));

        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();
        assert!(matches!(
            Config::load(&config_path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("geotrack/server.toml"));
    }

    #[test]
    fn test_server_validation() {
        let mut server = ServerConfig::default();
        assert!(server.validate().is_empty());

        server.bind = "localhost".to_string();
        assert_eq!(server.validate().len(), 1);

        server.bind = "localhost:0".to_string();
        assert!(server.validate()[0].message.contains("cannot be 0"));

        server.bind = "[::1]:8484".to_string();
        server.queue_capacity = 0;
        let errors = server.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "server.queue_capacity");
    }

    #[test]
    fn test_position_validation() {
        let mut position = PositionConfig::default();
        assert!(position.validate().is_empty());

        position.min_interval_ms = 10;
        assert_eq!(position.validate()[0].field, "position.min_interval_ms");

        position.min_interval_ms = 5000;
        position.simulated.latitude = 95.0;
        position.simulated.step_degrees = -1.0;
        assert_eq!(position.validate().len(), 2);
    }

    #[test]
    fn test_validation_error_display() {
        let mut config = Config::default();
        config.server.bind = String::new();
        config.storage.path = PathBuf::new();

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("server.bind: bind address cannot be empty"));
        assert!(message.contains("storage.path"));
    }

    #[test]
    fn test_load_validated_rejects_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        std::fs::write(&config_path, "[position]\nmin_interval_ms = 1\n").unwrap();
        assert!(matches!(
            Config::load_validated(&config_path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_build_source() {
        let mut position = PositionConfig::default();
        assert_eq!(position.build_source().unwrap().name(), "nmea");

        position.source = SourceKind::Simulated;
        assert_eq!(position.build_source().unwrap().name(), "simulated");
        assert_eq!(
            position.source_options().min_interval,
            Duration::from_millis(5000)
        );
    }
}
