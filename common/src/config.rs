use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Device index handed to the capture backend.
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Frame rate requested from the device.
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
    /// Frames discarded after opening; first reads from a cold sensor
    /// are often dark or garbage.
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_stream_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    /// Preferred save directory. Used only when it already exists;
    /// otherwise the server falls back to `captured_images/` under the
    /// working directory.
    #[serde(default)]
    pub save_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            fps: default_camera_fps(),
            warmup_frames: default_warmup_frames(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            fps: default_stream_fps(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults so the
    /// server runs without any config at all; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::ReadFile(path.display().to_string(), e)),
        };
        let mut config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `CAMERA_INDEX` overrides `camera.index` when set and parseable.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("CAMERA_INDEX") {
            match raw.parse::<u32>() {
                Ok(index) => self.camera.index = index,
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring unparseable CAMERA_INDEX");
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5000
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_camera_fps() -> u32 {
    30
}
fn default_warmup_frames() -> u32 {
    3
}
fn default_quality() -> u8 {
    80
}
fn default_stream_fps() -> f64 {
    10.0
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.camera.index, 0);
        assert_eq!(config.camera.width, 1920);
        assert_eq!(config.camera.height, 1080);
        assert_eq!(config.camera.warmup_frames, 3);
        assert_eq!(config.stream.quality, 80);
        assert!((config.stream.fps - 10.0).abs() < f64::EPSILON);
        assert!(config.capture.save_dir.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [camera]
            index = 2

            [capture]
            save_dir = "/tmp/stills"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.camera.index, 2);
        assert_eq!(config.capture.save_dir.as_deref(), Some("/tmp/stills"));
    }

    #[test]
    fn camera_index_env_override() {
        let mut config = Config::default();
        config.camera.index = 1;
        std::env::set_var("CAMERA_INDEX", "4");
        config.apply_env_overrides();
        assert_eq!(config.camera.index, 4);

        std::env::set_var("CAMERA_INDEX", "not-a-number");
        config.apply_env_overrides();
        std::env::remove_var("CAMERA_INDEX");
        assert_eq!(config.camera.index, 4);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/cam-station.toml")).unwrap();
        assert_eq!(config.server.port, 5000);
    }
}
