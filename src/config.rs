//! uvcprobe runtime configuration handling

use crate::camera::{CameraConfig, PixelFormat};
use crate::error::{Error, Result};
use crate::params::{ParamRegistry, RegistryProfile, ValueMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration structure persisted to disk or environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UvcConfig {
    /// Camera discovery and capture overrides
    pub camera: CameraOptions,
    /// External utilities used for discovery and control writes
    pub tools: ToolOptions,
    /// Vendor serial-number helper
    pub serial: SerialOptions,
    /// Saved parameter values
    pub store: StoreOptions,
    /// Named control presets: preset name -> control name -> value
    pub presets: BTreeMap<String, BTreeMap<String, i64>>,
    /// Logging configuration
    pub logging: LoggingOptions,
}

impl UvcConfig {
    /// Load configuration from an explicit path or fall back to discovered defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Some(path) = Self::discover_file()? {
            tracing::info!("Using configuration file: {}", path.display());
            Self::from_file(&path)?
        } else {
            tracing::debug!("No uvcprobe.toml / uvcprobe.yaml found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Attempt to locate a configuration file in common locations.
    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;
        for candidate in ["uvcprobe.toml", "uvcprobe.yaml", "uvcprobe.yml"] {
            let path = cwd.join(candidate);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(xdg_config) = env::var_os("XDG_CONFIG_HOME") {
            let base = PathBuf::from(xdg_config).join("uvcprobe");
            for candidate in ["config.toml", "config.yaml"] {
                let path = base.join(candidate);
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }

    /// Read configuration from a concrete file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "toml" => toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse TOML {}: {e}", path.display()))
            }),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse YAML {}: {e}", path.display()))
            }),
            other => Err(Error::Config(format!(
                "Unsupported config format '{}', expected toml/yaml",
                other
            ))),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.camera.apply_env_overrides();
        self.tools.apply_env_overrides();
        self.serial.apply_env_overrides();
        self.store.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Produce a fully resolved capture configuration.
    ///
    /// The `hd-webcam` profile starts from 1080p capture at native size; camera
    /// overrides apply on top of either base.
    pub fn camera_config(&self) -> Result<CameraConfig> {
        let base = match self.store.profile {
            RegistryProfile::Uvc => CameraConfig::default(),
            RegistryProfile::HdWebcam => CameraConfig::hd_webcam(),
        };
        self.camera.apply_to(base)
    }

    /// Control table for the configured profile with configured presets layered on top.
    pub fn registry(&self) -> ParamRegistry {
        let mut registry = ParamRegistry::for_profile(self.store.profile);
        for (name, values) in &self.presets {
            registry.add_preset(name.clone(), values.clone());
        }
        registry
    }

    /// Look up a built-in or configured preset by name.
    pub fn preset(&self, name: &str) -> Result<BTreeMap<String, i64>> {
        let registry = self.registry();
        registry.preset(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = registry.preset_names().collect();
            Error::Config(format!(
                "Unknown preset '{name}' (known: {})",
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            ))
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Camera overrides merged on top of the profile's base `CameraConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Directory scanned for `video<N>` nodes
    pub dev_dir: PathBuf,
    /// Kernel driver a node must report to be treated as a camera
    pub driver: String,
    /// Override for desired frame width in pixels
    pub width: Option<u32>,
    /// Override for desired frame height in pixels
    pub height: Option<u32>,
    /// Override for pixel format string (mjpeg/yuyv/rgb24)
    pub format: Option<String>,
    /// Override for number of V4L2 buffers to allocate
    pub buffer_count: Option<u32>,
    /// Upper bound on frames read per second per device
    pub max_fps: Option<u32>,
    /// Width frames are scaled to before display (0 keeps native size)
    pub preview_width: Option<u32>,
    /// Height frames are scaled to before display (0 keeps native size)
    pub preview_height: Option<u32>,
    /// Capacity of the shared frame queue
    pub queue_capacity: usize,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            driver: "uvcvideo".to_string(),
            width: None,
            height: None,
            format: None,
            buffer_count: None,
            max_fps: None,
            preview_width: None,
            preview_height: None,
            queue_capacity: 2,
        }
    }
}

impl CameraOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("UVCPROBE_DEV_DIR") {
            self.dev_dir = PathBuf::from(dir);
        }
        if let Ok(driver) = env::var("UVCPROBE_DRIVER") {
            self.driver = driver;
        }
        if let Ok(width) = env::var("UVCPROBE_CAMERA_WIDTH") {
            self.width = width.parse::<u32>().ok();
        }
        if let Ok(height) = env::var("UVCPROBE_CAMERA_HEIGHT") {
            self.height = height.parse::<u32>().ok();
        }
        if let Ok(format) = env::var("UVCPROBE_CAMERA_FORMAT") {
            self.format = Some(format);
        }
        if let Ok(fps) = env::var("UVCPROBE_MAX_FPS") {
            self.max_fps = fps.parse::<u32>().ok();
        }
    }

    /// Merge overrides onto `config`.
    pub fn apply_to(&self, mut config: CameraConfig) -> Result<CameraConfig> {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(format) = &self.format {
            config.format = PixelFormat::from_str(format).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown pixel format '{}'. Use mjpeg, yuyv, or rgb24",
                    format
                ))
            })?;
        }
        if let Some(buffers) = self.buffer_count {
            config.buffer_count = buffers.max(2);
        }
        if let Some(fps) = self.max_fps {
            config.max_fps = fps.max(1);
        }

        match (self.preview_width, self.preview_height) {
            (Some(0), _) | (_, Some(0)) => config.preview = None,
            (Some(w), Some(h)) => config.preview = Some((w, h)),
            (Some(w), None) => config.preview = config.preview.map(|(_, h)| (w, h)),
            (None, Some(h)) => config.preview = config.preview.map(|(w, _)| (w, h)),
            (None, None) => {}
        }

        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "camera.queue_capacity must be at least 1".to_string(),
            ));
        }
        config.queue_capacity = self.queue_capacity;

        Ok(config)
    }
}

/// How control writes reach the driver
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlBackend {
    /// Shell out to `v4l2-ctl --set-ctrl`
    #[default]
    Cli,
    /// Issue `VIDIOC_S_CTRL` through the v4l bindings
    Native,
}

impl ControlBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cli" | "v4l2-ctl" => Some(Self::Cli),
            "native" | "ioctl" => Some(Self::Native),
            _ => None,
        }
    }
}

/// External utility locations and invocation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOptions {
    /// `v4l2-ctl` program
    pub v4l2_ctl: String,
    /// `udevadm` program
    pub udevadm: String,
    /// `lsusb` program
    pub lsusb: String,
    /// Per-invocation timeout in milliseconds
    pub timeout_ms: u64,
    /// Control write backend
    pub backend: ControlBackend,
    /// Read each control back after writing it
    pub verify_writes: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            v4l2_ctl: "v4l2-ctl".to_string(),
            udevadm: "udevadm".to_string(),
            lsusb: "lsusb".to_string(),
            timeout_ms: 5_000,
            backend: ControlBackend::Cli,
            verify_writes: false,
        }
    }
}

impl ToolOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("UVCPROBE_V4L2_CTL") {
            self.v4l2_ctl = path;
        }
        if let Ok(path) = env::var("UVCPROBE_UDEVADM") {
            self.udevadm = path;
        }
        if let Ok(path) = env::var("UVCPROBE_LSUSB") {
            self.lsusb = path;
        }
        if let Ok(timeout) = env::var("UVCPROBE_TOOL_TIMEOUT_MS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.timeout_ms = parsed.max(100);
            }
        }
        if let Ok(backend) = env::var("UVCPROBE_BACKEND") {
            if let Some(parsed) = ControlBackend::parse(&backend) {
                self.backend = parsed;
            }
        }
        if let Ok(verify) = env::var("UVCPROBE_VERIFY_WRITES") {
            if let Some(parsed) = parse_bool(&verify) {
                self.verify_writes = parsed;
            }
        }
    }

    /// Timeout applied to every external invocation
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Vendor serial-number helper and target-device classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialOptions {
    /// Helper program printing one serial number per line; unset disables lookup
    pub command: Option<String>,
    /// Arguments passed to the helper
    pub args: Vec<String>,
    /// Lines starting with this prefix are serial numbers
    pub prefix: String,
    /// Case-insensitive keyword identifying target devices in `lsusb` names
    pub target_name: String,
    /// `VID-PID` combinations flagged as targets
    pub target_ids: Vec<String>,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            prefix: "GF225".to_string(),
            target_name: "ViTai".to_string(),
            target_ids: vec!["F225-0001".to_string()],
        }
    }
}

impl SerialOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(command) = env::var("UVCPROBE_SERIAL_COMMAND") {
            self.command = if command.trim().is_empty() {
                None
            } else {
                Some(command)
            };
        }
        if let Ok(prefix) = env::var("UVCPROBE_SERIAL_PREFIX") {
            self.prefix = prefix;
        }
    }
}

/// Parameter store location and batch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// JSON file holding saved values per device
    pub path: PathBuf,
    /// Registry column used by `apply` when no mode is given
    pub mode: ValueMode,
    /// Built-in control table
    pub profile: RegistryProfile,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("camera_params.json"),
            mode: ValueMode::User,
            profile: RegistryProfile::Uvc,
        }
    }
}

impl StoreOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("UVCPROBE_PARAMS_FILE") {
            self.path = PathBuf::from(path);
        }
        if let Ok(profile) = env::var("UVCPROBE_PROFILE") {
            if let Some(parsed) = RegistryProfile::parse(&profile) {
                self.profile = parsed;
            }
        }
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default log level (overridable via `UVCPROBE_LOG_LEVEL`)
    pub level: String,
    /// Optional log file path for teeing structured logs
    pub file: Option<PathBuf>,
    /// ANSI colors in console logging
    pub color: bool,
    /// Optional log rotation strategy applied to `file`
    pub rotation: Option<LogRotation>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            color: true,
            rotation: None,
        }
    }
}

impl LoggingOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("UVCPROBE_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(file) = env::var("UVCPROBE_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Ok(color) = env::var("UVCPROBE_LOG_COLOR") {
            if let Some(parsed) = parse_bool(&color) {
                self.color = parsed;
            }
        }
        if let Ok(rotation) = env::var("UVCPROBE_LOG_ROTATION") {
            if let Some(parsed) = LogRotation::from_str(&rotation) {
                self.rotation = Some(parsed);
            }
        }
    }
}

/// Supported log rotation policies for file sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate log files once per hour
    Hourly,
    /// Rotate log files once per day
    Daily,
}

impl LogRotation {
    fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_uvc_tools() {
        let config = UvcConfig::default();
        assert_eq!(config.camera.driver, "uvcvideo");
        assert_eq!(config.camera.queue_capacity, 2);
        assert_eq!(config.tools.timeout(), Duration::from_secs(5));
        assert_eq!(config.serial.prefix, "GF225");
        assert_eq!(config.store.path, PathBuf::from("camera_params.json"));
    }

    #[test]
    fn test_parse_toml_with_presets() {
        let raw = r#"
            [camera]
            max_fps = 15
            preview_width = 0

            [tools]
            backend = "native"
            verify_writes = true

            [presets.bright]
            brightness = 40
            gamma = 200
        "#;
        let config: UvcConfig = toml::from_str(raw).expect("parse toml");
        assert_eq!(config.tools.backend, ControlBackend::Native);
        assert!(config.tools.verify_writes);

        let preset = config.preset("bright").expect("preset present");
        assert_eq!(preset.get("brightness"), Some(&40));

        let camera = config.camera_config().expect("camera config");
        assert_eq!(camera.max_fps, 15);
        assert!(camera.preview.is_none());
    }

    #[test]
    fn test_unknown_preset_lists_known_names() {
        let mut config = UvcConfig::default();
        config.presets.insert("scheme1".to_string(), BTreeMap::new());
        let err = config.preset("missing").unwrap_err();
        assert!(err.to_string().contains("scheme1"));
    }

    #[test]
    fn test_builtin_presets_follow_profile() {
        let mut config = UvcConfig::default();
        assert!(config.preset("scheme2").is_err());

        config.store.profile = RegistryProfile::HdWebcam;
        let scheme = config.preset("scheme2").expect("built-in preset");
        assert_eq!(scheme.get("white_balance_temperature"), Some(&5000));
    }

    #[test]
    fn test_hd_webcam_profile_captures_native_1080p() {
        let mut config = UvcConfig::default();
        config.store.profile = RegistryProfile::HdWebcam;
        let camera = config.camera_config().expect("camera config");
        assert_eq!((camera.width, camera.height), (1920, 1080));
        assert!(camera.preview.is_none());

        config.camera.width = Some(1280);
        config.camera.height = Some(720);
        let camera = config.camera_config().expect("camera config");
        assert_eq!((camera.width, camera.height), (1280, 720));
        assert!(camera.preview.is_none());

        let uvc = UvcConfig::default().camera_config().expect("camera config");
        assert_eq!(uvc.preview, Some((640, 480)));
    }

    #[test]
    fn test_parse_yaml() {
        let raw = "store:\n  path: /tmp/params.json\n  mode: vendor\n  profile: hd-webcam\nserial:\n  command: /opt/sn\n";
        let config: UvcConfig = serde_yaml::from_str(raw).expect("parse yaml");
        assert_eq!(config.store.mode, ValueMode::Vendor);
        assert_eq!(config.store.profile, RegistryProfile::HdWebcam);
        assert!(config.registry().preset("scheme1").is_some());
        assert_eq!(config.serial.command.as_deref(), Some("/opt/sn"));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let options = CameraOptions {
            queue_capacity: 0,
            ..CameraOptions::default()
        };
        assert!(options.apply_to(CameraConfig::default()).is_err());
    }
}
