//! Configuration Vault – reads/writes `~/.groundtruth/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use groundtruth_runtime::SensorConfig;
use groundtruth_types::TargetMode;
use serde::{Deserialize, Serialize};

/// Persisted configuration stored in `~/.groundtruth/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub scenario: ScenarioConfig,
}

/// Where detection batches go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// rosbridge WebSocket URL (e.g. `ws://localhost:9090`).  When absent the
    /// sensor publishes on an in-process loopback bus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Pause between reconnection attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// The scripted traffic the CLI drives the sensor with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Number of vehicles on the road.
    #[serde(default = "default_vehicles")]
    pub vehicles: usize,

    /// Radius of the spherical sensing volume, metres.
    #[serde(default = "default_sensing_radius_m")]
    pub sensing_radius_m: f32,

    /// Physics steps per second.
    #[serde(default = "default_physics_hz")]
    pub physics_hz: f64,

    /// Sensor mount height above the ego origin, metres.
    #[serde(default = "default_mount_height_m")]
    pub mount_height_m: f32,

    /// Stop after this many simulated seconds; run until Ctrl-C when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

fn default_vehicles() -> usize {
    6
}
fn default_sensing_radius_m() -> f32 {
    40.0
}
fn default_physics_hz() -> f64 {
    50.0
}
fn default_mount_height_m() -> f32 {
    1.8
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            vehicles: default_vehicles(),
            sensing_radius_m: default_sensing_radius_m(),
            physics_hz: default_physics_hz(),
            mount_height_m: default_mount_height_m(),
            duration_secs: None,
        }
    }
}

/// Return the path to `~/.groundtruth/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".groundtruth").join("config.toml")
}

/// Load `~/.groundtruth/config.toml`, writing the defaults there first if
/// the file does not exist yet.  The flag is `true` when the file was created.
pub fn load_or_init() -> Result<(Config, bool), String> {
    load_or_init_at(&config_path())
}

pub(crate) fn load_or_init_at(path: &Path) -> Result<(Config, bool), String> {
    if let Some(cfg) = load_from(path)? {
        return Ok((cfg, false));
    }
    save_to(&Config::default(), path)?;
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg.sensor.validate().map_err(|e| e.to_string())?;
    Ok((cfg, true))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.sensor.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Apply `GROUNDTRUTH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GROUNDTRUTH_BRIDGE_URL` | `bridge.url` |
/// | `GROUNDTRUTH_TARGET` | `sensor.target_mode` |
/// | `GROUNDTRUTH_TOPIC` | `sensor.topic` |
/// | `GROUNDTRUTH_FREQUENCY_HZ` | `sensor.frequency_hz` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("GROUNDTRUTH_BRIDGE_URL") {
        cfg.bridge.url = Some(v);
    }
    if let Some(v) = lookup("GROUNDTRUTH_TARGET")
        && let Ok(mode) = v.parse::<TargetMode>()
    {
        cfg.sensor.target_mode = mode;
    }
    if let Some(v) = lookup("GROUNDTRUTH_TOPIC") {
        cfg.sensor.topic = v;
    }
    if let Some(v) = lookup("GROUNDTRUTH_FREQUENCY_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.sensor.frequency_hz = hz;
    }
}

/// Write `cfg` to `path` with owner-only permissions, creating the parent
/// directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_custom_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.sensor.label = "vehicle".to_string();
        cfg.bridge.reconnect_delay_ms = 500;
        cfg.scenario.vehicles = 3;
        cfg.scenario.duration_secs = Some(12.5);
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.sensor.label, "vehicle");
        assert_eq!(loaded.sensor.frame_id, "velodyne");
        assert_eq!(loaded.bridge.reconnect_delay_ms, 500);
        assert_eq!(loaded.scenario.vehicles, 3);
        assert_eq!(loaded.scenario.duration_secs, Some(12.5));
    }

    #[test]
    fn sparse_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sensor]\nlabel = \"truck\"\n\n[scenario]\nvehicles = 2\n").unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.sensor.label, "truck");
        assert_eq!(cfg.scenario.vehicles, 2);
        assert_eq!(cfg.scenario.physics_hz, 50.0);
        assert_eq!(cfg.bridge.reconnect_delay_ms, 2_000);
    }

    #[test]
    fn invalid_sensor_section_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sensor]\nframe_id = \"\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn first_run_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let (cfg, created) = load_or_init_at(&path).expect("init");
        assert!(created);
        assert!(path.exists());
        assert_eq!(cfg.scenario, ScenarioConfig::default());

        std::fs::write(&path, "[scenario]\nvehicles = 9\n").unwrap();
        let (cfg, created) = load_or_init_at(&path).expect("load");
        assert!(!created);
        assert_eq!(cfg.scenario.vehicles, 9);
    }

    #[cfg(unix)]
    #[test]
    fn first_run_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        load_or_init_at(&path).expect("init");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn config_path_points_to_groundtruth_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".groundtruth"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn overrides_apply_to_sensor_and_bridge() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup_from(&[
                ("GROUNDTRUTH_BRIDGE_URL", "ws://sim-host:9090"),
                ("GROUNDTRUTH_TARGET", "Apollo"),
                ("GROUNDTRUTH_TOPIC", "/apollo/perception/obstacles"),
                ("GROUNDTRUTH_FREQUENCY_HZ", "20"),
            ]),
        );
        assert_eq!(cfg.bridge.url.as_deref(), Some("ws://sim-host:9090"));
        assert_eq!(cfg.sensor.target_mode, TargetMode::Apollo);
        assert_eq!(cfg.sensor.topic, "/apollo/perception/obstacles");
        assert_eq!(cfg.sensor.frequency_hz, 20.0);
    }

    #[test]
    fn unparsable_overrides_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup_from(&[
                ("GROUNDTRUTH_TARGET", "carla"),
                ("GROUNDTRUTH_FREQUENCY_HZ", "fast"),
            ]),
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn apply_env_overrides_reads_process_env() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("GROUNDTRUTH_BRIDGE_URL", "ws://robot-host:9090") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("GROUNDTRUTH_BRIDGE_URL") };
        assert_eq!(cfg.bridge.url.as_deref(), Some("ws://robot-host:9090"));
    }
}
