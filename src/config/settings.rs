use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Table};

use crate::channel::SessionConfig;
use crate::swap::{Exclusivity, SettlePolicy, SettleWindow, StorageLayout, TargetApp, TreeSpec};
use crate::util::paths::{config_path, data_dir};

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Device-side scratch space the elevated shell can write to
pub const DEFAULT_STAGING_ROOT: &str = "/data/local/tmp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config document: {0}")]
    Document(#[from] toml_edit::TomlError),

    #[error("Failed to write config: {0}")]
    Write(#[from] std::io::Error),
}

/// Where snapshots live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Holds the `own` and `customer` namespaces
    pub root: PathBuf,
    /// Scratch directory for building and unpacking archives
    pub staging_root: PathBuf,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// How elevated shell sessions are opened
    pub channel: SessionConfig,
    /// The app whose state is swapped
    pub target: TargetApp,
    pub storage: StorageConfig,
    /// Waits after stop, launch and link signals
    pub settle: SettlePolicy,
    /// Behaviour when the live slot is busy
    pub exclusivity: Exclusivity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: SessionConfig::default(),
            target: TargetApp::default(),
            storage: StorageConfig {
                root: data_dir().join("profiles"),
                staging_root: PathBuf::from(DEFAULT_STAGING_ROOT),
            },
            settle: SettlePolicy::default(),
            exclusivity: Exclusivity::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlChannelConfig {
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTargetConfig {
    pub package: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub primary_file: Option<PathBuf>,
    pub alternative_files: Option<Vec<PathBuf>>,
    pub player_prefs: Option<PathBuf>,
    pub install_id_file: Option<PathBuf>,
    pub system_ssaid_file: Option<PathBuf>,
    pub owner: Option<String>,
    pub file_mode: Option<String>,
    pub dir_mode: Option<String>,
    pub link_scheme: Option<String>,
    pub stop_command: Option<String>,
    pub launch_command: Option<String>,
    pub view_command: Option<String>,
    /// Empty string disables the probe
    pub running_probe: Option<String>,
    /// Empty string disables the probe
    pub foreground_probe: Option<String>,
    pub trees: Option<Vec<TreeSpec>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlStorageConfig {
    pub root: Option<PathBuf>,
    pub staging_root: Option<PathBuf>,
}

/// Settle timings in milliseconds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSettleConfig {
    pub stop_poll_ms: Option<u64>,
    pub stop_timeout_ms: Option<u64>,
    pub stop_fallback_ms: Option<u64>,
    pub launch_poll_ms: Option<u64>,
    pub launch_timeout_ms: Option<u64>,
    pub launch_fallback_ms: Option<u64>,
    pub signal_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlEngineConfig {
    pub exclusivity: Option<Exclusivity>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub channel: Option<TomlChannelConfig>,
    pub target: Option<TomlTargetConfig>,
    pub storage: Option<TomlStorageConfig>,
    pub settle: Option<TomlSettleConfig>,
    pub engine: Option<TomlEngineConfig>,
}

impl TomlChannelConfig {
    fn apply(self, channel: &mut SessionConfig) {
        if let Some(program) = self.program {
            channel.program = program;
        }
        if let Some(args) = self.args {
            channel.args = args;
        }
        if let Some(secs) = self.timeout_secs {
            channel.timeout = Duration::from_secs(secs);
        }
    }
}

impl TomlTargetConfig {
    fn apply(self, target: &mut TargetApp) {
        // A different package changes every derived default
        if let Some(package) = self.package {
            if package != target.package {
                *target = TargetApp::for_package(&package);
            }
        }
        if let Some(data_dir) = self.data_dir {
            target.data_dir = data_dir;
        }
        if let Some(primary_file) = self.primary_file {
            target.primary_file = primary_file;
        }
        if let Some(alternatives) = self.alternative_files {
            target.alternative_files = alternatives;
        }
        if let Some(prefs) = self.player_prefs {
            target.player_prefs = prefs;
        }
        if let Some(file) = self.install_id_file {
            target.install_id_file = file;
        }
        if let Some(file) = self.system_ssaid_file {
            target.system_ssaid_file = file;
        }
        if let Some(owner) = self.owner {
            target.owner = Some(owner).filter(|o| !o.trim().is_empty());
        }
        if let Some(mode) = self.file_mode {
            target.file_mode = mode;
        }
        if let Some(mode) = self.dir_mode {
            target.dir_mode = mode;
        }
        if let Some(scheme) = self.link_scheme {
            target.link_scheme = scheme;
        }
        if let Some(stop) = self.stop_command {
            target.commands.stop = stop;
        }
        if let Some(launch) = self.launch_command {
            target.commands.launch = launch;
        }
        if let Some(view) = self.view_command {
            target.commands.view = view;
        }
        if let Some(probe) = self.running_probe {
            target.commands.running_probe = Some(probe).filter(|p| !p.trim().is_empty());
        }
        if let Some(probe) = self.foreground_probe {
            target.commands.foreground_probe = Some(probe).filter(|p| !p.trim().is_empty());
        }
        if let Some(trees) = self.trees {
            target.trees = trees;
        }
    }
}

impl TomlSettleConfig {
    fn apply(self, settle: &mut SettlePolicy) {
        fn set(slot: &mut Duration, ms: Option<u64>) {
            if let Some(ms) = ms {
                *slot = Duration::from_millis(ms);
            }
        }
        let SettlePolicy {
            stop,
            launch,
            signal,
        } = settle;
        apply_window(stop, self.stop_poll_ms, self.stop_timeout_ms, self.stop_fallback_ms);
        apply_window(
            launch,
            self.launch_poll_ms,
            self.launch_timeout_ms,
            self.launch_fallback_ms,
        );
        set(signal, self.signal_ms);

        fn apply_window(
            window: &mut SettleWindow,
            poll: Option<u64>,
            timeout: Option<u64>,
            fallback: Option<u64>,
        ) {
            set(&mut window.poll_interval, poll);
            set(&mut window.timeout, timeout);
            set(&mut window.fallback, fallback);
        }
    }
}

impl Config {
    /// Load configuration from the default location, merging with defaults.
    /// The bundled example is written on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let config_file = config_path();
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }
        Self::load_from(&config_file)
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if !path.exists() {
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let toml_config =
            toml::from_str::<TomlConfig>(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(channel) = toml_config.channel {
            channel.apply(&mut self.channel);
        }
        if let Some(target) = toml_config.target {
            target.apply(&mut self.target);
        }
        if let Some(storage) = toml_config.storage {
            if let Some(root) = storage.root {
                self.storage.root = root;
            }
            if let Some(staging_root) = storage.staging_root {
                self.storage.staging_root = staging_root;
            }
        }
        if let Some(settle) = toml_config.settle {
            settle.apply(&mut self.settle);
        }
        if let Some(exclusivity) = toml_config.engine.and_then(|e| e.exclusivity) {
            self.exclusivity = exclusivity;
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    /// Storage layout for the configured root and target
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(
            self.storage.root.clone(),
            self.storage.staging_root.clone(),
            self.target.primary_file_name(),
        )
    }
}

/// Save the snapshot storage root to the config file at `config_file`.
///
/// Reads the existing document, updates `[storage] root` and writes it back
/// while preserving all other content.
pub fn save_storage_root(config_file: &Path, root: &Path) -> Result<(), ConfigError> {
    let contents = if config_file.exists() {
        fs::read_to_string(config_file)?
    } else {
        String::new()
    };

    let mut doc: DocumentMut = contents.parse()?;

    if !doc.contains_key("storage") {
        doc["storage"] = Item::Table(Table::new());
    }
    doc["storage"]["root"] = toml_edit::value(root.to_string_lossy().to_string());

    if let Some(parent) = config_file.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(config_file, doc.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::TreeKind;
    use tempfile::tempdir;

    #[test]
    fn test_example_config_parses() {
        let parsed = toml::from_str::<TomlConfig>(EXAMPLE_CONFIG);
        assert!(parsed.is_ok(), "{:?}", parsed.err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.target, TargetApp::default());
        assert_eq!(config.exclusivity, Exclusivity::Wait);
    }

    #[test]
    fn test_partial_config_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[channel]
program = "/system/xbin/su"
timeout_secs = 5

[target]
owner = "u0_a123:u0_a123"
foreground_probe = ""

[storage]
root = "/sdcard/slotswap"

[settle]
launch_fallback_ms = 4000

[engine]
exclusivity = "reject"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.channel.program, PathBuf::from("/system/xbin/su"));
        assert_eq!(config.channel.timeout, Duration::from_secs(5));
        assert_eq!(config.target.owner.as_deref(), Some("u0_a123:u0_a123"));
        assert_eq!(config.target.commands.foreground_probe, None);
        assert!(config.target.commands.running_probe.is_some());
        assert_eq!(config.storage.root, PathBuf::from("/sdcard/slotswap"));
        assert_eq!(config.settle.launch.fallback, Duration::from_secs(4));
        assert_eq!(config.settle.launch.timeout, SettlePolicy::default().launch.timeout);
        assert_eq!(config.exclusivity, Exclusivity::Reject);
    }

    #[test]
    fn test_trees_replace_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[[target.trees]]
name = "prefs.xml"
path = "shared_prefs/prefs.xml"
kind = "file"

[[target.trees]]
name = "cache"
path = "cache"
kind = "dir"
restore = false
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.target.trees.len(), 2);
        assert_eq!(config.target.trees[1].kind, TreeKind::Dir);
        assert!(!config.target.trees[1].restore);
        assert!(config.target.trees[0].restore);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[engine]\nexclusivity = \"sometimes\"\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_storage_root_preserves_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# my settings\n[engine]\nexclusivity = \"reject\"\n").unwrap();

        save_storage_root(&path, Path::new("/sdcard/profiles")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("# my settings"));
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/sdcard/profiles"));
        assert_eq!(config.exclusivity, Exclusivity::Reject);
    }
}
