//! Fake device fixture
//!
//! Lays out an app data directory inside a temp dir and points a
//! [`TargetApp`] at it. Commands run through a real `sh` session, so the
//! engine's shell scripts are exercised end to end without root.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use slotswap::channel::{SessionConfig, ShellChannel};
use slotswap::swap::{SettlePolicy, StorageLayout, SwapEngine, TargetApp, TreeSpec};
use tempfile::TempDir;

pub const PACKAGE: &str = "com.scopely.monopolygo";

/// A temporary device filesystem for one test
///
/// Everything is removed when the `FakeDevice` is dropped.
pub struct FakeDevice {
    /// TempDir handle (keeps directory alive until dropped)
    _dir: TempDir,
    pub root: PathBuf,
    pub target: TargetApp,
    pub layout: StorageLayout,
}

impl FakeDevice {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().to_path_buf();
        let data_dir = root.join("data").join(PACKAGE);

        let mut target = TargetApp::for_package(PACKAGE);
        target.data_dir = data_dir.clone();
        target.alternative_files = vec![];
        target.system_ssaid_file = root.join("system/settings_ssaid.xml");
        target.commands.stop = "true".into();
        target.commands.launch = "true".into();
        target.commands.view = format!(
            "echo {{uri}} >> '{}'",
            root.join("links.log").display()
        );
        target.commands.running_probe = None;
        target.commands.foreground_probe = None;
        target.trees = vec![
            TreeSpec::file("playerprefs.xml", target.player_prefs.clone()),
            TreeSpec::dir("DiskBasedCacheDirectory", "files/DiskBasedCacheDirectory"),
            TreeSpec::file("device-id.txt", "files/device-id").capture_only(),
        ];

        std::fs::create_dir_all(target.primary_path().parent().unwrap()).unwrap();
        std::fs::create_dir_all(data_dir.join("shared_prefs")).unwrap();
        std::fs::create_dir_all(root.join("staging")).unwrap();

        let layout = StorageLayout::new(
            root.join("store"),
            root.join("staging"),
            target.primary_file_name(),
        );

        Self {
            _dir: dir,
            root,
            target,
            layout,
        }
    }

    /// Engine over a plain `sh` session with near-zero settle waits
    pub fn engine(&self) -> SwapEngine {
        let channel = ShellChannel::new(SessionConfig::new("sh").with_timeout(Duration::from_secs(10)));
        SwapEngine::new(Arc::new(channel), self.target.clone(), self.layout.clone())
            .with_settle(SettlePolicy::uniform(Duration::from_millis(5)))
    }

    pub fn live_path(&self) -> PathBuf {
        self.target.primary_path()
    }

    pub fn write_live(&self, bytes: &[u8]) {
        std::fs::write(self.live_path(), bytes).unwrap();
    }

    pub fn read_live(&self) -> Vec<u8> {
        std::fs::read(self.live_path()).unwrap()
    }

    /// Write player preferences carrying `user_id`
    pub fn write_prefs(&self, user_id: &str) {
        let prefs = format!(
            "<?xml version='1.0' encoding='utf-8' standalone='yes' ?>\n<map>\n    \
             <string name=\"Scopely.UserId\">{}</string>\n</map>\n",
            user_id
        );
        std::fs::write(self.data_path(&self.target.player_prefs), prefs).unwrap();
    }

    pub fn data_path(&self, relative: &Path) -> PathBuf {
        self.target.data_dir.join(relative)
    }

    /// Deep links the app was asked to open, in order
    pub fn opened_links(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("links.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
