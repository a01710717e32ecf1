//! Description of the external application whose state is swapped

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::shell::quote;

pub const DEFAULT_PACKAGE: &str = "com.scopely.monopolygo";
pub const DEFAULT_PRIMARY_FILE: &str =
    "files/DiskBasedCacheDirectory/WithBuddies.Services.User.0Production.dat";
pub const DEFAULT_LINK_SCHEME: &str = "monopolygo";

/// Whether a captured tree is a single file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreeKind {
    File,
    Dir,
}

impl TreeKind {
    /// `test` flag for this kind
    pub fn test_flag(&self) -> &'static str {
        match self {
            TreeKind::File => "-f",
            TreeKind::Dir => "-d",
        }
    }
}

/// An auxiliary file or directory captured alongside the primary state file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSpec {
    /// Entry name inside the snapshot archive
    pub name: String,
    /// Live location; relative paths are resolved against the app data dir
    pub path: PathBuf,
    pub kind: TreeKind,
    /// Copied back on restore
    #[serde(default = "default_true")]
    pub restore: bool,
    /// Only captured when explicitly requested
    #[serde(default)]
    pub opt_in: bool,
}

fn default_true() -> bool {
    true
}

impl TreeSpec {
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: TreeKind::File,
            restore: true,
            opt_in: false,
        }
    }

    pub fn dir(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: TreeKind::Dir,
            ..Self::file(name, path)
        }
    }

    pub fn capture_only(mut self) -> Self {
        self.restore = false;
        self
    }

    pub fn opt_in(mut self) -> Self {
        self.opt_in = true;
        self
    }
}

/// Shell command templates. `{package}` and `{uri}` are substituted, already quoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCommands {
    pub stop: String,
    pub launch: String,
    pub view: String,
    /// Prints the app's pids; empty output means it is not running
    pub running_probe: Option<String>,
    /// Prints the resumed activity; output mentioning the package means foreground
    pub foreground_probe: Option<String>,
}

impl Default for AppCommands {
    fn default() -> Self {
        Self {
            stop: "am force-stop {package}".into(),
            launch: "monkey -p {package} -c android.intent.category.LAUNCHER 1".into(),
            view: "am start -a android.intent.action.VIEW -d {uri}".into(),
            running_probe: Some("pidof {package}".into()),
            foreground_probe: Some(
                "dumpsys activity activities | grep -E 'mResumedActivity|topResumedActivity'"
                    .into(),
            ),
        }
    }
}

/// The external application and the files that make up its identity state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetApp {
    pub package: String,
    /// App-private data directory (`/data/data/<package>`)
    pub data_dir: PathBuf,
    /// Live slot, relative to `data_dir`
    pub primary_file: PathBuf,
    /// Other places the primary file has been observed, checked in order
    pub alternative_files: Vec<PathBuf>,
    /// Preferences holding the user id, relative to `data_dir`
    pub player_prefs: PathBuf,
    /// File whose content embeds the install id
    pub install_id_file: PathBuf,
    /// System-level per-install identifier file
    pub system_ssaid_file: PathBuf,
    /// Explicit `uid:gid`; `None` copies the owner of `data_dir`
    pub owner: Option<String>,
    pub file_mode: String,
    pub dir_mode: String,
    pub link_scheme: String,
    pub commands: AppCommands,
    pub trees: Vec<TreeSpec>,
}

impl Default for TargetApp {
    fn default() -> Self {
        Self::for_package(DEFAULT_PACKAGE)
    }
}

impl TargetApp {
    /// Default layout for an Android package
    pub fn for_package(package: &str) -> Self {
        let data_dir = PathBuf::from("/data/data").join(package);
        let player_prefs = PathBuf::from(format!("shared_prefs/{}.v2.playerprefs.xml", package));
        Self {
            package: package.to_string(),
            alternative_files: vec![
                data_dir.join("files/WithBuddies.Services.User.0Production.dat"),
                PathBuf::from("/data/user/0")
                    .join(package)
                    .join(DEFAULT_PRIMARY_FILE),
            ],
            data_dir,
            primary_file: PathBuf::from(DEFAULT_PRIMARY_FILE),
            player_prefs: player_prefs.clone(),
            install_id_file: PathBuf::from("files/internal-device-id"),
            system_ssaid_file: PathBuf::from("/data/system/users/0/settings_ssaid.xml"),
            owner: None,
            file_mode: "660".into(),
            dir_mode: "771".into(),
            link_scheme: DEFAULT_LINK_SCHEME.into(),
            commands: AppCommands::default(),
            trees: vec![
                TreeSpec::file("playerprefs.xml", player_prefs),
                TreeSpec::dir("DiskBasedCacheDirectory", "files/DiskBasedCacheDirectory"),
                TreeSpec::file("device-id.txt", "files/device-id"),
                TreeSpec::file("internal-device-id.txt", "files/internal-device-id"),
                TreeSpec::file("generatefid.lock", "files/generatefid.lock"),
                TreeSpec::file(
                    "window_positions.xml",
                    "shared_prefs/mys_mod_window_positions.xml",
                ),
                TreeSpec::file(
                    "feature_settings.xml",
                    "shared_prefs/mys_mod_feature_settings.xml",
                ),
                TreeSpec::file(
                    "fb_token.xml",
                    "shared_prefs/com.facebook.AccessTokenManager.SharedPreferences.xml",
                )
                .opt_in(),
                TreeSpec::file(
                    "settings_ssaid.xml",
                    "/data/system/users/0/settings_ssaid.xml",
                )
                .capture_only(),
            ],
        }
    }

    /// Resolve a configured path against the data dir. Absolute paths pass through.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }

    /// Absolute path of the live slot
    pub fn primary_path(&self) -> PathBuf {
        self.resolve(&self.primary_file)
    }

    /// File name the primary file is stored under inside a snapshot
    pub fn primary_file_name(&self) -> String {
        self.primary_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "account.dat".to_string())
    }

    /// Shell expression producing the `uid:gid` the app runs as
    pub fn owner_expr(&self) -> String {
        match &self.owner {
            Some(owner) => quote(owner),
            None => format!(
                "$(stat -c %u:%g {})",
                quote(&self.data_dir.to_string_lossy())
            ),
        }
    }

    fn render(&self, template: &str, uri: Option<&str>) -> String {
        let mut command = template.replace("{package}", &quote(&self.package));
        if let Some(uri) = uri {
            command = command.replace("{uri}", &quote(uri));
        }
        command
    }

    pub fn stop_command(&self) -> String {
        self.render(&self.commands.stop, None)
    }

    pub fn launch_command(&self) -> String {
        self.render(&self.commands.launch, None)
    }

    pub fn view_command(&self, uri: &str) -> String {
        self.render(&self.commands.view, Some(uri))
    }

    pub fn running_probe(&self) -> Option<String> {
        self.commands
            .running_probe
            .as_deref()
            .map(|t| self.render(t, None))
    }

    pub fn foreground_probe(&self) -> Option<String> {
        self.commands
            .foreground_probe
            .as_deref()
            .map(|t| self.render(t, None))
    }
}
