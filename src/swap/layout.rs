//! On-disk layout of stored snapshots

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of the manifest written into every extended archive
pub const MANIFEST_FILE: &str = "backup_info.txt";

const LOCK_FILE: &str = ".live-slot.lock";

/// Storage partition a profile lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Profiles owned by the operator
    Own,
    /// Profiles held on behalf of customers
    Customer,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Own => "own",
            Namespace::Customer => "customer",
        }
    }

    pub fn all() -> [Namespace; 2] {
        [Namespace::Own, Namespace::Customer]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "own" => Ok(Namespace::Own),
            "customer" => Ok(Namespace::Customer),
            other => Err(format!("unknown namespace '{}'", other)),
        }
    }
}

/// Which variant of snapshot is stored for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Simple,
    Extended,
}

/// Resolves snapshot and staging locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
    staging_root: PathBuf,
    primary_file_name: String,
}

impl StorageLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        staging_root: impl Into<PathBuf>,
        primary_file_name: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            staging_root: staging_root.into(),
            primary_file_name: primary_file_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn primary_file_name(&self) -> &str {
        &self.primary_file_name
    }

    pub fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    pub fn profile_dir(&self, namespace: Namespace, name: &str) -> PathBuf {
        self.namespace_dir(namespace).join(name)
    }

    /// Stored copy of the primary state file
    pub fn primary_snapshot(&self, namespace: Namespace, name: &str) -> PathBuf {
        self.profile_dir(namespace, name)
            .join(&self.primary_file_name)
    }

    /// Archive of auxiliary trees for the extended variant
    pub fn archive_path(&self, namespace: Namespace, name: &str) -> PathBuf {
        self.profile_dir(namespace, name)
            .join(format!("{}.zip", name))
    }

    /// Scratch directory used while packing or unpacking one profile
    pub fn staging_dir(&self, name: &str, purpose: &str) -> PathBuf {
        self.staging_root
            .join(format!("slotswap_{}_{}", purpose, name))
    }

    /// Lock file shared by every process swapping through this root
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Variant stored for `name`, or `None` if nothing usable is stored
    pub fn snapshot_kind(&self, namespace: Namespace, name: &str) -> Option<SnapshotKind> {
        let primary = self.primary_snapshot(namespace, name).is_file();
        let archive = self.archive_path(namespace, name).is_file();
        match (primary, archive) {
            (true, true) => Some(SnapshotKind::Extended),
            (true, false) => Some(SnapshotKind::Simple),
            _ => None,
        }
    }

    /// Profile names stored in a namespace, sorted.
    ///
    /// A directory counts when it holds a primary snapshot or an archive.
    /// A missing namespace directory yields an empty list.
    pub fn list_profiles(&self, namespace: Namespace) -> io::Result<Vec<String>> {
        let dir = self.namespace_dir(namespace);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.primary_snapshot(namespace, &name).is_file()
                || self.archive_path(namespace, &name).is_file()
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(root: &Path) -> StorageLayout {
        StorageLayout::new(root.join("store"), root.join("tmp"), "state.dat")
    }

    #[test]
    fn test_paths() {
        let layout = StorageLayout::new("/sdcard/slotswap", "/data/local/tmp", "state.dat");
        assert_eq!(
            layout.primary_snapshot(Namespace::Customer, "alice"),
            PathBuf::from("/sdcard/slotswap/customer/alice/state.dat")
        );
        assert_eq!(
            layout.archive_path(Namespace::Own, "main"),
            PathBuf::from("/sdcard/slotswap/own/main/main.zip")
        );
        assert_eq!(
            layout.staging_dir("main", "backup"),
            PathBuf::from("/data/local/tmp/slotswap_backup_main")
        );
        assert_eq!(
            layout.lock_path(),
            PathBuf::from("/sdcard/slotswap/.live-slot.lock")
        );
    }

    #[test]
    fn test_missing_namespace_is_empty() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        assert!(layout.list_profiles(Namespace::Own).unwrap().is_empty());
    }

    #[test]
    fn test_empty_namespace_is_empty() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        std::fs::create_dir_all(layout.namespace_dir(Namespace::Customer)).unwrap();
        assert!(layout.list_profiles(Namespace::Customer).unwrap().is_empty());
    }

    #[test]
    fn test_list_profiles_skips_incomplete_dirs() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        for name in ["beta", "alpha"] {
            let dir = layout.profile_dir(Namespace::Own, name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(layout.primary_snapshot(Namespace::Own, name), b"x").unwrap();
        }
        std::fs::create_dir_all(layout.profile_dir(Namespace::Own, "empty")).unwrap();
        std::fs::write(layout.namespace_dir(Namespace::Own).join("stray.txt"), b"x").unwrap();

        assert_eq!(
            layout.list_profiles(Namespace::Own).unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert_eq!(
            layout.snapshot_kind(Namespace::Own, "alpha"),
            Some(SnapshotKind::Simple)
        );
        assert_eq!(layout.snapshot_kind(Namespace::Own, "empty"), None);
    }

    #[test]
    fn test_namespace_parse() {
        assert_eq!("OWN".parse::<Namespace>(), Ok(Namespace::Own));
        assert_eq!("customer".parse::<Namespace>(), Ok(Namespace::Customer));
        assert!("other".parse::<Namespace>().is_err());
    }
}
