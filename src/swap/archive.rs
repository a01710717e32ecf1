//! Zip packing of auxiliary state trees

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use zip::write::FileOptions;

use crate::swap::layout::MANIFEST_FILE;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry escapes the destination: {0}")]
    UnsafeEntry(String),

    #[error("Nothing to archive in {0}")]
    Empty(PathBuf),
}

/// Contents of `backup_info.txt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupManifest {
    pub profile: String,
    pub package: String,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub entries: Vec<String>,
}

impl BackupManifest {
    pub fn render(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("profile: {}\n", self.profile));
        text.push_str(&format!("package: {}\n", self.package));
        text.push_str(&format!("created_at: {}\n", self.created_at.to_rfc3339()));
        if let Some(user_id) = &self.user_id {
            text.push_str(&format!("user_id: {}\n", user_id));
        }
        text.push_str("entries:\n");
        for entry in &self.entries {
            text.push_str(&format!("  - {}\n", entry));
        }
        text
    }

    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, self.render())?;
        Ok(path)
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        let rel = path
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .to_string_lossy()
            .replace('\\', "/");
        if file_type.is_dir() {
            out.push((format!("{}/", rel), path.clone()));
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            out.push((rel, path));
        }
    }
    Ok(())
}

/// Pack every file under `src_dir` into a zip at `dest`.
///
/// The archive is written beside `dest` and renamed into place, so an existing
/// archive is only replaced once packing succeeded. Returns the number of files.
pub fn pack_dir(src_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let mut entries = Vec::new();
    collect_files(src_dir, src_dir, &mut entries)?;
    if entries.is_empty() {
        return Err(ArchiveError::Empty(src_dir.to_path_buf()));
    }

    let partial = dest.with_extension("zip.partial");
    let zip_file = File::create(&partial)?;
    let mut zip = zip::ZipWriter::new(zip_file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut files = 0;
    for (name, path) in &entries {
        if name.ends_with('/') {
            zip.add_directory(name.as_str(), options)?;
        } else {
            zip.start_file(name.as_str(), options)?;
            let mut src = File::open(path)?;
            io::copy(&mut src, &mut zip)?;
            files += 1;
        }
    }
    let mut zip_file = zip.finish()?;
    zip_file.flush()?;
    drop(zip_file);

    fs::rename(&partial, dest)?;
    Ok(files)
}

/// Unpack `archive` into `dest_dir`, refusing entries that would land outside it.
/// Returns the number of files written.
pub fn unpack(archive: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive)?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest_dir)?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let rel = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let out = dest_dir.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut dst = File::create(&out)?;
        io::copy(&mut entry, &mut dst)?;
        files += 1;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pack_and_unpack_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("cache/nested")).unwrap();
        fs::write(src.join("prefs.xml"), b"<map/>").unwrap();
        fs::write(src.join("cache/nested/blob.bin"), [0u8, 1, 2, 255]).unwrap();

        let zip_path = tmp.path().join("main.zip");
        assert_eq!(pack_dir(&src, &zip_path).unwrap(), 2);
        assert!(zip_path.exists());
        assert!(!tmp.path().join("main.zip.partial").exists());

        let out = tmp.path().join("out");
        assert_eq!(unpack(&zip_path, &out).unwrap(), 2);
        assert_eq!(fs::read(out.join("prefs.xml")).unwrap(), b"<map/>");
        assert_eq!(
            fs::read(out.join("cache/nested/blob.bin")).unwrap(),
            vec![0u8, 1, 2, 255]
        );
    }

    #[test]
    fn test_pack_empty_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let err = pack_dir(&src, &tmp.path().join("x.zip")).unwrap_err();
        assert!(matches!(err, ArchiveError::Empty(_)));
    }

    #[test]
    fn test_unpack_rejects_escaping_entries() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("evil.zip");
        {
            let file = File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("../escape.txt", FileOptions::default())
                .unwrap();
            zip.write_all(b"nope").unwrap();
            zip.finish().unwrap();
        }
        let err = unpack(&zip_path, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntry(_)));
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_manifest_render() {
        let manifest = BackupManifest {
            profile: "main".into(),
            package: "com.scopely.monopolygo".into(),
            created_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            user_id: Some("112233".into()),
            entries: vec!["playerprefs.xml".into()],
        };
        let text = manifest.render();
        assert!(text.contains("profile: main\n"));
        assert!(text.contains("user_id: 112233\n"));
        assert!(text.contains("  - playerprefs.xml\n"));
    }
}
