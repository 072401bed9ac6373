//! Directory listing capability.
//!
//! The calibration dependency graph is encoded purely in directory layout,
//! so "what product files sit in this directory" is the walker's only
//! window into it. Keeping that behind a trait lets tests inject fixed,
//! ordered listings — a real filesystem promises no order at all.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait DirLister {
    /// Product files (`.fits`/`.fz`) in `dir`, in no particular order.
    ///
    /// A missing directory is reported as `NotFound`; the walker treats it
    /// as "no calibration recorded here".
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// The real filesystem.
pub struct FsLister;

impl DirLister for FsLister {
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if matches!(ext, Some("fits") | Some("fz")) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_product_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.fits", "b.fz", "c.txt", "notes.json"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let mut names: Vec<String> = FsLister
            .list(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["a.fits", "b.fz"]);
    }

    #[test]
    fn missing_dir_is_not_found() {
        let err = FsLister.list(Path::new("/no/such/dir")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
