//! JSON structuring of indented file lists.
//!
//! The calibration emitter encodes the dependency tree as one space of
//! indentation per depth level. This stage parses that encoding back into
//! nested observations, reconstructing canonical paths for lines that
//! carry only a file name.

use crate::id;
use crate::layout;

use serde::Serialize;
use std::path::Path;

/// One depth-0 input line and everything indented under it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Observation {
    pub observation: String,
    pub name: String,
    pub path: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
}

/// Expand a bare product name to its canonical path under `root`. Names
/// outside the convention pass through unchanged.
pub fn reconstruct_path(name: &str, root: &Path) -> String {
    match id::parse(name) {
        Ok((obs, kind)) => layout::locate(&obs, &kind, root)
            .join(name)
            .display()
            .to_string(),
        Err(err) => {
            log::warn!("cannot reconstruct path: {err}");
            name.to_string()
        }
    }
}

/// Parse an indentation-coded list into nested observations.
///
/// Depth 0 opens a new observation; deeper lines attach to the last entry
/// one level up. A line deeper than anything seen so far clamps to the
/// deepest open level.
pub fn structure(lines: &[String], root: Option<&Path>) -> Vec<Observation> {
    let mut observations: Vec<Observation> = Vec::new();

    for line in lines {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let depth = line.len() - line.trim_start_matches(' ').len();
        let text = line.trim();

        let name = Path::new(text)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| text.to_string());
        let path = match root {
            Some(root) if !text.starts_with('/') => reconstruct_path(&name, root),
            _ => text.to_string(),
        };

        if depth == 0 {
            let observation = Path::new(&name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            observations.push(Observation {
                observation,
                name,
                path,
                files: Vec::new(),
            });
        } else if let Some(current) = observations.last_mut() {
            attach(
                &mut current.files,
                depth,
                FileEntry {
                    name,
                    path,
                    files: Vec::new(),
                },
            );
        } else {
            log::warn!("indented line before any observation, skipping: {text}");
        }
    }

    observations
}

fn attach(files: &mut Vec<FileEntry>, depth: usize, entry: FileEntry) {
    if depth <= 1 {
        files.push(entry);
        return;
    }
    match files.last_mut() {
        Some(last) => attach(&mut last.files, depth - 1, entry),
        None => files.push(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nests_by_indentation() {
        let input = lines(&[
            "/d/zb08c_0571_24540_zdf.fits",
            " /d/zb08c_0500_00010_master_f_V.fits",
            "  /d/zb08c_0490_00005_master_d.fits",
            "   /d/zb08c_0480_00003_master_z.fits",
            "  /d/zb08c_0500_00011.fits",
            "/d/zb08c_0600_00001_zdf.fits",
        ]);
        let obs = structure(&input, None);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].observation, "zb08c_0571_24540_zdf");
        assert_eq!(obs[0].files.len(), 1);
        let flat = &obs[0].files[0];
        assert_eq!(flat.name, "zb08c_0500_00010_master_f_V.fits");
        assert_eq!(flat.files.len(), 2);
        assert_eq!(flat.files[0].files.len(), 1);
        assert_eq!(
            flat.files[0].files[0].name,
            "zb08c_0480_00003_master_z.fits"
        );
        assert!(obs[1].files.is_empty());
    }

    #[test]
    fn reconstructs_paths_for_bare_names() {
        let root = PathBuf::from("/data/fits");
        let input = lines(&["zb08c_0571_24540_zdf.fits", " zb08c_0480_00003_master_z.fits"]);
        let obs = structure(&input, Some(&root));
        assert_eq!(
            obs[0].path,
            "/data/fits/zb08/processed/science/0571/zb08c_0571_24540/zb08c_0571_24540_zdf.fits"
        );
        assert_eq!(
            obs[0].files[0].path,
            "/data/fits/zb08/processed/zeros/zb08c_0480_00003/zb08c_0480_00003_master_z.fits"
        );
    }

    #[test]
    fn master_flat_recovers_band_directory() {
        let root = PathBuf::from("/data/fits");
        assert_eq!(
            reconstruct_path("zb08c_0500_00010_master_f_V.fits", &root),
            "/data/fits/zb08/processed/flats/V/zb08c_0500_00010/zb08c_0500_00010_master_f_V.fits"
        );
    }

    #[test]
    fn absolute_paths_are_kept_as_given() {
        let root = PathBuf::from("/data/fits");
        let input = lines(&["/elsewhere/zb08c_0571_24540_zdf.fits"]);
        let obs = structure(&input, Some(&root));
        assert_eq!(obs[0].path, "/elsewhere/zb08c_0571_24540_zdf.fits");
    }

    #[test]
    fn unknown_names_pass_through() {
        let root = PathBuf::from("/data/fits");
        assert_eq!(reconstruct_path("weird.fits", &root), "weird.fits");
    }

    #[test]
    fn blank_lines_and_orphans_are_skipped() {
        let input = lines(&["", "   ", " orphan.fits", "zb08c_0571_24540_zdf.fits"]);
        let obs = structure(&input, None);
        assert_eq!(obs.len(), 1);
        assert!(obs[0].files.is_empty());
    }

    #[test]
    fn serializes_without_empty_children() {
        let input = lines(&["a_zdf.fits"]);
        let json = serde_json::to_string(&structure(&input, None)).unwrap();
        assert!(json.contains(r#""files":[]"#)); // observation keeps files
        let input = lines(&["a_zdf.fits", " b.fits"]);
        let json = serde_json::to_string(&structure(&input, None)).unwrap();
        // nested entries omit their empty files array
        assert!(!json.contains(r#""files":[]"#));
    }
}
