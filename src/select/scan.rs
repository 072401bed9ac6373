//! Directory-scan selection strategy.
//!
//! A science product is known to the pipeline iff its light-curve side-car
//! `{basename}.json` exists under the target/filter tree. Scanning those
//! side-cars is cheaper and more reliable than probing the (much larger)
//! product directories themselves.

use crate::Result;
use crate::id::{self, ObservationId};
use crate::layout;

use anyhow::Context;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ScanCriteria {
    /// Object name or alias, glob-style. `*` selects everything.
    pub object: String,
    /// Telescope code, glob-style.
    pub telescope: String,
    /// Filter band, glob-style.
    pub filter: String,
    /// Inclusive night range. An inverted range selects nothing.
    pub nights: (u16, u16),
}

impl Default for ScanCriteria {
    fn default() -> Self {
        Self {
            object: "*".to_string(),
            telescope: "*".to_string(),
            filter: "*".to_string(),
            nights: (0, 9999),
        }
    }
}

/// Enumerate observations matching the criteria by scanning side-car
/// files. Unparsable side-car names are logged and skipped.
pub fn scan(root: &Path, criteria: &ScanCriteria) -> Result<Vec<ObservationId>> {
    let (start, end) = criteria.nights;
    if start > end {
        log::warn!("empty date range: {start} > {end}");
        return Ok(Vec::new());
    }

    let pattern = root
        .join(layout::sidecar_glob(
            &criteria.telescope,
            &criteria.object,
            &criteria.filter,
        ))
        .to_string_lossy()
        .into_owned();
    log::debug!("side-car glob: {pattern}");

    let mut found = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("bad glob pattern: {pattern}"))? {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                log::warn!("unreadable side-car entry: {err}");
                continue;
            }
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let obs = match id::parse_basename(stem) {
            Ok(obs) => obs,
            Err(err) => {
                log::error!("invalid side-car name {}: {err}", path.display());
                continue;
            }
        };
        if obs.night < start || obs.night > end {
            continue;
        }
        found.push(obs);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn sidecar(root: &Path, telescope: &str, object: &str, filter: &str, basename: &str) {
        let dir = root
            .join(telescope)
            .join("processed")
            .join("targets")
            .join(object)
            .join(filter)
            .join("light-curve");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{basename}.json")), b"{}").unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        sidecar(tmp.path(), "zb08", "ngc300", "V", "zb08c_0571_24540");
        sidecar(tmp.path(), "zb08", "ngc300", "V", "zb08c_0600_00001");
        sidecar(tmp.path(), "zb08", "ngc300", "Ic", "zb08c_0571_24541");
        sidecar(tmp.path(), "jk15", "ss_for", "V", "jk15c_0671_62637");
        tmp
    }

    fn basenames(found: &[ObservationId]) -> Vec<String> {
        let mut names: Vec<String> = found.iter().map(|o| o.basename()).collect();
        names.sort();
        names
    }

    #[test]
    fn selects_by_object_and_filter() {
        let tmp = fixture();
        let found = scan(
            tmp.path(),
            &ScanCriteria {
                object: "ngc300".to_string(),
                filter: "V".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(basenames(&found), ["zb08c_0571_24540", "zb08c_0600_00001"]);
    }

    #[test]
    fn wildcards_select_everything() {
        let tmp = fixture();
        let found = scan(tmp.path(), &ScanCriteria::default()).unwrap();
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn night_range_is_inclusive() {
        let tmp = fixture();
        let found = scan(
            tmp.path(),
            &ScanCriteria {
                nights: (571, 571),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(basenames(&found), ["zb08c_0571_24540", "zb08c_0571_24541"]);
    }

    #[test]
    fn inverted_range_selects_nothing() {
        let tmp = fixture();
        let found = scan(
            tmp.path(),
            &ScanCriteria {
                nights: (600, 571),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn telescope_criterion_scopes_the_tree() {
        let tmp = fixture();
        let found = scan(
            tmp.path(),
            &ScanCriteria {
                telescope: "jk15".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(basenames(&found), ["jk15c_0671_62637"]);
    }

    #[test]
    fn malformed_sidecar_names_are_skipped() {
        let tmp = fixture();
        // Matches the glob shape but not the naming convention.
        sidecar(tmp.path(), "zb08", "ngc300", "V", "zb08c_05x1_24540");
        let found = scan(
            tmp.path(),
            &ScanCriteria {
                object: "ngc300".to_string(),
                filter: "V".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(found.len(), 2);
    }
}
