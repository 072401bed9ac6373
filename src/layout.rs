//! Storage-root layout: where each product of an observation must live.
//!
//! The directory scheme is fixed and shared by every site; only the root
//! differs. `locate` is a pure mapping — existence is the caller's concern.

use crate::Result;
use crate::id::{ObservationId, ProductKind};

use anyhow::bail;
use std::path::{Path, PathBuf};

/// Known site roots, probed in order. First existing directory wins.
const ROOT_PROPOSITIONS: &[(&str, &str)] = &[
    ("OCM", "/data/fits"),
    ("CAMK", "/work/vela/oca/fits"),
    ("Mik", "/Users/Shared/oca_data/fits"),
];

/// Known locations of the per-telescope report files.
const ANALYTIC_PROPOSITIONS: &[&str] = &["/work/vela/oca/analytic"];

/// Resolve the FITS storage root: explicit `--dir` if given, site
/// autodetection otherwise. Failure here is fatal — nothing can be located
/// without a root.
pub fn resolve_root(dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = dir {
        if !dir.is_dir() {
            bail!("storage root is not a directory: {}", dir.display());
        }
        log::debug!("using provided storage root: {}", dir.display());
        return Ok(dir.to_path_buf());
    }
    for (schema, candidate) in ROOT_PROPOSITIONS {
        let path = Path::new(candidate);
        if path.is_dir() {
            log::info!("dir schema {schema}, storage root: {}", path.display());
            return Ok(path.to_path_buf());
        }
    }
    bail!("no FITS storage root found; use --dir to specify one");
}

/// Resolve the analytic directory holding `{telescope}_report.jsonl` files.
pub fn resolve_analytic(dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = dir {
        if !dir.is_dir() {
            bail!("analytic dir is not a directory: {}", dir.display());
        }
        return Ok(dir.to_path_buf());
    }
    for candidate in ANALYTIC_PROPOSITIONS {
        let path = Path::new(candidate);
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    }
    bail!("no analytic dir found; use --analytic-dir to specify one");
}

/// Canonical directory that must contain the given product. Performs no
/// existence check.
pub fn locate(id: &ObservationId, kind: &ProductKind, root: &Path) -> PathBuf {
    let tel = root.join(&id.telescope);
    match kind {
        ProductKind::Raw => tel.join("raw").join(id.night_dir()),
        ProductKind::Zdf => tel
            .join("processed")
            .join("science")
            .join(id.night_dir())
            .join(id.basename()),
        ProductKind::MasterZero => tel.join("processed").join("zeros").join(id.basename()),
        ProductKind::MasterDark => tel.join("processed").join("darks").join(id.basename()),
        ProductKind::MasterFlat(band) => tel
            .join("processed")
            .join("flats")
            .join(band)
            .join(id.basename()),
    }
}

/// Canonical path of the raw exposure file.
pub fn raw_file(id: &ObservationId, root: &Path) -> PathBuf {
    locate(id, &ProductKind::Raw, root).join(ProductKind::Raw.filename(id))
}

/// Canonical path of the calibrated science frame.
pub fn zdf_file(id: &ObservationId, root: &Path) -> PathBuf {
    locate(id, &ProductKind::Zdf, root).join(ProductKind::Zdf.filename(id))
}

/// Directory the lineage walker inspects when expanding a node.
///
/// Science products expand in the ZDF science directory: a raw input may
/// have a zdf counterpart there, and that directory is where its
/// calibration references live. Calibration products expand in their own
/// canonical directories.
pub fn expansion_dir(id: &ObservationId, kind: &ProductKind, root: &Path) -> PathBuf {
    match kind {
        ProductKind::Raw => locate(id, &ProductKind::Zdf, root),
        _ => locate(id, kind, root),
    }
}

/// Glob pattern (relative to the root) matching light-curve side-car files
/// for the given telescope/object/filter criteria. Each side-car proves the
/// paired science product is known to the pipeline.
pub fn sidecar_glob(telescope: &str, object: &str, filter: &str) -> String {
    format!("{telescope}/processed/targets/{object}/{filter}/light-curve/{telescope}?_????_?????.json")
}
