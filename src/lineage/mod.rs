//! Calibration lineage walker.
//!
//! Reconstructs, for one science frame, the chain of calibration products
//! that contributed to it. The dependency graph is implicit: a product's
//! directory contains (links to) the files it was produced from.
//!
//!     ZDF / raw
//!     ├── master_flat ──► master_dark ──► master_zero ──► raw_zero
//!     │                │               └── raw_dark
//!     │                └── raw_flat
//!     ├── master_dark ──► master_zero ──► raw_zero
//!     │               └── raw_dark
//!     └── master_zero ──► raw_zero
//!
//! Emission and recursion are independent decisions: a node is emitted iff
//! its kind was requested, and recursed into iff any requested kind is
//! still reachable below it. Requesting only `raw_zero` descends through
//! flats and darks without emitting either.

mod lister;

pub use lister::{DirLister, FsLister};

use crate::id::{self, ObservationId, ProductKind};
use crate::layout;

use std::io;
use std::path::{Path, PathBuf};

/// The dependency chain is at most flat→dark→zero→raw deep; anything past
/// this means the storage root content is lying to us.
const MAX_DEPTH: usize = 10;

/// Role of an emitted node in the calibration tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CalibKind {
    Source,
    MasterZero,
    MasterDark,
    MasterFlat,
    RawZero,
    RawDark,
    RawFlat,
}

impl CalibKind {
    pub fn label(&self) -> &'static str {
        match self {
            CalibKind::Source => "source",
            CalibKind::MasterZero => "master_zero",
            CalibKind::MasterDark => "master_dark",
            CalibKind::MasterFlat => "master_flat",
            CalibKind::RawZero => "raw_zero",
            CalibKind::RawDark => "raw_dark",
            CalibKind::RawFlat => "raw_flat",
        }
    }
}

/// Which calibration kinds the caller asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub raw_zero: bool,
    pub raw_dark: bool,
    pub raw_flat: bool,
    pub master_zero: bool,
    pub master_dark: bool,
    pub master_flat: bool,
}

impl Selection {
    /// Should a discovered node of this role be emitted?
    fn emits(&self, kind: CalibKind) -> bool {
        match kind {
            CalibKind::Source => true,
            CalibKind::MasterZero => self.master_zero,
            CalibKind::MasterDark => self.master_dark,
            CalibKind::MasterFlat => self.master_flat,
            CalibKind::RawZero => self.raw_zero,
            CalibKind::RawDark => self.raw_dark,
            CalibKind::RawFlat => self.raw_flat,
        }
    }

    /// Should the walker descend into a discovered product to look for
    /// requested kinds further down the chain? Raw files are leaves.
    fn descends(&self, product: &ProductKind) -> bool {
        match product {
            ProductKind::MasterZero => self.raw_zero,
            ProductKind::MasterDark => self.master_zero || self.raw_zero || self.raw_dark,
            ProductKind::MasterFlat(_) => {
                self.master_dark
                    || self.master_zero
                    || self.raw_zero
                    || self.raw_dark
                    || self.raw_flat
            }
            ProductKind::Raw | ProductKind::Zdf => false,
        }
    }
}

/// Role of a suffixless (raw) file, inferred purely from the kind of
/// product directory it sits in. Science directories give no role.
pub fn raw_role(parent: &ProductKind) -> Option<CalibKind> {
    match parent {
        ProductKind::MasterZero => Some(CalibKind::RawZero),
        ProductKind::MasterDark => Some(CalibKind::RawDark),
        ProductKind::MasterFlat(_) => Some(CalibKind::RawFlat),
        ProductKind::Raw | ProductKind::Zdf => None,
    }
}

/// One discovered calibration file. A plain value, produced fresh per
/// traversal; depth is the number of dependency hops from the requested
/// root, recorded at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibNode {
    pub id: ObservationId,
    pub product: ProductKind,
    pub kind: CalibKind,
    pub path: PathBuf,
    pub depth: usize,
}

impl CalibNode {
    /// Identity of the underlying file regardless of which path it was
    /// reached through. Used by the emitter for deduplication.
    pub fn dedup_key(&self) -> String {
        match self.product.suffix() {
            Some(suffix) => format!("{}_{}", self.id.basename(), suffix),
            None => self.id.basename(),
        }
    }
}

/// Discover the calibration dependents of `(id, kind)`, depth-first.
///
/// Emitted nodes appear before the results of their own expansion, so the
/// sequence renders directly as an indented tree. A missing product
/// directory yields an empty result — absence of calibration simply means
/// none was recorded.
pub fn walk(
    depth: usize,
    id: &ObservationId,
    kind: &ProductKind,
    root: &Path,
    policy: &Selection,
    lister: &dyn DirLister,
) -> Vec<CalibNode> {
    let mut found = Vec::new();

    if depth >= MAX_DEPTH {
        log::warn!("calibration chain deeper than {MAX_DEPTH} at {id}, not descending further");
        return found;
    }

    let dir = layout::expansion_dir(id, kind, root);
    let entries = match lister.list(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return found,
        Err(err) => {
            log::warn!("cannot list {}: {err}", dir.display());
            return found;
        }
    };

    log::debug!("expanding {id} ({kind:?}), looking in {}", dir.display());

    for file in entries {
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            log::warn!("skipping non-UTF-8 entry in {}", dir.display());
            continue;
        };
        let (child_id, child_product) = match id::parse(name) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("skipping unrecognized file in {}: {err}", dir.display());
                continue;
            }
        };

        // A product directory usually links to the file it was derived
        // from under the very name being expanded; skip that self entry.
        if child_id == *id && child_product == *kind {
            continue;
        }

        match &child_product {
            ProductKind::Raw => match raw_role(kind) {
                Some(role) => {
                    if policy.emits(role) {
                        // Raw entries in product dirs are typically symlinks;
                        // emit the canonical raw storage location instead.
                        found.push(CalibNode {
                            path: layout::raw_file(&child_id, root),
                            id: child_id,
                            product: ProductKind::Raw,
                            kind: role,
                            depth: depth + 1,
                        });
                    }
                }
                None => {
                    if *kind == ProductKind::Zdf && child_id == *id {
                        // Expected: link to the original raw science frame.
                    } else {
                        log::warn!("unexpected raw {child_id} in {}", dir.display());
                    }
                }
            },
            ProductKind::Zdf => {
                log::debug!("ignoring zdf product {child_id} in {}", dir.display());
            }
            ProductKind::MasterZero | ProductKind::MasterDark | ProductKind::MasterFlat(_) => {
                let role = match &child_product {
                    ProductKind::MasterZero => CalibKind::MasterZero,
                    ProductKind::MasterDark => CalibKind::MasterDark,
                    _ => CalibKind::MasterFlat,
                };
                if policy.emits(role) {
                    found.push(CalibNode {
                        id: child_id.clone(),
                        product: child_product.clone(),
                        kind: role,
                        path: layout::locate(&child_id, &child_product, root).join(name),
                        depth: depth + 1,
                    });
                }
                if policy.descends(&child_product) {
                    found.extend(walk(
                        depth + 1,
                        &child_id,
                        &child_product,
                        root,
                        policy,
                        lister,
                    ));
                }
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    /// Fixed listings keyed by directory; anything else is NotFound.
    struct FakeLister(BTreeMap<PathBuf, Vec<&'static str>>);

    impl DirLister for FakeLister {
        fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
            match self.0.get(dir) {
                Some(names) => Ok(names.iter().map(|n| dir.join(n)).collect()),
                None => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        }
    }

    fn root() -> PathBuf {
        PathBuf::from("/r")
    }

    /// One science frame whose chain is
    /// zdf → master_flat → master_dark → master_zero → raw_zero.
    fn fixture() -> (ObservationId, FakeLister) {
        let science = id::parse("zb08c_0571_24540_zdf.fits").unwrap().0;
        let mut dirs = BTreeMap::new();
        dirs.insert(
            PathBuf::from("/r/zb08/processed/science/0571/zb08c_0571_24540"),
            vec![
                "zb08c_0571_24540_zdf.fits",
                "zb08c_0571_24540.fits", // link to the original raw frame
                "zb08c_0500_00010_master_f_V.fits",
            ],
        );
        dirs.insert(
            PathBuf::from("/r/zb08/processed/flats/V/zb08c_0500_00010"),
            vec![
                "zb08c_0500_00010_master_f_V.fits", // self
                "zb08c_0490_00005_master_d.fits",
                "zb08c_0500_00011.fits", // raw flat
            ],
        );
        dirs.insert(
            PathBuf::from("/r/zb08/processed/darks/zb08c_0490_00005"),
            vec![
                "zb08c_0490_00005_master_d.fits", // self
                "zb08c_0480_00003_master_z.fits",
                "zb08c_0490_00006.fits", // raw dark
            ],
        );
        dirs.insert(
            PathBuf::from("/r/zb08/processed/zeros/zb08c_0480_00003"),
            vec![
                "zb08c_0480_00003_master_z.fits", // self
                "zb08c_0480_00001.fits",
                "zb08c_0480_00002.fits",
            ],
        );
        (science, FakeLister(dirs))
    }

    fn walk_science(policy: Selection) -> Vec<CalibNode> {
        let (science, lister) = fixture();
        walk(0, &science, &ProductKind::Zdf, &root(), &policy, &lister)
    }

    #[test]
    fn master_zero_alone_is_reached_through_silent_intermediates() {
        let nodes = walk_science(Selection {
            master_zero: true,
            ..Selection::default()
        });
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind, CalibKind::MasterZero);
        assert_eq!(nodes[0].depth, 3);
        assert_eq!(
            nodes[0].path,
            PathBuf::from(
                "/r/zb08/processed/zeros/zb08c_0480_00003/zb08c_0480_00003_master_z.fits"
            )
        );
    }

    #[test]
    fn raw_zero_alone_descends_to_depth_four() {
        let nodes = walk_science(Selection {
            raw_zero: true,
            ..Selection::default()
        });
        assert_eq!(nodes.len(), 2);
        for node in &nodes {
            assert_eq!(node.kind, CalibKind::RawZero);
            assert_eq!(node.depth, 4);
        }
    }

    #[test]
    fn depth_is_independent_of_ancestor_emission() {
        let quiet = walk_science(Selection {
            master_zero: true,
            ..Selection::default()
        });
        let full = walk_science(Selection {
            master_zero: true,
            master_dark: true,
            master_flat: true,
            ..Selection::default()
        });
        let depth_of = |nodes: &[CalibNode]| {
            nodes
                .iter()
                .find(|n| n.kind == CalibKind::MasterZero)
                .unwrap()
                .depth
        };
        assert_eq!(depth_of(&quiet), 3);
        assert_eq!(depth_of(&full), 3);
    }

    #[test]
    fn emitted_nodes_precede_their_expansion() {
        let nodes = walk_science(Selection {
            master_flat: true,
            master_dark: true,
            master_zero: true,
            raw_zero: true,
            raw_dark: true,
            raw_flat: true,
            ..Selection::default()
        });
        let kinds: Vec<(CalibKind, usize)> = nodes.iter().map(|n| (n.kind, n.depth)).collect();
        assert_eq!(
            kinds,
            vec![
                (CalibKind::MasterFlat, 1),
                (CalibKind::MasterDark, 2),
                (CalibKind::MasterZero, 3),
                (CalibKind::RawZero, 4),
                (CalibKind::RawZero, 4),
                (CalibKind::RawDark, 3),
                (CalibKind::RawFlat, 2),
            ]
        );
    }

    #[test]
    fn raw_siblings_emit_canonical_storage_paths() {
        let nodes = walk_science(Selection {
            raw_dark: true,
            ..Selection::default()
        });
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            nodes[0].path,
            PathBuf::from("/r/zb08/raw/0490/zb08c_0490_00006.fits")
        );
    }

    #[test]
    fn missing_directory_yields_empty() {
        let lister = FakeLister(BTreeMap::new());
        let science = id::parse("zb08c_0571_24540_zdf.fits").unwrap().0;
        let nodes = walk(
            0,
            &science,
            &ProductKind::Zdf,
            &root(),
            &Selection {
                master_zero: true,
                ..Selection::default()
            },
            &lister,
        );
        assert!(nodes.is_empty());
    }

    #[test]
    fn raw_input_expands_in_its_science_dir() {
        // A suffixless input may still have a zdf counterpart; its
        // calibration references live in the science directory.
        let (science, lister) = fixture();
        let nodes = walk(
            0,
            &science,
            &ProductKind::Raw,
            &root(),
            &Selection {
                master_flat: true,
                ..Selection::default()
            },
            &lister,
        );
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind, CalibKind::MasterFlat);
        assert_eq!(nodes[0].depth, 1);
    }

    #[test]
    fn walk_from_a_master_directly() {
        let (_, lister) = fixture();
        let zero = id::parse("zb08c_0480_00003_master_z.fits").unwrap().0;
        let nodes = walk(
            0,
            &zero,
            &ProductKind::MasterZero,
            &root(),
            &Selection {
                raw_zero: true,
                ..Selection::default()
            },
            &lister,
        );
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.depth == 1));
    }

    #[test]
    fn dedup_key_includes_role_suffix() {
        let (id, product) = {
            let (obs, kind) = id::parse("zb08c_0480_00003_master_z.fits").unwrap();
            (obs, kind)
        };
        let node = CalibNode {
            path: PathBuf::new(),
            kind: CalibKind::MasterZero,
            depth: 1,
            id,
            product,
        };
        assert_eq!(node.dedup_key(), "zb08c_0480_00003_master_z");
    }
}
