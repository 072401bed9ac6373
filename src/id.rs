//! OCA observation identifier codec.
//!
//! Every raw exposure is named `TTTTi_NNNN_CCCCC`: a 4-character telescope
//! code, 1-character instrument code, 4-digit observing night and 5-digit
//! sequence count. Processed products append a role suffix:
//!
//!   zb08c_0571_24540.fits             raw exposure
//!   zb08c_0571_24540_zdf.fits         calibrated science frame
//!   zb08c_0571_24540_master_z.fits    master zero
//!   zb08c_0571_24540_master_d.fits    master dark
//!   zb08c_0571_24540_master_f_V.fits  master flat in band V

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Canonical identifier of one raw exposure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationId {
    pub telescope: String,
    pub instrument: char,
    pub night: u16,
    pub sequence: u32,
}

impl ObservationId {
    /// Format back to the canonical basename, zero-padded.
    pub fn basename(&self) -> String {
        format!(
            "{}{}_{:04}_{:05}",
            self.telescope, self.instrument, self.night, self.sequence
        )
    }

    /// The 4-digit night directory component.
    pub fn night_dir(&self) -> String {
        format!("{:04}", self.night)
    }
}

impl std::fmt::Display for ObservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.basename())
    }
}

/// Role of a product file, derived from its name suffix.
///
/// `Raw` and `Zdf` are science products, the rest are calibration products.
/// A master flat carries the filter band it was produced in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProductKind {
    Raw,
    Zdf,
    MasterZero,
    MasterDark,
    MasterFlat(String),
}

impl ProductKind {
    /// The suffix token as it appears in filenames. `None` for raw files.
    pub fn suffix(&self) -> Option<String> {
        match self {
            ProductKind::Raw => None,
            ProductKind::Zdf => Some("zdf".to_string()),
            ProductKind::MasterZero => Some("master_z".to_string()),
            ProductKind::MasterDark => Some("master_d".to_string()),
            ProductKind::MasterFlat(band) => Some(format!("master_f_{band}")),
        }
    }

    /// Full filename for this product of `id`, always `.fits`.
    pub fn filename(&self, id: &ObservationId) -> String {
        match self.suffix() {
            Some(suffix) => format!("{}_{}.fits", id.basename(), suffix),
            None => format!("{}.fits", id.basename()),
        }
    }
}

/// The filename does not fit the OCA naming convention. Callers skip the
/// file and log, they never abort a batch over this.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("filename does not match OCA convention: {0}")]
pub struct MalformedName(pub String);

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<tel>[0-9A-Za-z]{4})(?P<ins>\w)_(?P<night>\d{4})_(?P<seq>\d{5})(?:_(?P<suffix>\w+))?\.(?:fits|fz)$",
        )
        .expect("observation name pattern")
    })
}

fn basename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<tel>[0-9A-Za-z]{4})(?P<ins>\w)_(?P<night>\d{4})_(?P<seq>\d{5})$")
            .expect("observation basename pattern")
    })
}

/// Parse an observation id and product kind out of a file name or path.
///
/// Only the final path component is considered; directories carry no
/// identity. A name without a role suffix parses as `Raw` — it may still
/// have a `zdf` counterpart, which only its containing directory can tell.
pub fn parse(name_or_path: &str) -> Result<(ObservationId, ProductKind), MalformedName> {
    let name = Path::new(name_or_path)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MalformedName(name_or_path.to_string()))?;

    let caps = name_re()
        .captures(name)
        .ok_or_else(|| MalformedName(name.to_string()))?;

    let kind = match caps.name("suffix").map(|m| m.as_str()) {
        None => ProductKind::Raw,
        Some("zdf") => ProductKind::Zdf,
        Some("master_z") => ProductKind::MasterZero,
        Some("master_d") => ProductKind::MasterDark,
        Some(s) if s.starts_with("master_f_") => {
            ProductKind::MasterFlat(s["master_f_".len()..].to_string())
        }
        Some(_) => return Err(MalformedName(name.to_string())),
    };

    Ok((id_from_captures(&caps), kind))
}

/// Parse a bare basename (`TTTTi_NNNN_CCCCC`, no suffix, no extension).
///
/// Used for side-car files whose stem is the basename of the observation
/// they prove the existence of.
pub fn parse_basename(stem: &str) -> Result<ObservationId, MalformedName> {
    let caps = basename_re()
        .captures(stem)
        .ok_or_else(|| MalformedName(stem.to_string()))?;
    Ok(id_from_captures(&caps))
}

fn id_from_captures(caps: &regex::Captures<'_>) -> ObservationId {
    // The pattern guarantees digit-only fields of bounded width.
    ObservationId {
        telescope: caps["tel"].to_string(),
        instrument: caps["ins"].chars().next().unwrap(),
        night: caps["night"].parse().unwrap(),
        sequence: caps["seq"].parse().unwrap(),
    }
}
