//! Indexed selection strategy over per-telescope report files.
//!
//! One JSON-lines report per telescope, `{telescope}_report.jsonl`, acts
//! as a pre-built index of every observation's header metadata. Predicates
//! expressible as equality/range are pushed into the store and applied
//! while streaming rows; pattern matching and derived columns (FWHM) are
//! applied after loading.

use crate::Result;
use crate::select::glob_to_regex;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One report row. Column names follow the FITS header keys they were
/// harvested from.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "TELESCOP")]
    pub telescope: String,
    /// Observation basename.
    pub id: String,
    #[serde(rename = "OBJECT", default)]
    pub object: Option<String>,
    #[serde(rename = "FILTER", default)]
    pub filter: Option<String>,
    #[serde(rename = "PI", default)]
    pub pi: Option<String>,
    #[serde(rename = "SCIPROG", default)]
    pub sciprog: Option<String>,
    #[serde(rename = "IMAGETYP", default)]
    pub imagetyp: Option<String>,
    #[serde(rename = "EXPTIME", default)]
    pub exptime: Option<f64>,
    #[serde(rename = "AIRMASS", default)]
    pub airmass: Option<f64>,
    #[serde(rename = "DATE-OBS", default)]
    pub date_obs: Option<String>,
    #[serde(default)]
    pub fwhm_x: Option<f64>,
    #[serde(default)]
    pub fwhm_y: Option<f64>,
}

impl ReportRow {
    /// Seeing estimate: mean of the two stored FWHM components.
    pub fn fwhm(&self) -> Option<f64> {
        match (self.fwhm_x, self.fwhm_y) {
            (Some(x), Some(y)) => Some((x + y) / 2.0),
            _ => None,
        }
    }

    /// Column value by report column name, for `--cols`/`--values`.
    pub fn column(&self, name: &str) -> Option<String> {
        fn num(v: Option<f64>) -> Option<String> {
            v.map(|v| v.to_string())
        }
        match name {
            "TELESCOP" => Some(self.telescope.clone()),
            "id" => Some(self.id.clone()),
            "OBJECT" => self.object.clone(),
            "FILTER" => self.filter.clone(),
            "PI" => self.pi.clone(),
            "SCIPROG" => self.sciprog.clone(),
            "IMAGETYP" => self.imagetyp.clone(),
            "EXPTIME" => num(self.exptime),
            "AIRMASS" => num(self.airmass),
            "DATE-OBS" => self.date_obs.clone(),
            "fwhm_x" => num(self.fwhm_x),
            "fwhm_y" => num(self.fwhm_y),
            "fwhm" => num(self.fwhm()),
            _ => None,
        }
    }
}

pub const COLUMNS: &[&str] = &[
    "TELESCOP", "id", "OBJECT", "FILTER", "PI", "SCIPROG", "IMAGETYP", "EXPTIME", "AIRMASS",
    "DATE-OBS", "fwhm_x", "fwhm_y", "fwhm",
];

/// Equality/range predicate the store evaluates while streaming. A row
/// missing the predicated column never matches.
#[derive(Debug, Clone)]
pub enum Predicate {
    ImageTyp(String),
    Filter(String),
    Pi(String),
    SciProg(String),
    MinExpTime(f64),
    MaxExpTime(f64),
    MinAirmass(f64),
    MaxAirmass(f64),
    DateFrom(String),
    DateTo(String),
}

impl Predicate {
    /// Inclusive DATE-OBS range. Values are timestamps compared as
    /// strings; the upper bound is extended past any suffix so a bare
    /// date still includes the whole day.
    pub fn date_range(from: &str, to: &str) -> [Predicate; 2] {
        [
            Predicate::DateFrom(from.to_string()),
            Predicate::DateTo(format!("{to}\x7f")),
        ]
    }

    fn matches(&self, row: &ReportRow) -> bool {
        fn eq(field: &Option<String>, want: &str) -> bool {
            field.as_deref() == Some(want)
        }
        match self {
            Predicate::ImageTyp(v) => eq(&row.imagetyp, v),
            Predicate::Filter(v) => eq(&row.filter, v),
            Predicate::Pi(v) => eq(&row.pi, v),
            Predicate::SciProg(v) => eq(&row.sciprog, v),
            Predicate::MinExpTime(v) => row.exptime.is_some_and(|x| x >= *v),
            Predicate::MaxExpTime(v) => row.exptime.is_some_and(|x| x <= *v),
            Predicate::MinAirmass(v) => row.airmass.is_some_and(|x| x >= *v),
            Predicate::MaxAirmass(v) => row.airmass.is_some_and(|x| x <= *v),
            Predicate::DateFrom(v) => row.date_obs.as_deref().is_some_and(|x| x >= v.as_str()),
            Predicate::DateTo(v) => row.date_obs.as_deref().is_some_and(|x| x <= v.as_str()),
        }
    }
}

/// Pattern and derived-column criteria, applied after loading.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub object: Option<String>,
    pub pi: Option<String>,
    pub sciprog: Option<String>,
    pub min_fwhm: Option<f64>,
    pub max_fwhm: Option<f64>,
}

struct CompiledPost {
    object: Option<Regex>,
    pi: Option<Regex>,
    sciprog: Option<Regex>,
    min_fwhm: Option<f64>,
    max_fwhm: Option<f64>,
}

impl PostFilter {
    fn compile(&self) -> Result<CompiledPost> {
        // PI and SCIPROG were already pushed down as equality unless they
        // carry wildcards.
        let wild = |field: &Option<String>| -> Result<Option<Regex>> {
            match field {
                Some(p) if p.contains('*') => Ok(Some(glob_to_regex(p)?)),
                _ => Ok(None),
            }
        };
        Ok(CompiledPost {
            object: self.object.as_deref().map(glob_to_regex).transpose()?,
            pi: wild(&self.pi)?,
            sciprog: wild(&self.sciprog)?,
            min_fwhm: self.min_fwhm,
            max_fwhm: self.max_fwhm,
        })
    }
}

impl CompiledPost {
    fn matches(&self, row: &ReportRow) -> bool {
        fn text(re: &Option<Regex>, field: &Option<String>) -> bool {
            match re {
                Some(re) => field.as_deref().is_some_and(|v| re.is_match(v)),
                None => true,
            }
        }
        if !text(&self.object, &row.object)
            || !text(&self.pi, &row.pi)
            || !text(&self.sciprog, &row.sciprog)
        {
            return false;
        }
        if self.min_fwhm.is_some() || self.max_fwhm.is_some() {
            let Some(fwhm) = row.fwhm() else {
                return false;
            };
            if self.min_fwhm.is_some_and(|v| fwhm < v) || self.max_fwhm.is_some_and(|v| fwhm > v) {
                return false;
            }
        }
        true
    }
}

/// The report store: a directory of `{telescope}_report.jsonl` files.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Report files to consult: the named telescope's file, or every
    /// report present.
    fn report_files(&self, telescope: Option<&str>) -> Result<Vec<PathBuf>> {
        if let Some(telescope) = telescope {
            return Ok(vec![self.dir.join(format!("{telescope}_report.jsonl"))]);
        }
        let pattern = self.dir.join("*_report.jsonl");
        let pattern = pattern.to_string_lossy();
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("bad report glob: {pattern}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Stream rows through the pushdown predicates. Missing report files
    /// and malformed rows are logged and skipped.
    pub fn load(&self, telescope: Option<&str>, pushdown: &[Predicate]) -> Result<Vec<ReportRow>> {
        let files = self.report_files(telescope)?;
        if files.is_empty() {
            anyhow::bail!("no report files found in {}", self.dir.display());
        }
        let mut rows = Vec::new();
        for file in files {
            if !file.is_file() {
                log::warn!("report file not found: {}", file.display());
                continue;
            }
            log::info!("loading {}", file.display());
            let text = fs::read_to_string(&file)
                .with_context(|| format!("read report {}", file.display()))?;
            for (lineno, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let row: ReportRow = match serde_json::from_str(line) {
                    Ok(row) => row,
                    Err(err) => {
                        log::warn!("bad report row at {}:{}: {err}", file.display(), lineno + 1);
                        continue;
                    }
                };
                if pushdown.iter().all(|p| p.matches(&row)) {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }
}

/// Run a full query: pushdown at the store, post-filters after loading.
pub fn query(
    store: &ReportStore,
    telescope: Option<&str>,
    pushdown: &[Predicate],
    post: &PostFilter,
) -> Result<Vec<ReportRow>> {
    let rows = store.load(telescope, pushdown)?;
    log::info!("rows after pushdown filters: {}", rows.len());
    let compiled = post.compile()?;
    let rows: Vec<ReportRow> = rows.into_iter().filter(|r| compiled.matches(r)).collect();
    log::info!("observations after all filters: {}", rows.len());
    Ok(rows)
}
