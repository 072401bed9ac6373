//! Rendering of discovered calibration trees as an indented text stream.
//!
//! The emitter owns the run-scoped state: one deduplication set and one
//! set of per-kind counters for the whole batch, passed explicitly into
//! each root's emission rather than living in a global.

use crate::Result;
use crate::id::ProductKind;
use crate::lineage::{CalibKind, CalibNode};

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct EmitOptions {
    /// Do not echo the input files themselves.
    pub skip_source: bool,
    /// Emit each physical file at most once across the whole run.
    pub skip_duplicates: bool,
    /// Print file names instead of full paths.
    pub names_only: bool,
    /// Flat output, no depth indentation.
    pub no_indent: bool,
}

/// Stats bucket an input line belongs to. Master products fed in as
/// sources still count under their own kind.
pub fn source_kind(product: Option<&ProductKind>) -> CalibKind {
    match product {
        Some(ProductKind::MasterZero) => CalibKind::MasterZero,
        Some(ProductKind::MasterDark) => CalibKind::MasterDark,
        Some(ProductKind::MasterFlat(_)) => CalibKind::MasterFlat,
        Some(ProductKind::Raw) | Some(ProductKind::Zdf) | None => CalibKind::Source,
    }
}

pub struct Emitter<W: Write> {
    out: W,
    opts: EmitOptions,
    seen: BTreeSet<String>,
    counts: BTreeMap<CalibKind, u64>,
    duplicates: u64,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W, opts: EmitOptions) -> Self {
        Self {
            out,
            opts,
            seen: BTreeSet::new(),
            counts: BTreeMap::new(),
            duplicates: 0,
        }
    }

    /// Echo an input line at depth 0. Sources deduplicate by the path
    /// string exactly as given.
    pub fn emit_source(&mut self, line: &str, kind: CalibKind) -> Result<bool> {
        if self.opts.skip_source {
            *self.counts.entry(kind).or_default() += 1;
            return Ok(false);
        }
        self.emit_line(line, 0, kind, line.to_string())
    }

    pub fn emit_node(&mut self, node: &CalibNode) -> Result<bool> {
        let text = node.path.display().to_string();
        self.emit_line(&text, node.depth, node.kind, node.dedup_key())
    }

    fn emit_line(
        &mut self,
        text: &str,
        depth: usize,
        kind: CalibKind,
        dedup_key: String,
    ) -> Result<bool> {
        if self.opts.skip_duplicates {
            if self.seen.contains(&dedup_key) {
                self.duplicates += 1;
                return Ok(false);
            }
            self.seen.insert(dedup_key);
        }
        let text = if self.opts.names_only {
            Path::new(text)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| text.to_string())
        } else {
            text.to_string()
        };
        let indent = if self.opts.no_indent { 0 } else { depth };
        write_line(&mut self.out, &format!("{}{}", " ".repeat(indent), text))?;
        *self.counts.entry(kind).or_default() += 1;
        Ok(true)
    }

    fn count(&self, kind: CalibKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Human-readable batch summary; goes to the log, never to the data
    /// stream.
    pub fn summary(&self) -> String {
        let calib_total: u64 = self
            .counts
            .iter()
            .filter(|(kind, _)| **kind != CalibKind::Source)
            .map(|(_, n)| n)
            .sum();
        let mut line = format!(
            "Source files: {} | master zero: {}, dark: {}, flat: {} | \
             raw zero: {}, dark: {}, flat: {} | total calib output: {}",
            self.count(CalibKind::Source),
            self.count(CalibKind::MasterZero),
            self.count(CalibKind::MasterDark),
            self.count(CalibKind::MasterFlat),
            self.count(CalibKind::RawZero),
            self.count(CalibKind::RawDark),
            self.count(CalibKind::RawFlat),
            calib_total,
        );
        if self.opts.skip_duplicates {
            line.push_str(&format!(" | duplicates skipped: {}", self.duplicates));
        }
        line
    }
}

/// Write one data line. A broken pipe means the downstream consumer closed
/// its input — normal, silent termination, not an error.
pub fn write_line(out: &mut impl Write, line: &str) -> Result<()> {
    if let Err(err) = writeln!(out, "{line}") {
        if err.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    Ok(())
}
