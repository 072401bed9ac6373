//! FITS header display.
//!
//! Headers are fixed 80-byte card records at the start of the file,
//! `KEY     = value / comment`, terminated by an `END` card. We read just
//! enough of the file to cover the primary header and never interpret
//! pixel data.

use crate::Result;
use crate::emit::write_line;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const HEADER_PREFIX_BYTES: usize = 15000;
const CARD_BYTES: usize = 80;
const PATH_COL: usize = 103;

#[derive(Debug, Clone, PartialEq)]
pub enum CardValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for CardValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardValue::Int(v) => write!(f, "{v}"),
            CardValue::Float(v) => write!(f, "{v}"),
            CardValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub value: CardValue,
    pub comment: String,
}

pub type Header = BTreeMap<String, Card>;

/// Read and parse the header of one file. `None` means unreadable; the
/// caller renders a placeholder row and moves on.
pub fn read_header(path: &Path) -> Option<Header> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            log::warn!("cannot read {}: {err}", path.display());
            return None;
        }
    };
    let mut buf = vec![0u8; HEADER_PREFIX_BYTES];
    let mut filled = 0;
    loop {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) => {
                log::warn!("cannot read {}: {err}", path.display());
                return None;
            }
        }
        if filled == buf.len() {
            break;
        }
    }
    buf.truncate(filled);
    Some(parse_cards(&buf))
}

/// Split the prefix into 80-byte cards and collect `KEY = value` pairs
/// until the END card.
pub fn parse_cards(data: &[u8]) -> Header {
    let mut header = Header::new();
    for chunk in data.chunks(CARD_BYTES) {
        let card = String::from_utf8_lossy(chunk);
        if card.starts_with("END") {
            break;
        }
        let Some((key, rest)) = card.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let (value, comment) = match rest.split_once('/') {
            Some((value, comment)) => (value, comment.trim()),
            None => (rest, ""),
        };
        let value = value.trim().trim_matches('\'').trim();
        header.insert(
            key,
            Card {
                value: parse_value(value),
                comment: comment.to_string(),
            },
        );
    }
    header
}

fn parse_value(s: &str) -> CardValue {
    if let Ok(v) = s.parse::<i64>() {
        return CardValue::Int(v);
    }
    if let Ok(v) = s.parse::<f64>() {
        return CardValue::Float(v);
    }
    CardValue::Text(s.to_string())
}

fn text(header: &Header, key: &str) -> String {
    header
        .get(key)
        .map(|c| c.value.to_string())
        .unwrap_or_default()
}

fn number(header: &Header, key: &str) -> Option<f64> {
    match header.get(key)?.value {
        CardValue::Int(v) => Some(v as f64),
        CardValue::Float(v) => Some(v),
        CardValue::Text(_) => None,
    }
}

fn round2(v: f64) -> String {
    ((v * 100.0).round() / 100.0).to_string()
}

/// CCD temperature, whichever of the known keys is present.
fn ccd_temp(header: &Header) -> String {
    ["CCD-TEMP", "T-CAM"]
        .iter()
        .find_map(|key| number(header, key))
        .map(round2)
        .unwrap_or_default()
}

/// Render headers as a table, auto-detecting the layout from the first
/// readable header.
pub fn print_table(out: &mut impl Write, rows: &[(String, Option<Header>)]) -> Result<()> {
    if rows.is_empty() {
        return write_line(out, "NO FITS FILES");
    }
    let Some(first) = rows.iter().find_map(|(_, h)| h.as_ref()) else {
        return write_line(out, "NO READABLE FITS FILES");
    };
    if first.contains_key("OCASTD") {
        print_ocastd(out, rows)
    } else {
        print_generic(out, rows)
    }
}

fn print_ocastd(out: &mut impl Write, rows: &[(String, Option<Header>)]) -> Result<()> {
    write_line(
        out,
        &format!(
            "{:<PATH_COL$}|{:<15}|{:<10}|{:<10}|{:<10}|{:<20}|{:<20}|{:<30}|{}",
            "PATH", "IMAGETYP", "EXPTIME", "T-CAM", "FILTER", "SCIPROG", "PI", "DATE-OBS", "OBJECT"
        ),
    )?;
    write_line(out, &"-".repeat(PATH_COL + 117))?;
    for (path, header) in rows {
        let Some(h) = header else {
            write_line(out, &format!("{path:<PATH_COL$}| UNREADABLE"))?;
            continue;
        };
        let exptime = number(h, "EXPTIME").map(round2).unwrap_or_default();
        write_line(
            out,
            &format!(
                "{:<PATH_COL$}|{:<15}|{:<10}|{:<10}|{:<10}|{:<20}|{:<20}|{:<30}|{}",
                path,
                text(h, "IMAGETYP"),
                exptime,
                ccd_temp(h),
                text(h, "FILTER"),
                text(h, "SCIPROG"),
                text(h, "PI"),
                text(h, "DATE-OBS"),
                text(h, "OBJECT"),
            ),
        )?;
    }
    Ok(())
}

fn print_generic(out: &mut impl Write, rows: &[(String, Option<Header>)]) -> Result<()> {
    write_line(
        out,
        &format!(
            "{:<PATH_COL$}|{:<8}|{:<8}|{:<9}|{:<6}|{:<6}|{:<25}|{}",
            "PATH", "FRAME", "EXPTIME", "CCD-TEMP", "BIN", "GAIN", "DATE-OBS", "OBJECT"
        ),
    )?;
    write_line(out, &"-".repeat(PATH_COL + 97))?;
    for (path, header) in rows {
        let Some(h) = header else {
            write_line(out, &format!("{path:<PATH_COL$}| UNREADABLE"))?;
            continue;
        };
        let exptime = number(h, "EXPTIME").map(round2).unwrap_or_default();
        let temp = number(h, "CCD-TEMP").map(round2).unwrap_or_default();
        let binning = format!(
            "{}x{}",
            header_or(h, "XBINNING", "?"),
            header_or(h, "YBINNING", "?")
        );
        write_line(
            out,
            &format!(
                "{:<PATH_COL$}|{:<8}|{:<8}|{:<9}|{:<6}|{:<6}|{:<25}|{}",
                path,
                text(h, "FRAME"),
                exptime,
                temp,
                binning,
                text(h, "GAIN"),
                text(h, "DATE-OBS"),
                text(h, "OBJECT"),
            ),
        )?;
    }
    Ok(())
}

fn header_or(header: &Header, key: &str, fallback: &str) -> String {
    header
        .get(key)
        .map(|c| c.value.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn card(text: &str) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(CARD_BYTES, b' ');
        bytes
    }

    fn sample_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(card("SIMPLE  =                    T / conforms to FITS standard"));
        data.extend(card("OCASTD  = '1.0     '"));
        data.extend(card("EXPTIME =                120.5 / exposure time"));
        data.extend(card("NAXIS   =                    2"));
        data.extend(card("OBJECT  = 'NGC300-center'"));
        data.extend(card("CCD-TEMP=              -59.987"));
        data.extend(card("COMMENT no equals sign in this card"));
        data.extend(card("END"));
        data.extend(card("AFTER   = 'never parsed'"));
        data
    }

    #[test]
    fn parses_cards_until_end() {
        let header = parse_cards(&sample_bytes());
        assert_eq!(
            header.get("EXPTIME").unwrap().value,
            CardValue::Float(120.5)
        );
        assert_eq!(header.get("NAXIS").unwrap().value, CardValue::Int(2));
        assert_eq!(
            header.get("OBJECT").unwrap().value,
            CardValue::Text("NGC300-center".to_string())
        );
        assert_eq!(header.get("EXPTIME").unwrap().comment, "exposure time");
        assert!(!header.contains_key("AFTER"));
        assert!(!header.contains_key("COMMENT no equals sign in this card"));
    }

    #[test]
    fn quoted_values_lose_their_quotes_and_padding() {
        let header = parse_cards(&card("OCASTD  = '1.0     '"));
        assert_eq!(
            header.get("OCASTD").unwrap().value,
            CardValue::Text("1.0".to_string())
        );
    }

    #[test]
    fn ccd_temp_falls_back_to_t_cam() {
        let mut data = card("T-CAM   =               -60.02");
        data.extend(card("END"));
        assert_eq!(ccd_temp(&parse_cards(&data)), "-60.02");
        assert_eq!(ccd_temp(&Header::new()), "");
    }

    #[test]
    fn ocastd_table_layout_is_detected() {
        let header = parse_cards(&sample_bytes());
        let mut out = Vec::new();
        print_table(&mut out, &[("a.fits".to_string(), Some(header))]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("PATH"));
        assert!(text.contains("IMAGETYP"));
        assert!(text.contains("NGC300-center"));
    }

    #[test]
    fn unreadable_rows_do_not_abort_the_table() {
        let header = parse_cards(&card("EXPTIME =                 30.0"));
        let rows = vec![
            ("bad.fits".to_string(), None),
            ("ok.fits".to_string(), Some(header)),
        ];
        let mut out = Vec::new();
        print_table(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("UNREADABLE"));
        assert!(text.contains("ok.fits"));
    }

    #[test]
    fn empty_input_prints_placeholder() {
        let mut out = Vec::new();
        print_table(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "NO FITS FILES\n");
    }
}
