//! Just enough FITS to talk to astrometry.net: write an x/y list as a binary
//! table and read header cards back from the `.wcs` file it produces.
//!
//! Headers are sequences of 80-byte ASCII cards, padded to 2880-byte blocks.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{HeaderValue, Peak};

const CARD_LEN: usize = 80;
const BLOCK_LEN: usize = 2880;

/// Cards that describe FITS structure rather than the transform.
const STRUCTURE_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND", "PCOUNT", "GCOUNT", "XTENSION",
    "TFIELDS",
];

/// Value of a single header card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<CardValue> for HeaderValue {
    fn from(value: CardValue) -> Self {
        match value {
            CardValue::Logical(b) => HeaderValue::Bool(b),
            CardValue::Integer(i) => HeaderValue::Integer(i),
            CardValue::Float(f) => HeaderValue::Float(f),
            CardValue::Text(s) => HeaderValue::Text(s),
        }
    }
}

/// Format one keyword card.
pub fn format_card(keyword: &str, value: &CardValue) -> Vec<u8> {
    let field = match value {
        CardValue::Text(s) => format!("'{:<8}'", s.replace('\'', "''")),
        CardValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        CardValue::Integer(i) => format!("{:>20}", i),
        CardValue::Float(f) => format!("{:>20}", format_float(*f)),
    };
    let card = format!("{:<8}= {}", keyword.to_ascii_uppercase(), field);

    finish_card(card)
}

fn format_float(value: f64) -> String {
    let text = format!("{:E}", value);
    if text.contains('.') {
        text
    } else {
        // FITS readers expect a decimal point in real values.
        text.replacen('E', ".0E", 1)
    }
}

fn finish_card(mut card: String) -> Vec<u8> {
    card.truncate(CARD_LEN);
    let mut bytes = card.into_bytes();
    bytes.resize(CARD_LEN, b' ');
    bytes
}

fn end_card() -> Vec<u8> {
    finish_card("END".to_string())
}

fn pad_block(buffer: &mut Vec<u8>, fill: u8) {
    let remainder = buffer.len() % BLOCK_LEN;
    if remainder != 0 {
        buffer.resize(buffer.len() + BLOCK_LEN - remainder, fill);
    }
}

/// Serialise `peaks` as a FITS binary table with double-precision `X` and
/// `Y` columns, preceded by an empty primary HDU.
///
/// Peaks use zero-based pixel coordinates; the table is written in the
/// one-based FITS convention `solve-field` expects.
pub fn encode_xylist(peaks: &[Peak], width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 * BLOCK_LEN + peaks.len() * 16);

    for (key, value) in [
        ("SIMPLE", CardValue::Logical(true)),
        ("BITPIX", CardValue::Integer(8)),
        ("NAXIS", CardValue::Integer(0)),
        ("EXTEND", CardValue::Logical(true)),
    ] {
        out.extend(format_card(key, &value));
    }
    out.extend(end_card());
    pad_block(&mut out, b' ');

    for (key, value) in [
        ("XTENSION", CardValue::Text("BINTABLE".to_string())),
        ("BITPIX", CardValue::Integer(8)),
        ("NAXIS", CardValue::Integer(2)),
        ("NAXIS1", CardValue::Integer(16)),
        ("NAXIS2", CardValue::Integer(peaks.len() as i64)),
        ("PCOUNT", CardValue::Integer(0)),
        ("GCOUNT", CardValue::Integer(1)),
        ("TFIELDS", CardValue::Integer(2)),
        ("TTYPE1", CardValue::Text("X".to_string())),
        ("TFORM1", CardValue::Text("D".to_string())),
        ("TTYPE2", CardValue::Text("Y".to_string())),
        ("TFORM2", CardValue::Text("D".to_string())),
        ("IMAGEW", CardValue::Integer(i64::from(width))),
        ("IMAGEH", CardValue::Integer(i64::from(height))),
    ] {
        out.extend(format_card(key, &value));
    }
    out.extend(end_card());
    pad_block(&mut out, b' ');

    for peak in peaks {
        out.extend_from_slice(&(peak.x + 1.0).to_be_bytes());
        out.extend_from_slice(&(peak.y + 1.0).to_be_bytes());
    }
    pad_block(&mut out, 0);

    out
}

/// Write an x/y list file for `solve-field`.
pub fn write_xylist(path: &Path, peaks: &[Peak], width: u32, height: u32) -> Result<()> {
    fs::write(path, encode_xylist(peaks, width, height))?;
    Ok(())
}

/// Read the keyword cards of the first header in `bytes`.
///
/// Commentary cards, undefined values and structural keywords are skipped.
pub fn parse_header(bytes: &[u8]) -> Result<Vec<(String, CardValue)>> {
    let mut cards = Vec::new();

    for chunk in bytes.chunks(CARD_LEN) {
        if chunk.len() != CARD_LEN {
            break;
        }
        if !chunk.is_ascii() {
            return Err(Error::Fits {
                message: "header card is not ASCII".to_string(),
            });
        }
        let card = String::from_utf8_lossy(chunk);

        let keyword = card[..8].trim_end();
        if keyword == "END" {
            return Ok(cards);
        }
        if keyword.is_empty()
            || &card[8..10] != "= "
            || STRUCTURE_KEYWORDS.contains(&keyword)
        {
            continue;
        }

        if let Some(value) = parse_value(&card[10..]) {
            cards.push((keyword.to_string(), value));
        }
    }

    Err(Error::Fits {
        message: "header has no END card".to_string(),
    })
}

/// Read the first header of a FITS file on disk.
pub fn read_header_file(path: &Path) -> Result<Vec<(String, CardValue)>> {
    parse_header(&fs::read(path)?)
}

fn parse_value(field: &str) -> Option<CardValue> {
    let field = field.trim_start();

    if let Some(rest) = field.strip_prefix('\'') {
        return Some(CardValue::Text(parse_string(rest)));
    }

    let value = field.split('/').next().unwrap_or("").trim();
    match value {
        "" => None,
        "T" => Some(CardValue::Logical(true)),
        "F" => Some(CardValue::Logical(false)),
        _ => {
            if let Ok(i) = value.parse::<i64>() {
                Some(CardValue::Integer(i))
            } else if let Some(f) = value
                .replace(['D', 'd'], "E")
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
            {
                Some(CardValue::Float(f))
            } else {
                Some(CardValue::Text(value.to_string()))
            }
        }
    }
}

fn parse_string(rest: &str) -> String {
    let mut out = String::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                out.push('\'');
            } else {
                break;
            }
        } else {
            out.push(c);
        }
    }

    out.trim_end().to_string()
}
