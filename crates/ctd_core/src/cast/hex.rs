//! Raw capture header parsing.
//!
//! Sea-Bird hex captures start with `*`-prefixed header lines terminated by
//! `*END*`. Only the instrument serial number and the cast date are needed
//! to pick a configuration folder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

/// Header fields the pipeline needs from a raw capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HexHeader {
    pub serial_number: String,
    pub cast_date: NaiveDateTime,
}

/// Errors reading a raw capture header.
#[derive(Error, Debug)]
pub enum HexHeaderError {
    #[error("Failed to read raw capture {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No serial number in raw capture header")]
    MissingSerialNumber,

    #[error("No cast date in raw capture header")]
    MissingCastDate,
}

/// Format of the date on `* cast` lines: `14 Jun 2021 09:52:33`.
const CAST_LINE_FORMAT: &str = "%d %b %Y %H:%M:%S";

/// Format of `* System UpLoad Time = Jun 14 2021 10:05:34`.
const UPLOAD_TIME_FORMAT: &str = "%b %d %Y %H:%M:%S";

impl HexHeader {
    /// Read and parse the header of a raw capture file.
    ///
    /// Bytes are decoded lossily; some captures carry stray non-UTF-8 bytes.
    pub fn read(path: &Path) -> Result<Self, HexHeaderError> {
        let bytes = fs::read(path).map_err(|source| HexHeaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    /// Parse header text.
    pub fn parse(text: &str) -> Result<Self, HexHeaderError> {
        let mut temperature_sn = None;
        let mut instrument_sn = None;
        let mut cast_line_date = None;
        let mut upload_date = None;

        for line in text.lines() {
            let line = line.trim();
            if !line.starts_with('*') || line.starts_with("*END*") {
                break;
            }
            let body = line.trim_start_matches('*').trim();
            let lower = body.to_ascii_lowercase();

            if lower.starts_with("temperature sn") {
                temperature_sn = value_after_equals(body).filter(|v| !v.is_empty());
            } else if let Some(pos) = body.find("SERIAL NO.") {
                instrument_sn = body[pos + "SERIAL NO.".len()..]
                    .split_whitespace()
                    .next()
                    .map(str::to_string);
            } else if lower.starts_with("cast ") && cast_line_date.is_none() {
                cast_line_date = parse_cast_line(body);
            } else if lower.starts_with("system upload time") {
                upload_date = value_after_equals(body)
                    .and_then(|v| NaiveDateTime::parse_from_str(&v, UPLOAD_TIME_FORMAT).ok());
            }
        }

        let serial_number = temperature_sn
            .or(instrument_sn)
            .ok_or(HexHeaderError::MissingSerialNumber)?;
        let cast_date = cast_line_date
            .or(upload_date)
            .ok_or(HexHeaderError::MissingCastDate)?;

        Ok(Self {
            serial_number,
            cast_date,
        })
    }
}

fn value_after_equals(body: &str) -> Option<String> {
    body.split_once('=').map(|(_, v)| v.trim().to_string())
}

/// `cast   1 14 Jun 2021 09:52:33 samples 0 to 2915, ...`
fn parse_cast_line(body: &str) -> Option<NaiveDateTime> {
    let tokens: Vec<&str> = body.split_whitespace().collect();
    if tokens.len() < 6 {
        return None;
    }
    let date = tokens[2..6].join(" ");
    NaiveDateTime::parse_from_str(&date, CAST_LINE_FORMAT).ok()
}
