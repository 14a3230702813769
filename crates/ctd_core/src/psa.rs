//! Profile (`.psa`) latitude rewriting.
//!
//! Profiles are XML. Steps that need latitude read it from a
//! `<Latitude value="..."/>` element, which is updated in place so the rest
//! of the document keeps its exact formatting.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fsutil::atomic_write;

const BOM: char = '\u{feff}';

/// Errors rewriting a profile.
#[derive(Error, Debug)]
pub enum PsaError {
    #[error("Failed to access profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed profile {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

impl PsaError {
    pub fn path(&self) -> &Path {
        match self {
            PsaError::Io { path, .. } | PsaError::Malformed { path, .. } => path,
        }
    }
}

/// Set every `<Latitude value>` in a profile file.
///
/// Returns `true` when the file was rewritten. Files without a latitude
/// element, or already holding this latitude, are left untouched.
pub fn rewrite_latitude(path: &Path, latitude: f64) -> Result<bool, PsaError> {
    let content = fs::read_to_string(path).map_err(|source| PsaError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (bom, xml) = match content.strip_prefix(BOM) {
        Some(rest) => (Some(BOM), rest),
        None => (None, content.as_str()),
    };

    let updated = set_latitude(xml, latitude).map_err(|message| PsaError::Malformed {
        path: path.to_path_buf(),
        message,
    })?;

    let Some(updated) = updated.filter(|u| u != xml) else {
        tracing::trace!("Latitude unchanged in {}", path.display());
        return Ok(false);
    };

    let mut out = String::with_capacity(updated.len() + 3);
    out.extend(bom);
    out.push_str(&updated);
    atomic_write(path, out.as_bytes()).map_err(|source| PsaError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("Set latitude {} in {}", latitude, path.display());
    Ok(true)
}

/// Replace the latitude in profile XML text.
///
/// Returns `None` when the document has no `Latitude` element with a
/// `value` attribute.
pub fn set_latitude(xml: &str, latitude: f64) -> Result<Option<String>, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("XML parse error: {}", e))?;

    let mut spans: Vec<Range<usize>> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Latitude")
        .filter(|n| n.attribute("value").is_some())
        .filter_map(|n| {
            let start = n.range().start;
            let tag_end = xml[start..].find('>').map(|i| start + i)?;
            let span = value_span(&xml[start..tag_end])?;
            Some(start + span.start..start + span.end)
        })
        .collect();

    if spans.is_empty() {
        return Ok(None);
    }

    let value = latitude.to_string();
    let mut out = xml.to_string();
    spans.sort_by_key(|s| s.start);
    for span in spans.into_iter().rev() {
        out.replace_range(span, &value);
    }
    Ok(Some(out))
}

/// Byte range of the `value` attribute's content within a start tag.
fn value_span(tag: &str) -> Option<Range<usize>> {
    let bytes = tag.as_bytes();
    let mut search = 0;
    while let Some(found) = tag[search..].find("value") {
        let name_start = search + found;
        let name_end = name_start + "value".len();
        search = name_end;

        if name_start == 0 || !bytes[name_start - 1].is_ascii_whitespace() {
            continue;
        }

        let rest = &tag[name_end..];
        let after_ws = rest.trim_start();
        let Some(after_eq) = after_ws.strip_prefix('=') else {
            continue;
        };
        let quoted = after_eq.trim_start();
        let quote = quoted.chars().next().filter(|c| *c == '"' || *c == '\'')?;

        let value_start = tag.len() - quoted.len() + 1;
        let value_len = tag[value_start..].find(quote)?;
        return Some(value_start..value_start + value_len);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PROFILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Derive_Parameters>
  <Version value="7.26.7.107" />
  <ServerName value="Derive" />
  <Latitude value="0.000000" />
  <CalcAllVars value="0" />
</Derive_Parameters>
"#;

    #[test]
    fn replaces_only_the_value() {
        let out = set_latitude(PROFILE, -19.25).unwrap().unwrap();
        assert!(out.contains(r#"<Latitude value="-19.25" />"#));
        assert!(out.contains(r#"<Version value="7.26.7.107" />"#));
        assert_eq!(out.len(), PROFILE.len() - "0.000000".len() + "-19.25".len());
    }

    #[test]
    fn handles_single_quotes_and_spacing() {
        let xml = "<P><Latitude  defaultvalue='1' value = '12.5'/></P>";
        let out = set_latitude(xml, 3.0).unwrap().unwrap();
        assert_eq!(out, "<P><Latitude  defaultvalue='1' value = '3'/></P>");
    }

    #[test]
    fn document_without_latitude_is_untouched() {
        assert_eq!(set_latitude("<Filter><Low value=\"1\"/></Filter>", 5.0).unwrap(), None);
        assert!(set_latitude("<not closed", 5.0).is_err());
    }

    #[test]
    fn rewrite_only_writes_when_changed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Derive.psa");
        fs::write(&path, PROFILE).unwrap();

        assert!(rewrite_latitude(&path, -19.25).unwrap());
        assert!(!rewrite_latitude(&path, -19.25).unwrap());
        assert!(fs::read_to_string(&path).unwrap().contains("-19.25"));

        let other = dir.path().join("Filter.psa");
        fs::write(&other, "<Filter/>").unwrap();
        assert!(!rewrite_latitude(&other, -19.25).unwrap());
    }

    #[test]
    fn missing_profile_reports_path() {
        let dir = tempdir().unwrap();
        let err = rewrite_latitude(&dir.path().join("nope.psa"), 1.0).unwrap_err();
        assert!(err.path().ends_with("nope.psa"));
    }
}
