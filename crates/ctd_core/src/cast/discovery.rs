//! Cast discovery from the raw capture directory.

use std::fs;
use std::io;
use std::path::PathBuf;

use super::types::{Cast, CastRoots, RAW_EXTENSION};

/// Discover casts from the raw root.
///
/// Returns one cast per `.hex` file directly inside `roots.raw`, sorted by
/// base name. Subdirectories and other files are ignored.
pub fn discover_casts(roots: &CastRoots) -> io::Result<Vec<Cast>> {
    let mut casts = Vec::new();

    for entry in fs::read_dir(&roots.raw)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match Cast::from_raw_path(&path, roots) {
            Some(cast) => casts.push(cast),
            None => tracing::trace!("Ignoring non-capture file {}", path.display()),
        }
    }

    casts.sort_by(|a, b| a.base_name().cmp(b.base_name()));
    tracing::debug!("Discovered {} casts in {}", casts.len(), roots.raw.display());
    Ok(casts)
}

/// Look up specific casts by base name.
///
/// Names may be given with or without the `.hex` extension. The raw capture
/// is matched with a case-insensitive extension, so `WQP143` finds
/// `WQP143.HEX`. A name with no capture keeps the default `<base>.hex` path
/// and fails its precondition check when processed.
pub fn casts_by_name<S: AsRef<str>>(names: &[S], roots: &CastRoots) -> Vec<Cast> {
    names
        .iter()
        .map(|name| {
            let base = strip_raw_extension(name.as_ref());
            match find_capture(roots, base) {
                Some(path) => Cast::from_raw_path(&path, roots)
                    .unwrap_or_else(|| Cast::new(base, roots)),
                None => Cast::new(base, roots),
            }
        })
        .collect()
}

fn strip_raw_extension(name: &str) -> &str {
    let cut = name.len().saturating_sub(RAW_EXTENSION.len() + 1);
    match (name.get(..cut), name.get(cut..)) {
        (Some(base), Some(ext))
            if !base.is_empty()
                && ext.starts_with('.')
                && ext[1..].eq_ignore_ascii_case(RAW_EXTENSION) =>
        {
            base
        }
        _ => name,
    }
}

/// Raw capture for `base`, preferring the exact `<base>.hex` spelling.
fn find_capture(roots: &CastRoots, base: &str) -> Option<PathBuf> {
    let exact = roots.raw.join(format!("{}.{}", base, RAW_EXTENSION));
    if exact.is_file() {
        return Some(exact);
    }

    let entries = fs::read_dir(&roots.raw).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            let stem = p.file_stem().and_then(|s| s.to_str());
            let ext = p.extension().and_then(|s| s.to_str());
            stem == Some(base) && ext.is_some_and(|e| e.eq_ignore_ascii_case(RAW_EXTENSION))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discovers_hex_files_sorted() {
        let dir = tempdir().unwrap();
        let roots = CastRoots::new(dir.path(), dir.path().join("p"), dir.path().join("a"));
        fs::write(dir.path().join("b_cast.hex"), "*END*").unwrap();
        fs::write(dir.path().join("a_cast.hex"), "*END*").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub.hex")).unwrap();

        let casts = discover_casts(&roots).unwrap();
        let names: Vec<_> = casts.iter().map(|c| c.base_name().to_string()).collect();
        assert_eq!(names, vec!["a_cast", "b_cast"]);
    }

    #[test]
    fn casts_by_name_strips_extension() {
        let roots = CastRoots::new("/r", "/p", "/a");
        let casts = casts_by_name(&["WQP143.hex", "WQP144"], &roots);
        assert_eq!(casts[0].base_name(), "WQP143");
        assert_eq!(casts[1].base_name(), "WQP144");
    }

    #[test]
    fn casts_by_name_finds_uppercase_extension() {
        let dir = tempdir().unwrap();
        let roots = CastRoots::new(dir.path(), dir.path().join("p"), dir.path().join("a"));
        let upper = dir.path().join("WQP143.HEX");
        fs::write(&upper, "*END*").unwrap();

        let casts = casts_by_name(&["WQP143", "WQP143.Hex", "WQP999"], &roots);
        assert_eq!(casts[0].base_name(), "WQP143");
        if !dir.path().join("WQP143.hex").is_file() {
            // case-sensitive filesystem: the uppercase file must be picked up
            assert_eq!(casts[0].raw_path(), upper);
        }
        assert!(casts[0].raw_path().is_file());
        assert_eq!(casts[1].base_name(), "WQP143");
        assert!(casts[1].raw_path().is_file());
        assert_eq!(casts[2].raw_path(), dir.path().join("WQP999.hex"));
    }

    #[test]
    fn strips_extension_in_any_case() {
        assert_eq!(strip_raw_extension("a1.hex"), "a1");
        assert_eq!(strip_raw_extension("a1.HeX"), "a1");
        assert_eq!(strip_raw_extension("a1"), "a1");
        assert_eq!(strip_raw_extension(".hex"), ".hex");
        assert_eq!(strip_raw_extension("cast.hexa"), "cast.hexa");
    }
}
