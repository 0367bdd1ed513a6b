use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Write `content` to `path` so readers never observe a partial file.
///
/// The bytes go to a temp file in the same directory, are flushed and
/// fsynced, and the temp file is then renamed over the destination.
pub fn atomic_write_str(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Normalize a column header: trimmed, lower-case, spaces and hyphens as `_`.
///
/// Example: " Personalized Note" → "personalized_note"
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// UTC timestamp in the `YYYY-MM-DDTHH:MM:SSZ` shape used for sheet cells and run logs.
pub fn utc_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse the boolean spellings accepted in env config.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}
