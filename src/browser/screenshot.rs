//! Screenshot file naming and persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Default directory screenshots are written to.
pub const DEFAULT_SCREENSHOT_DIR: &str = "screenshots";

/// File name for a screenshot.
///
/// Caller-supplied names keep only their final path component and always end
/// in `.png`; without a name the capture time is used.
pub fn screenshot_filename(requested: Option<&str>, now: DateTime<Utc>) -> String {
    let requested = requested
        .map(str::trim)
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty());

    let Some(name) = requested else {
        return format!("screenshot_{}.png", now.timestamp());
    };

    if name.to_lowercase().ends_with(".png") {
        return name.to_string();
    }

    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name);
    format!("{stem}.png")
}

/// Write PNG bytes into `dir`, creating it if needed.
///
/// # Returns
/// The path of the written file.
pub fn save_png(dir: &Path, filename: &str, png: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, png)?;
    Ok(path)
}
