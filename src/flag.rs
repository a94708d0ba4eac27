//! Maintenance flag lookup in a deployment environment file
//!
//! The environment file is owned by the deployment process; this module only
//! reads it. Any problem reading it resolves to "maintenance disabled" so a
//! missing file never blocks serving the site.

use std::path::Path;
use tracing::{debug, warn};

/// Values (compared lower-cased) that switch maintenance mode on
pub const TRUTHY_VALUES: &[&str] = &["true", "1", "yes"];

/// Check whether a raw flag value is truthy
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    TRUTHY_VALUES.contains(&value.as_str())
}

/// Parse the flag from file contents
///
/// Returns `None` if no line starts with `<key>=`. Only the first matching
/// line counts.
pub fn parse_flag(contents: &str, key: &str) -> Option<bool> {
    let prefix = format!("{}=", key);
    contents
        .lines()
        .find(|line| line.starts_with(&prefix))
        .map(|line| is_truthy(&line[prefix.len()..]))
}

/// Read the maintenance flag from `path`, failing open to `false`
pub fn read_maintenance_flag(path: &Path, key: &str) -> bool {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Environment file not found, assuming maintenance mode is disabled"
        );
        return false;
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read environment file");
            return false;
        }
    };

    match parse_flag(&contents, key) {
        Some(value) => value,
        None => {
            debug!(path = %path.display(), key, "Flag not set in environment file");
            false
        }
    }
}
