//! Site rendering by placeholder substitution
//!
//! The template is plain nginx configuration with two placeholder tokens. On
//! every render exactly one of them receives its block and the other is
//! replaced with an empty string, so the result always has exactly one
//! catch-all behaviour.

use crate::blocks::{maintenance_block, normal_block, BlockSettings};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Token replaced by the maintenance block
pub const MAINTENANCE_PLACEHOLDER: &str = "{{MAINTENANCE_MODE_BLOCK}}";

/// Token replaced by the normal block
pub const NORMAL_PLACEHOLDER: &str = "{{NORMAL_LOCATION_BLOCK}}";

/// A validated site template
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    source: String,
}

/// Result of comparing a rendered document with the live one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// The live file already has this content
    Unchanged,
    /// The live file must be replaced with this content
    Changed(String),
}

impl Template {
    /// Read a template from disk
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::TemplateUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = source.len(), "Template loaded");
        Self::from_source(path, source)
    }

    /// Build a template from text, checking both placeholders are present
    pub fn from_source(path: impl Into<PathBuf>, source: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let source = source.into();
        for placeholder in [MAINTENANCE_PLACEHOLDER, NORMAL_PLACEHOLDER] {
            if !source.contains(placeholder) {
                return Err(Error::MissingPlaceholder { path, placeholder });
            }
        }
        Ok(Self { path, source })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the site for the given flag
    ///
    /// A line holding nothing but the placeholder that renders empty is
    /// dropped whole, so no whitespace-only line is left behind.
    pub fn render(&self, maintenance: bool, settings: &BlockSettings) -> String {
        if maintenance {
            let source = drop_placeholder_lines(&self.source, NORMAL_PLACEHOLDER);
            substitute(&source, &maintenance_block(settings), "")
        } else {
            let source = drop_placeholder_lines(&self.source, MAINTENANCE_PLACEHOLDER);
            substitute(&source, "", &normal_block(settings))
        }
    }
}

fn drop_placeholder_lines(source: &str, placeholder: &str) -> String {
    source
        .split_inclusive('\n')
        .filter(|line| line.trim() != placeholder)
        .collect()
}

/// Replace every occurrence of both placeholders
///
/// The maintenance placeholder is replaced first, then the normal one; block
/// text never contains either token, so the order does not affect the output.
pub fn substitute(source: &str, maintenance_text: &str, normal_text: &str) -> String {
    source
        .replace(MAINTENANCE_PLACEHOLDER, maintenance_text)
        .replace(NORMAL_PLACEHOLDER, normal_text)
}

/// Compare rendered content with the current live content, byte for byte
///
/// A missing live file (`None`) always counts as changed.
pub fn materialize(current: Option<&str>, rendered: String) -> Materialized {
    match current {
        Some(current) if current == rendered => Materialized::Unchanged,
        _ => Materialized::Changed(rendered),
    }
}
