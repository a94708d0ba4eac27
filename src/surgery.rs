//! In-place editing of an existing site file (deprecated)
//!
//! Kept for sites that have no template yet. Enabling inserts the maintenance
//! fragment in front of the HTTPS server's `location /` block and comments that
//! block out; disabling removes the fragment and uncomments the block. The
//! editor depends on the file keeping the shape it produced, so anything
//! unexpected is reported as a structural mismatch and nothing is written.

use crate::blocks::{legacy_fragment, BlockSettings, LEGACY_DISABLED_MARKER, LEGACY_HEADER};
use crate::error::{Error, Result};
use crate::inspect::{
    block_end, brace_delta, code_part, has_live_redirect, indentation, is_catch_all_location,
    is_https_listen, is_server_open,
};
use tracing::{debug, info};

fn split_lines(document: &str) -> Vec<&str> {
    document.split_inclusive('\n').collect()
}

/// Comment a line out, keeping its indentation
///
/// Lines that are already comments get a second marker so that uncommenting
/// restores them exactly.
fn comment_out(line: &str) -> String {
    if line.trim().is_empty() {
        return line.to_string();
    }
    let indent = indentation(line);
    format!("{}# {}", indent, &line[indent.len()..])
}

/// Remove one comment marker added by [`comment_out`]
fn uncomment(line: &str) -> String {
    let indent = indentation(line);
    let rest = &line[indent.len()..];
    if let Some(stripped) = rest.strip_prefix("# ") {
        format!("{}{}", indent, stripped)
    } else if let Some(stripped) = rest.strip_prefix('#') {
        format!("{}{}", indent, stripped)
    } else {
        line.to_string()
    }
}

fn is_line(line: &str, text: &str) -> bool {
    line.trim() == text
}

/// Line range `(start, end)` of the HTTPS server block
fn https_server(lines: &[&str]) -> Result<(usize, usize)> {
    let mut i = 0;
    while i < lines.len() {
        if is_server_open(lines[i]) {
            let end = block_end(lines, i).unwrap_or(lines.len() - 1);
            if lines[i..=end].iter().any(|l| is_https_listen(l)) {
                return Ok((i, end));
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }
    Err(Error::mismatch("an HTTPS server block (`listen 443 ssl`)"))
}

/// Line range of the server-level `location /` inside `server`
fn catch_all_location(lines: &[&str], server: (usize, usize)) -> Result<(usize, usize)> {
    let (server_start, server_end) = server;
    let mut depth = brace_delta(lines[server_start]);

    for i in server_start + 1..server_end {
        if depth == 1 && is_catch_all_location(lines[i]) {
            return block_end(lines, i)
                .filter(|end| *end < server_end)
                .map(|end| (i, end))
                .ok_or_else(|| Error::mismatch("the end of the `location /` block"));
        }
        depth += brace_delta(lines[i]);
    }

    Err(Error::mismatch("a `location /` block in the HTTPS server block"))
}

/// Switch a document into maintenance mode
///
/// Returns `Ok(None)` if the maintenance redirect is already live.
pub fn enable(document: &str, settings: &BlockSettings) -> Result<Option<String>> {
    let lines = split_lines(document);
    if has_live_redirect(&lines, settings) {
        info!("Maintenance mode already enabled");
        return Ok(None);
    }

    let server = https_server(&lines)?;
    let (start, end) = catch_all_location(&lines, server)?;
    debug!(start = start + 1, end = end + 1, "Found location / block");

    let indent = indentation(lines[start]);
    let mut out: Vec<String> = lines[..start].iter().map(|l| l.to_string()).collect();
    out.extend(legacy_fragment(indent, settings));
    out.extend(lines[start..=end].iter().map(|l| comment_out(l)));
    out.extend(lines[end + 1..].iter().map(|l| l.to_string()));

    Ok(Some(out.concat()))
}

/// Switch a document back to normal operation
///
/// Returns `Ok(None)` if no maintenance redirect is live. A fragment without a
/// restorable `location /` block is an error rather than being dropped, so
/// the site never ends up without a catch-all route.
pub fn disable(document: &str, settings: &BlockSettings) -> Result<Option<String>> {
    let lines = split_lines(document);
    if !has_live_redirect(&lines, settings) {
        info!("Maintenance mode already disabled");
        return Ok(None);
    }

    let start = lines
        .iter()
        .position(|l| is_line(l, LEGACY_HEADER))
        .ok_or_else(|| Error::mismatch(format!("the `{}` comment", LEGACY_HEADER)))?;

    let marker = lines[start..]
        .iter()
        .position(|l| is_line(l, LEGACY_DISABLED_MARKER))
        .map(|offset| start + offset)
        .ok_or_else(|| Error::mismatch(format!("the `{}` comment", LEGACY_DISABLED_MARKER)))?;

    let commented_start = lines[marker + 1..]
        .iter()
        .position(|l| !l.trim().is_empty())
        .map(|offset| marker + 1 + offset)
        .filter(|&i| code_part(lines[i]).trim().is_empty() && is_catch_all_location(&uncomment(lines[i])))
        .ok_or_else(|| Error::mismatch("a commented-out `location /` block after the marker"))?;

    let restored: Vec<String> = lines[commented_start..].iter().map(|l| uncomment(l)).collect();
    let restored_end = block_end(&restored, 0)
        .ok_or_else(|| Error::mismatch("the end of the commented-out `location /` block"))?;
    let end = commented_start + restored_end;

    let mut out: Vec<String> = lines[..start].iter().map(|l| l.to_string()).collect();
    out.extend(restored.into_iter().take(restored_end + 1));
    out.extend(lines[end + 1..].iter().map(|l| l.to_string()));

    Ok(Some(out.concat()))
}

/// Apply the flag to a document
pub fn apply(document: &str, maintenance: bool, settings: &BlockSettings) -> Result<Option<String>> {
    if maintenance {
        enable(document, settings)
    } else {
        disable(document, settings)
    }
}
