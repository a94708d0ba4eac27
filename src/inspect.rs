//! Line-level scanning of nginx configuration text
//!
//! This is pattern matching over text, not a parser: braces are counted in the
//! part of each line before any `#`, and quoted braces are not recognised.

use crate::blocks::BlockSettings;
use serde::Serialize;

/// Which catch-all behaviour a document currently has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveBlock {
    Maintenance,
    Normal,
    Both,
    Neither,
}

impl ActiveBlock {
    fn from_flags(maintenance: bool, normal: bool) -> Self {
        match (maintenance, normal) {
            (true, false) => ActiveBlock::Maintenance,
            (false, true) => ActiveBlock::Normal,
            (true, true) => ActiveBlock::Both,
            (false, false) => ActiveBlock::Neither,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveBlock::Maintenance => "maintenance",
            ActiveBlock::Normal => "normal",
            ActiveBlock::Both => "both",
            ActiveBlock::Neither => "neither",
        }
    }

    /// Whether this state matches the requested flag
    pub fn matches_flag(&self, maintenance: bool) -> bool {
        matches!(
            (self, maintenance),
            (ActiveBlock::Maintenance, true) | (ActiveBlock::Normal, false)
        )
    }
}

/// Directives that make a catch-all location serve content
const CONTENT_DIRECTIVES: &[&str] = &[
    "proxy_pass",
    "fastcgi_pass",
    "uwsgi_pass",
    "grpc_pass",
    "try_files",
    "root",
    "alias",
];

/// Part of a line before any comment
pub fn code_part(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Net change in brace depth contributed by a line
pub fn brace_delta(line: &str) -> i32 {
    code_part(line).chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

/// Leading whitespace of a line
pub fn indentation(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

/// `location / {` with any spacing, ignoring comments
pub fn is_catch_all_location(line: &str) -> bool {
    let mut tokens = code_part(line).split_whitespace();
    if tokens.next() != Some("location") {
        return false;
    }
    match tokens.next() {
        Some("/") => tokens.next().is_some_and(|t| t.starts_with('{')),
        Some(t) => t.starts_with("/{"),
        None => false,
    }
}

/// `server {` opening line
pub fn is_server_open(line: &str) -> bool {
    let code = code_part(line).trim();
    code.starts_with("server") && code["server".len()..].trim_start().starts_with('{')
}

/// `listen ... 443 ... ssl` directive
pub fn is_https_listen(line: &str) -> bool {
    let code = code_part(line);
    code.split_whitespace().next() == Some("listen") && code.contains("443") && code.contains("ssl")
}

/// Live (uncommented) redirect to the maintenance page
pub fn is_live_redirect(line: &str, settings: &BlockSettings) -> bool {
    let code = code_part(line).split_whitespace().collect::<Vec<_>>().join(" ");
    let code = code.trim_end_matches(';').trim_end();
    code == settings.redirect_directive().trim_end_matches(';')
}

/// Index of the line closing the block opened at `start`
///
/// Returns `None` when the text ends before the block closes.
pub fn block_end<S: AsRef<str>>(lines: &[S], start: usize) -> Option<usize> {
    let mut depth = 0;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let code = code_part(line.as_ref());
        if code.contains('{') {
            opened = true;
        }
        depth += brace_delta(code);
        if opened && depth <= 0 {
            return Some(i);
        }
    }
    None
}

/// Whether any line of the document carries the live maintenance redirect
pub fn has_live_redirect<S: AsRef<str>>(lines: &[S], settings: &BlockSettings) -> bool {
    lines.iter().any(|l| is_live_redirect(l.as_ref(), settings))
}

/// Classify the catch-all locations of a document
///
/// A catch-all that redirects to the maintenance page counts as the
/// maintenance block; one with a content directive counts as the normal block.
/// Anything else, such as an HTTP-to-HTTPS redirect, is ignored.
pub fn detect_active(document: &str, settings: &BlockSettings) -> ActiveBlock {
    let lines: Vec<&str> = document.lines().collect();
    let mut maintenance = false;
    let mut normal = false;

    let mut i = 0;
    while i < lines.len() {
        if !is_catch_all_location(lines[i]) {
            i += 1;
            continue;
        }
        let end = block_end(&lines, i).unwrap_or(lines.len() - 1);
        let body = &lines[i..=end];
        if body.iter().any(|l| is_live_redirect(l, settings)) {
            maintenance = true;
        } else if body.iter().any(|l| {
            code_part(l)
                .split_whitespace()
                .next()
                .is_some_and(|d| CONTENT_DIRECTIVES.contains(&d))
        }) {
            normal = true;
        }
        i = end + 1;
    }

    ActiveBlock::from_flags(maintenance, normal)
}
