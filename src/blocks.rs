//! The two mutually exclusive `location` fragments
//!
//! Both materializer strategies splice these in, so the maintenance behaviour
//! is identical whichever one produced the live file:
//!
//! - the maintenance block serves the maintenance page, lets static assets
//!   through and redirects everything else to the maintenance page;
//! - the normal block proxies all traffic to the application upstream.

use std::time::Duration;

/// First line of the maintenance block
pub const MAINTENANCE_MARKER: &str = "# maintgate: maintenance mode";

/// First line of the normal block
pub const NORMAL_MARKER: &str = "# maintgate: normal operation";

/// Comment that opens the fragment inserted by the legacy editor
pub const LEGACY_HEADER: &str = "# Maintenance mode redirect";

/// Comment that precedes the commented-out original `location /` block
pub const LEGACY_DISABLED_MARKER: &str = "# Normal site configuration (disabled during maintenance)";

const INDENT: &str = "    ";

/// Inputs for rendering the blocks
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSettings {
    pub upstream: String,
    pub maintenance_path: String,
    pub redirect_status: u16,
    pub asset_prefixes: Vec<String>,
    pub asset_extensions: Vec<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for BlockSettings {
    fn default() -> Self {
        crate::config::Config::default().block_settings()
    }
}

impl BlockSettings {
    /// Directive that marks the maintenance redirect as live
    pub fn redirect_directive(&self) -> String {
        format!("return {} {};", self.redirect_status, self.maintenance_path)
    }

    /// Case-insensitive regex matching request paths that bypass the redirect
    ///
    /// `None` when neither prefixes nor extensions are configured.
    pub fn asset_pattern(&self) -> Option<String> {
        let mut alternatives: Vec<String> =
            self.asset_prefixes.iter().map(|p| regex::escape(p)).collect();
        if !self.asset_extensions.is_empty() {
            let exts: Vec<String> = self.asset_extensions.iter().map(|e| regex::escape(e)).collect();
            alternatives.push(format!(r".*\.(?:{})$", exts.join("|")));
        }
        if alternatives.is_empty() {
            return None;
        }
        Some(format!("^/(?:{})", alternatives.join("|")))
    }
}

fn proxy_directives(settings: &BlockSettings) -> Vec<String> {
    vec![
        format!("proxy_pass {};", settings.upstream),
        "proxy_http_version 1.1;".to_string(),
        "proxy_set_header Upgrade $http_upgrade;".to_string(),
        "proxy_set_header Connection 'upgrade';".to_string(),
        "proxy_set_header Host $host;".to_string(),
        "proxy_set_header X-Real-IP $remote_addr;".to_string(),
        "proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;".to_string(),
        "proxy_set_header X-Forwarded-Proto $scheme;".to_string(),
        "proxy_cache_bypass $http_upgrade;".to_string(),
        format!("proxy_connect_timeout {}s;", settings.connect_timeout.as_secs()),
        format!("proxy_send_timeout {}s;", settings.send_timeout.as_secs()),
        format!("proxy_read_timeout {}s;", settings.read_timeout.as_secs()),
    ]
}

fn location(header: String, body: Vec<String>) -> Vec<String> {
    let mut lines = Vec::with_capacity(body.len() + 2);
    lines.push(format!("{} {{", header));
    lines.extend(body.into_iter().map(|l| format!("{}{}", INDENT, l)));
    lines.push("}".to_string());
    lines
}

/// Maintenance block lines, relative to server-level indentation
pub fn maintenance_lines(settings: &BlockSettings) -> Vec<String> {
    let mut lines = vec![MAINTENANCE_MARKER.to_string()];

    lines.extend(location(
        format!("location = {}", settings.maintenance_path),
        proxy_directives(settings),
    ));

    if let Some(pattern) = settings.asset_pattern() {
        lines.push(String::new());
        lines.push("# Static assets used by the maintenance page".to_string());
        // Quoted so escaped braces in the pattern are not read as a block
        lines.extend(location(format!("location ~* \"{}\"", pattern), proxy_directives(settings)));
    }

    lines.push(String::new());
    lines.extend(location(
        "location /".to_string(),
        vec![settings.redirect_directive()],
    ));
    lines
}

/// Normal block lines, relative to server-level indentation
pub fn normal_lines(settings: &BlockSettings) -> Vec<String> {
    let mut lines = vec![NORMAL_MARKER.to_string()];
    lines.extend(location("location /".to_string(), proxy_directives(settings)));
    lines
}

/// Join block lines for splicing into a template
///
/// The first line is left unindented since the placeholder's own position
/// supplies it; following lines get one server-level indent. No trailing newline.
pub fn splice_form(lines: &[String]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.is_empty() {
                line.clone()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Maintenance block text for template substitution
pub fn maintenance_block(settings: &BlockSettings) -> String {
    splice_form(&maintenance_lines(settings))
}

/// Normal block text for template substitution
pub fn normal_block(settings: &BlockSettings) -> String {
    splice_form(&normal_lines(settings))
}

/// Fragment the legacy editor inserts before the original `location /`
///
/// Every line is prefixed with `indent` and newline-terminated.
pub fn legacy_fragment(indent: &str, settings: &BlockSettings) -> Vec<String> {
    let mut lines = vec![LEGACY_HEADER.to_string()];
    lines.extend(maintenance_lines(settings));
    lines.push(String::new());
    lines.push(LEGACY_DISABLED_MARKER.to_string());

    lines
        .into_iter()
        .map(|line| {
            if line.is_empty() {
                "\n".to_string()
            } else {
                format!("{}{}\n", indent, line)
            }
        })
        .collect()
}
