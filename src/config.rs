use crate::blocks::BlockSettings;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the tool's own configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/maintgate/maintgate.toml";

/// Top-level configuration for a maintgate run
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Environment flag settings
    #[serde(default)]
    pub flag: FlagConfig,

    /// How the site file is produced
    #[serde(default)]
    pub materializer: MaterializerConfig,

    /// Where normal traffic is proxied to
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Maintenance page behaviour
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Validation and reload commands
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PathsConfig {
    /// Deployment environment file holding the maintenance flag
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// Live nginx site file that gets rewritten
    #[serde(default = "default_site_config")]
    pub site_config: PathBuf,

    /// Site template with the two block placeholders
    #[serde(default = "default_template")]
    pub template: PathBuf,

    /// Optional lock file; when set, concurrent runs fail fast
    pub lock_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            site_config: default_site_config(),
            template: default_template(),
            lock_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FlagConfig {
    /// Key looked up in the environment file (default: MAINTENANCE_MODE)
    #[serde(default = "default_flag_key")]
    pub key: String,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            key: default_flag_key(),
        }
    }
}

/// Strategy used to materialize the site file
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Render the site file from a template (default)
    #[default]
    Template,
    /// Edit the live file in place by scanning for blocks (deprecated)
    Legacy,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct MaterializerConfig {
    #[serde(default)]
    pub strategy: Strategy,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// Application address, e.g. http://127.0.0.1:4321
    #[serde(default = "default_upstream")]
    pub address: String,

    #[serde(default = "default_proxy_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_proxy_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_proxy_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream(),
            connect_timeout_secs: default_proxy_timeout(),
            read_timeout_secs: default_proxy_timeout(),
            send_timeout_secs: default_proxy_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MaintenanceConfig {
    /// Path of the maintenance page (default: /maintenance)
    #[serde(default = "default_maintenance_path")]
    pub path: String,

    /// Status used for the redirect (default: 302)
    #[serde(default = "default_redirect_status")]
    pub redirect_status: u16,

    /// Path prefixes that bypass the redirect
    #[serde(default = "default_asset_prefixes")]
    pub asset_prefixes: Vec<String>,

    /// File extensions that bypass the redirect
    #[serde(default = "default_asset_extensions")]
    pub asset_extensions: Vec<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            path: default_maintenance_path(),
            redirect_status: default_redirect_status(),
            asset_prefixes: default_asset_prefixes(),
            asset_extensions: default_asset_extensions(),
        }
    }
}

/// Whether service commands are run through sudo
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// Use sudo unless already running as root (default)
    #[default]
    Auto,
    /// Always prefix commands with sudo
    Always,
    /// Run commands as-is
    Never,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Configuration check command (default: nginx -t)
    #[serde(default = "default_check_command")]
    pub check_command: String,

    /// Reload command (default: systemctl reload nginx)
    #[serde(default = "default_reload_command")]
    pub reload_command: String,

    #[serde(default)]
    pub elevation: Elevation,

    /// Restore the backup when reload fails after a successful check
    #[serde(default = "default_true")]
    pub rollback_on_reload_failure: bool,

    /// Run the configuration check even when nothing changed
    #[serde(default = "default_true")]
    pub validate_unchanged: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            check_command: default_check_command(),
            reload_command: default_reload_command(),
            elevation: Elevation::default(),
            rollback_on_reload_failure: true,
            validate_unchanged: true,
        }
    }
}

// Default value functions
fn default_env_file() -> PathBuf {
    PathBuf::from("/var/www/site/.env.production")
}

fn default_site_config() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available/default")
}

fn default_template() -> PathBuf {
    PathBuf::from("/etc/maintgate/site.conf.template")
}

fn default_flag_key() -> String {
    "MAINTENANCE_MODE".to_string()
}

fn default_upstream() -> String {
    "http://127.0.0.1:4321".to_string()
}

fn default_proxy_timeout() -> u64 {
    60
}

fn default_maintenance_path() -> String {
    "/maintenance".to_string()
}

fn default_redirect_status() -> u16 {
    302 // temporary, so clients keep the real URL
}

fn default_asset_prefixes() -> Vec<String> {
    vec!["_astro/".to_string(), "favicon".to_string()]
}

fn default_asset_extensions() -> Vec<String> {
    ["css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "eot"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_check_command() -> String {
    "nginx -t".to_string()
}

fn default_reload_command() -> String {
    "systemctl reload nginx".to_string()
}

fn default_true() -> bool {
    true
}

/// Characters that would end or split an nginx directive
fn is_directive_breaking(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\'')
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let key = &self.flag.key;
        if key.is_empty() || key.contains('=') {
            errors.push(format!("flag.key '{}' must be non-empty and contain no '='", key));
        }

        let directive_values = [
            ("maintenance.path", std::slice::from_ref(&self.maintenance.path)),
            ("upstream.address", std::slice::from_ref(&self.upstream.address)),
            ("maintenance.asset_prefixes", self.maintenance.asset_prefixes.as_slice()),
            ("maintenance.asset_extensions", self.maintenance.asset_extensions.as_slice()),
        ];
        for (name, values) in directive_values {
            for value in values {
                if value.is_empty() || value.chars().any(is_directive_breaking) {
                    errors.push(format!(
                        "{} '{}' must be non-empty and contain no whitespace, quotes or any of ; {{ }} #",
                        name, value
                    ));
                }
            }
        }

        if !self.maintenance.path.starts_with('/') {
            errors.push(format!(
                "maintenance.path '{}' must start with '/'",
                self.maintenance.path
            ));
        }

        if !(300..400).contains(&self.maintenance.redirect_status) {
            errors.push(format!(
                "maintenance.redirect_status {} is not a 3xx status",
                self.maintenance.redirect_status
            ));
        }

        let address = &self.upstream.address;
        if !address.starts_with("http://") && !address.starts_with("https://") {
            errors.push(format!(
                "upstream.address '{}' must start with http:// or https://",
                address
            ));
        }

        for (name, command) in [
            ("service.check_command", &self.service.check_command),
            ("service.reload_command", &self.service.reload_command),
        ] {
            match shell_words::split(command) {
                Ok(words) if !words.is_empty() => {}
                Ok(_) => errors.push(format!("{} must not be empty", name)),
                Err(e) => errors.push(format!("{} '{}': {}", name, command, e)),
            }
        }

        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "Configuration errors:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        Ok(())
    }

    /// Settings needed to produce the maintenance and normal blocks
    pub fn block_settings(&self) -> BlockSettings {
        BlockSettings {
            upstream: self.upstream.address.clone(),
            maintenance_path: self.maintenance.path.clone(),
            redirect_status: self.maintenance.redirect_status,
            asset_prefixes: self.maintenance.asset_prefixes.clone(),
            asset_extensions: self.maintenance.asset_extensions.clone(),
            connect_timeout: Duration::from_secs(self.upstream.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.upstream.read_timeout_secs),
            send_timeout: Duration::from_secs(self.upstream.send_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[paths]
env_file = "/srv/app/.env.production"
site_config = "/etc/nginx/sites-available/app"
template = "/srv/app/deploy/site.conf.template"
lock_file = "/run/maintgate.lock"

[flag]
key = "SITE_MAINTENANCE"

[materializer]
strategy = "legacy"

[upstream]
address = "http://127.0.0.1:3000"
read_timeout_secs = 120

[maintenance]
path = "/down"
redirect_status = 307

[service]
check_command = "nginx -t -c /etc/nginx/nginx.conf"
reload_command = "systemctl reload nginx"
elevation = "never"
rollback_on_reload_failure = false
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.paths.env_file, PathBuf::from("/srv/app/.env.production"));
        assert_eq!(config.paths.lock_file, Some(PathBuf::from("/run/maintgate.lock")));
        assert_eq!(config.flag.key, "SITE_MAINTENANCE");
        assert_eq!(config.materializer.strategy, Strategy::Legacy);
        assert_eq!(config.upstream.address, "http://127.0.0.1:3000");
        assert_eq!(config.upstream.read_timeout_secs, 120);
        assert_eq!(config.upstream.connect_timeout_secs, 60);
        assert_eq!(config.maintenance.path, "/down");
        assert_eq!(config.maintenance.redirect_status, 307);
        assert_eq!(config.service.elevation, Elevation::Never);
        assert!(!config.service.rollback_on_reload_failure);
        assert!(config.service.validate_unchanged);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = Config::from_toml(include_str!("../deploy/maintgate.toml")).unwrap();
        assert_eq!(
            config.paths.site_config,
            PathBuf::from("/etc/nginx/sites-available/example.com")
        );
        assert_eq!(config.materializer.strategy, Strategy::Template);
        assert_eq!(config.maintenance.asset_prefixes, default_asset_prefixes());
    }

    #[test]
    fn test_empty_config_equals_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.flag.key, "MAINTENANCE_MODE");
        assert_eq!(config.materializer.strategy, Strategy::Template);
        assert_eq!(config.upstream.address, "http://127.0.0.1:4321");
        assert_eq!(config.maintenance.path, "/maintenance");
        assert_eq!(config.maintenance.redirect_status, 302);
        assert!(config.maintenance.asset_extensions.contains(&"woff2".to_string()));
        assert_eq!(config.service.check_command, "nginx -t");
        assert_eq!(config.service.reload_command, "systemctl reload nginx");
        assert_eq!(config.service.elevation, Elevation::Auto);
        assert!(config.service.rollback_on_reload_failure);
        assert!(config.paths.lock_file.is_none());
    }

    #[test]
    fn test_validate_multiple_errors() {
        let toml = r#"
[flag]
key = "A=B"

[maintenance]
path = "maintenance"
redirect_status = 200

[upstream]
address = "127.0.0.1:4321"

[service]
check_command = ""
reload_command = "systemctl 'reload"
"#;
        let err = Config::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("flag.key"));
        assert!(err.contains("maintenance.path"));
        assert!(err.contains("redirect_status"));
        assert!(err.contains("upstream.address"));
        assert!(err.contains("service.check_command"));
        assert!(err.contains("service.reload_command"));
    }

    #[test]
    fn test_validate_rejects_directive_breaking_values() {
        let toml = r#"
[upstream]
address = "http://127.0.0.1:4321; return 200"

[maintenance]
path = "/down#here"
asset_prefixes = ["img{2}", "a b;"]
asset_extensions = ["css", "j\"s", ""]
"#;
        let err = Config::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("upstream.address 'http://127.0.0.1:4321; return 200'"));
        assert!(err.contains("maintenance.path '/down#here'"));
        assert!(err.contains("maintenance.asset_prefixes 'img{2}'"));
        assert!(err.contains("maintenance.asset_prefixes 'a b;'"));
        assert!(err.contains("maintenance.asset_extensions 'j\"s'"));
        assert!(err.contains("maintenance.asset_extensions ''"));
        assert!(!err.contains("'css'"));
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let err = Config::from_toml("[materializer]\nstrategy = \"magic\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load_or_default(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::load(tmp.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_block_settings_from_config() {
        let mut config = Config::default();
        config.upstream.send_timeout_secs = 5;
        let settings = config.block_settings();
        assert_eq!(settings.upstream, "http://127.0.0.1:4321");
        assert_eq!(settings.send_timeout, Duration::from_secs(5));
        assert_eq!(settings.maintenance_path, "/maintenance");
    }
}
