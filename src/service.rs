//! Configuration check and reload through the target service's own tools
//!
//! Both commands block until they exit; there is no timeout and no retry.

use crate::config::{Elevation, ServiceConfig};
use crate::error::{Error, Result};
use std::process::{Command, Output};
use tracing::{debug, info};

/// Operations the workflow needs from the web server
pub trait ServiceControl {
    /// Check the configuration on disk; the only gate before reload
    fn validate(&self) -> Result<()>;

    /// Apply the configuration without dropping connections
    fn reload(&self) -> Result<()>;
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Split a shell-style command string
    pub fn parse(command: &str) -> Result<Self> {
        let mut words = shell_words::split(command)
            .map_err(|e| Error::Config(format!("cannot parse command '{}': {}", command, e)))?;
        if words.is_empty() {
            return Err(Error::Config("empty command".to_string()));
        }
        let program = words.remove(0);
        Ok(Self { program, args: words })
    }

    /// Prefix the command with sudo
    pub fn elevated(self) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn display(&self) -> String {
        let mut words = vec![self.program.as_str()];
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }

    fn run(&self) -> Result<Output> {
        debug!(command = %self.display(), "Running command");
        Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| Error::CommandSpawn {
                command: self.display(),
                source,
            })
    }
}

/// Diagnostics from a failed command: stderr, or stdout if stderr is empty
fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    }
}

/// Whether the current process already runs with root privileges
#[cfg(unix)]
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

fn needs_sudo(elevation: Elevation) -> bool {
    match elevation {
        Elevation::Always => true,
        Elevation::Never => false,
        Elevation::Auto => !running_as_root(),
    }
}

/// Runs the configured check and reload commands on the local machine
#[derive(Debug, Clone)]
pub struct SystemService {
    check: CommandLine,
    reload: CommandLine,
}

impl SystemService {
    pub fn new(check: CommandLine, reload: CommandLine) -> Self {
        Self { check, reload }
    }

    /// Build from configuration, applying the elevation policy
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let mut check = CommandLine::parse(&config.check_command)?;
        let mut reload = CommandLine::parse(&config.reload_command)?;
        if needs_sudo(config.elevation) {
            check = check.elevated();
            reload = reload.elevated();
        }
        Ok(Self::new(check, reload))
    }

    pub fn check_command(&self) -> &CommandLine {
        &self.check
    }

    pub fn reload_command(&self) -> &CommandLine {
        &self.reload
    }
}

impl ServiceControl for SystemService {
    fn validate(&self) -> Result<()> {
        info!(command = %self.check.display(), "Testing configuration");
        let output = self.check.run()?;
        if output.status.success() {
            info!("Configuration is valid");
            Ok(())
        } else {
            Err(Error::ValidationFailed {
                diagnostics: diagnostics(&output),
            })
        }
    }

    fn reload(&self) -> Result<()> {
        info!(command = %self.reload.display(), "Reloading service");
        let output = self.reload.run()?;
        if output.status.success() {
            info!("Service reloaded");
            Ok(())
        } else {
            Err(Error::ReloadFailed {
                diagnostics: diagnostics(&output),
            })
        }
    }
}
