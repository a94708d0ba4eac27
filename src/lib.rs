//! Maintgate - switches an nginx site in and out of maintenance mode
//!
//! This library provides the pieces of a single toggle workflow:
//! - Reads a boolean flag from a deployment environment file
//! - Renders the site from a template, or edits it in place (deprecated)
//! - Backs up the live file before changing it
//! - Validates with `nginx -t` and reloads with `systemctl reload nginx`
//! - Restores the backup when anything after the backup fails

pub mod backup;
pub mod blocks;
pub mod config;
pub mod error;
pub mod flag;
pub mod inspect;
pub mod lock;
pub mod service;
pub mod surgery;
pub mod template;
pub mod workflow;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
