//! The maintenance toggle: flag, backup, materialize, validate, reload
//!
//! Every exit path either leaves the live file in the requested, validated
//! state or restores the backup taken at the start of the run. The only
//! exception is a first run with no previous file, where there is nothing to
//! restore.

use crate::backup::{replace_file, BackupManager};
use crate::blocks::BlockSettings;
use crate::config::{Config, Strategy};
use crate::error::{Error, Result};
use crate::flag::read_maintenance_flag;
use crate::inspect::{detect_active, ActiveBlock};
use crate::service::ServiceControl;
use crate::surgery;
use crate::template::{materialize, Materialized, Template};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The live file already matched the flag; nothing was written or reloaded
    Unchanged {
        maintenance: bool,
        backup: Option<PathBuf>,
    },
    /// The live file was rewritten, validated and the service reloaded
    Applied {
        maintenance: bool,
        backup: Option<PathBuf>,
    },
}

impl Outcome {
    pub fn changed(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }

    pub fn maintenance(&self) -> bool {
        match self {
            Outcome::Unchanged { maintenance, .. } | Outcome::Applied { maintenance, .. } => {
                *maintenance
            }
        }
    }

    pub fn backup(&self) -> Option<&Path> {
        match self {
            Outcome::Unchanged { backup, .. } | Outcome::Applied { backup, .. } => {
                backup.as_deref()
            }
        }
    }
}

/// Snapshot of the flag versus the live file
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub maintenance_flag: bool,
    pub active: ActiveBlock,
    pub in_sync: bool,
    pub site_config: PathBuf,
    pub site_config_exists: bool,
    pub backups: usize,
}

pub struct Workflow<S> {
    config: Config,
    blocks: BlockSettings,
    backups: BackupManager,
    service: S,
}

impl<S: ServiceControl> Workflow<S> {
    pub fn new(config: Config, service: S) -> Self {
        let blocks = config.block_settings();
        let backups = BackupManager::new(&config.paths.site_config);
        Self {
            config,
            blocks,
            backups,
            service,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Read the flag from the environment file
    pub fn read_flag(&self) -> bool {
        read_maintenance_flag(&self.config.paths.env_file, &self.config.flag.key)
    }

    fn site_path(&self) -> &Path {
        &self.config.paths.site_config
    }

    fn read_site(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(self.site_path()) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Content the live file should have for `maintenance`
    ///
    /// Returns `Ok(None)` when the current content already matches.
    pub fn desired(&self, maintenance: bool, current: Option<&str>) -> Result<Option<String>> {
        match self.config.materializer.strategy {
            Strategy::Template => {
                let template = Template::load(&self.config.paths.template)?;
                let rendered = template.render(maintenance, &self.blocks);
                Ok(match materialize(current, rendered) {
                    Materialized::Unchanged => None,
                    Materialized::Changed(content) => Some(content),
                })
            }
            Strategy::Legacy => {
                warn!("The legacy in-place editor is deprecated; switch to a site template");
                let current =
                    current.ok_or_else(|| Error::SiteConfigMissing(self.site_path().to_path_buf()))?;
                surgery::apply(current, maintenance, &self.blocks)
            }
        }
    }

    /// Full document for `maintenance` without touching anything
    pub fn preview(&self, maintenance: bool) -> Result<String> {
        let current = self.read_site()?;
        match self.desired(maintenance, current.as_deref())? {
            Some(content) => Ok(content),
            None => Ok(current.unwrap_or_default()),
        }
    }

    /// Compare the flag with the live file
    pub fn status(&self) -> Result<Status> {
        let maintenance_flag = self.read_flag();
        let current = self.read_site()?;
        let active = current
            .as_deref()
            .map(|doc| detect_active(doc, &self.blocks))
            .unwrap_or(ActiveBlock::Neither);

        Ok(Status {
            maintenance_flag,
            active,
            in_sync: active.matches_flag(maintenance_flag),
            site_config: self.site_path().to_path_buf(),
            site_config_exists: current.is_some(),
            backups: self.backups.list()?.len(),
        })
    }

    /// Run the toggle once
    pub fn run(&self) -> Result<Outcome> {
        let maintenance = self.read_flag();
        info!(
            maintenance,
            env_file = %self.config.paths.env_file.display(),
            "Configuring maintenance mode"
        );

        let backup = self.backups.create()?;

        let mut written = false;
        match self.apply(maintenance, &mut written) {
            Ok(true) => Ok(Outcome::Applied {
                maintenance,
                backup,
            }),
            Ok(false) => Ok(Outcome::Unchanged {
                maintenance,
                backup,
            }),
            Err(e) => {
                error!(code = e.kind().as_str(), error = %e, "Maintenance mode change failed");
                if written && self.should_roll_back(&e) {
                    self.rollback(backup.as_deref());
                } else if written {
                    warn!("Leaving the validated configuration in place");
                } else {
                    info!(path = %self.site_path().display(), "Site configuration was not modified");
                }
                Err(e)
            }
        }
    }

    fn apply(&self, maintenance: bool, written: &mut bool) -> Result<bool> {
        let current = self.read_site()?;

        let Some(content) = self.desired(maintenance, current.as_deref())? else {
            info!(maintenance, "Site configuration already in desired state");
            if self.config.service.validate_unchanged {
                if let Err(e) = self.service.validate() {
                    warn!(error = %e, "Unchanged configuration failed validation");
                }
            }
            return Ok(false);
        };

        replace_file(self.site_path(), content.as_bytes())?;
        *written = true;
        info!(path = %self.site_path().display(), maintenance, "Site configuration updated");

        self.service.validate()?;
        self.service.reload()?;
        Ok(true)
    }

    fn should_roll_back(&self, err: &Error) -> bool {
        !matches!(err, Error::ReloadFailed { .. }) || self.config.service.rollback_on_reload_failure
    }

    fn rollback(&self, backup: Option<&Path>) {
        let Some(backup) = backup else {
            warn!(
                path = %self.site_path().display(),
                "No backup to restore (first run); leaving site configuration as is"
            );
            return;
        };

        info!(backup = %backup.display(), "Restoring backup");
        if let Err(e) = self.backups.restore(backup) {
            error!(backup = %backup.display(), error = %e, "Failed to restore backup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingService {
        validations: Cell<usize>,
        reloads: Cell<usize>,
    }

    impl ServiceControl for CountingService {
        fn validate(&self) -> Result<()> {
            self.validations.set(self.validations.get() + 1);
            Ok(())
        }

        fn reload(&self) -> Result<()> {
            self.reloads.set(self.reloads.get() + 1);
            Ok(())
        }
    }

    fn setup(tmp: &TempDir, flag: &str) -> Config {
        let mut config = Config::default();
        config.paths.env_file = tmp.path().join(".env.production");
        config.paths.site_config = tmp.path().join("site");
        config.paths.template = tmp.path().join("site.conf.template");
        std::fs::write(&config.paths.env_file, format!("MAINTENANCE_MODE={}\n", flag)).unwrap();
        std::fs::write(
            &config.paths.template,
            "server {\n    listen 443 ssl;\n    {{MAINTENANCE_MODE_BLOCK}}\n    {{NORMAL_LOCATION_BLOCK}}\n}\n",
        )
        .unwrap();
        config
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = Outcome::Applied {
            maintenance: true,
            backup: Some(PathBuf::from("/tmp/site.backup.1")),
        };
        assert!(outcome.changed());
        assert!(outcome.maintenance());
        assert_eq!(outcome.backup(), Some(Path::new("/tmp/site.backup.1")));
    }

    #[test]
    fn test_unchanged_run_validates_without_reload() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp, "false");
        let workflow = Workflow::new(config, CountingService::default());

        assert!(workflow.run().unwrap().changed());
        assert_eq!(workflow.service.reloads.get(), 1);

        let second = workflow.run().unwrap();
        assert!(!second.changed());
        assert_eq!(workflow.service.validations.get(), 2);
        assert_eq!(workflow.service.reloads.get(), 1);
    }

    #[test]
    fn test_unchanged_run_can_skip_validation() {
        let tmp = TempDir::new().unwrap();
        let mut config = setup(&tmp, "false");
        config.service.validate_unchanged = false;
        let workflow = Workflow::new(config, CountingService::default());

        workflow.run().unwrap();
        workflow.run().unwrap();
        assert_eq!(workflow.service.validations.get(), 1);
    }

    #[test]
    fn test_preview_does_not_write() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp, "true");
        let site = config.paths.site_config.clone();
        let workflow = Workflow::new(config, CountingService::default());

        let preview = workflow.preview(true).unwrap();
        assert!(preview.contains("return 302 /maintenance;"));
        assert!(!site.exists());
        assert_eq!(workflow.service.validations.get(), 0);
    }

    #[test]
    fn test_status_reports_sync() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp, "true");
        let workflow = Workflow::new(config, CountingService::default());

        let before = workflow.status().unwrap();
        assert!(before.maintenance_flag);
        assert!(!before.site_config_exists);
        assert_eq!(before.active, ActiveBlock::Neither);
        assert!(!before.in_sync);

        workflow.run().unwrap();
        let after = workflow.status().unwrap();
        assert_eq!(after.active, ActiveBlock::Maintenance);
        assert!(after.in_sync);
        assert_eq!(after.backups, 0);
    }

    #[test]
    fn test_legacy_requires_existing_site() {
        let tmp = TempDir::new().unwrap();
        let mut config = setup(&tmp, "true");
        config.materializer.strategy = Strategy::Legacy;
        let site = config.paths.site_config.clone();
        let workflow = Workflow::new(config, CountingService::default());

        let err = workflow.run().unwrap_err();
        assert!(matches!(err, Error::SiteConfigMissing(_)));
        assert!(!site.exists());
    }
}
