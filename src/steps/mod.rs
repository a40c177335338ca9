pub mod aur;
pub mod boot;
pub mod desktop;
pub mod gpu;
pub mod packages;
pub mod pacman;
pub mod tuning;
pub mod update;

use crate::{backup::BackupStore, cmd::Shell, config::Config, error::SetupError, ui};

/// What every component receives: the run's configuration, the host seam and
/// the backup store for files it edits.
pub struct Context<'a> {
    pub config: &'a Config,
    pub shell: &'a dyn Shell,
    pub backups: BackupStore,
    /// Answer every prompt with its default (`--yes`).
    pub assume_yes: bool,
}

impl<'a> Context<'a> {
    pub fn new(config: &'a Config, shell: &'a dyn Shell, assume_yes: bool) -> Self {
        Context {
            config,
            shell,
            backups: BackupStore::new(&config.paths.backup_dir).dry_run(shell.is_dry_run()),
            assume_yes,
        }
    }
}

/// Policy for optional sub-steps: log and show the failure, keep going.
pub fn warn_and_continue(what: &str, result: Result<(), SetupError>) {
    if let Err(e) = result {
        tracing::warn!(step = what, error = %e, "optional step failed");
        ui::print_warning(&format!("{} failed: {} (continuing)", what, e));
    }
}
