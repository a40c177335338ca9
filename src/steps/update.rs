//! Scheduled system updates.
//!
//! A marked block in root's crontab runs `archsetup update` once a week and
//! retries on the following hours. Every attempt after a successful one exits
//! early thanks to a timestamp file, and a lock keeps attempts from
//! overlapping when an upgrade runs long.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use time::OffsetDateTime;

use crate::{
    cmd::Cmd,
    config::UpdateConfig,
    error::SetupError,
    preflight,
    steps::{aur, boot::recovery, packages, pacman, warn_and_continue, Context},
    ui,
};

pub const BEGIN_MARKER: &str = "# >>> archsetup scheduled update >>>";
pub const END_MARKER: &str = "# <<< archsetup scheduled update <<<";

const LOCK_FILE: &str = "update.lock";
const STAMP_FILE: &str = "last-update";
/// Only used to name the backup of the previous crontab.
const ROOT_CRONTAB: &str = "/var/spool/cron/root";

// ── Crontab ───────────────────────────────────────────────────────────────────

/// The marked crontab block: first run plus `retries` hourly attempts.
pub fn cron_block(binary: &Path, cfg: &UpdateConfig) -> String {
    let mut out = format!("{BEGIN_MARKER}\n");
    for attempt in 0..=u32::from(cfg.retries) {
        let hour = u32::from(cfg.hour) + attempt;
        let weekday = (u32::from(cfg.weekday) + hour / 24) % 7;
        out.push_str(&format!(
            "0 {} * * {} {} update\n",
            hour % 24,
            weekday,
            binary.display()
        ));
    }
    out.push_str(END_MARKER);
    out.push('\n');
    out
}

/// Replaces a previous marked block (if any) with `block`, keeping every
/// other line.
pub fn merge_crontab(existing: &str, block: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut inside = false;
    for line in existing.lines() {
        let trimmed = line.trim();
        if trimmed == BEGIN_MARKER {
            inside = true;
        } else if trimmed == END_MARKER {
            inside = false;
        } else if !inside {
            kept.push(line);
        }
    }
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }

    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(block);
    out
}

/// Installs cronie and the update block in root's crontab.
pub fn schedule(ctx: &Context<'_>) -> Result<(), SetupError> {
    recovery::install_self(ctx)?;
    packages::pacman_install(ctx, &["cronie"])?;
    packages::enable_service(ctx, "cronie.service")?;

    // `crontab -l` exits 1 when there is no crontab yet.
    let existing = ctx
        .shell
        .probe(&Cmd::sudo("crontab").arg("-l"))
        .unwrap_or_default();
    let block = cron_block(&ctx.config.paths.installed_binary, &ctx.config.update);
    let merged = merge_crontab(&existing, &block);

    if merged == existing {
        ui::print_info("Update schedule already installed.");
        return Ok(());
    }
    if !existing.is_empty() {
        ctx.backups.backup_contents(Path::new(ROOT_CRONTAB), &existing)?;
    }
    ctx.shell.run_with_spinner(
        &Cmd::sudo("crontab").arg("-").stdin(merged),
        "Installing the update schedule…",
        "Weekly update scheduled.",
    )?;

    let cfg = &ctx.config.update;
    let when = format!("day {} at {:02}:00", cfg.weekday, cfg.hour);
    let retries = format!("{} hourly", cfg.retries);
    ui::print_kv_box(
        "Scheduled update",
        &[("First run", when.as_str()), ("Retries", retries.as_str())],
    );
    Ok(())
}

// ── `archsetup update` ────────────────────────────────────────────────────────

/// Exclusive, non-blocking; released when the file is dropped.
fn acquire_lock(path: &Path) -> Result<File, SetupError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            Err(SetupError::Locked(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether the stamp records a success less than `min_hours` before `now`.
pub fn recently_updated(stamp: Option<&str>, now: i64, min_hours: u64) -> bool {
    let Some(last) = stamp.and_then(|s| s.trim().parse::<i64>().ok()) else {
        return false;
    };
    let age = now.saturating_sub(last);
    age >= 0 && (age as u64) < min_hours.saturating_mul(3600)
}

pub fn run(ctx: &Context<'_>) -> Result<(), SetupError> {
    run_as(ctx, preflight::is_root())
}

/// The cron job runs as root, where paru refuses to work, so root upgrades
/// go through pacman. A user run can use paru and covers the AUR too.
fn run_as(ctx: &Context<'_>, as_root: bool) -> Result<(), SetupError> {
    let dir: PathBuf = if as_root {
        ctx.config.paths.state_dir.clone()
    } else {
        ctx.config.paths.log_dir.clone()
    };

    let dry_run = ctx.shell.is_dry_run();
    let _lock = if dry_run {
        None
    } else {
        match acquire_lock(&dir.join(LOCK_FILE)) {
            Err(SetupError::Locked(path)) => {
                tracing::info!(lock = %path.display(), "another update is running");
                return Ok(());
            }
            other => Some(other?),
        }
    };

    let stamp = dir.join(STAMP_FILE);
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let previous = fs::read_to_string(&stamp).ok();
    if recently_updated(previous.as_deref(), now, ctx.config.update.min_interval_hours) {
        tracing::info!("recent successful update, nothing to do");
        return Ok(());
    }

    tracing::info!(as_root, "starting system update");
    if as_root || !ctx.shell.has_program(aur::HELPER) {
        pacman::upgrade(ctx)?;
    } else {
        ctx.shell
            .run_interactive(&Cmd::new(aur::HELPER).args(["-Syu", "--noconfirm"]))?;
    }

    if ctx.shell.has_program("flatpak") {
        warn_and_continue(
            "flatpak update",
            ctx.shell
                .run_interactive(&Cmd::new("flatpak").args(["update", "-y", "--noninteractive"])),
        );
    }

    if dry_run {
        tracing::info!(stamp = %stamp.display(), "dry-run, stamp not written");
    } else {
        fs::write(&stamp, format!("{now}\n"))?;
    }
    tracing::info!("system update finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::{mock::MockShell, SystemShell},
        steps::testing::config_in,
    };

    const BIN: &str = "/usr/local/bin/archsetup";

    #[test]
    fn block_has_first_run_and_three_retries() {
        let block = cron_block(Path::new(BIN), &UpdateConfig::default());
        assert_eq!(
            block,
            format!(
                "{BEGIN_MARKER}\n\
                 0 10 * * 0 {BIN} update\n\
                 0 11 * * 0 {BIN} update\n\
                 0 12 * * 0 {BIN} update\n\
                 0 13 * * 0 {BIN} update\n\
                 {END_MARKER}\n"
            )
        );
    }

    #[test]
    fn late_retries_roll_over_to_the_next_day() {
        let cfg = UpdateConfig { weekday: 6, hour: 23, retries: 1, min_interval_hours: 20 };
        let block = cron_block(Path::new(BIN), &cfg);
        assert!(block.contains("0 23 * * 6 "));
        assert!(block.contains("0 0 * * 0 "));
    }

    #[test]
    fn merge_replaces_old_block_and_keeps_user_lines() {
        let old = format!(
            "MAILTO=\"\"\n@daily backup.sh\n\n{BEGIN_MARKER}\n0 3 * * 1 old update\n{END_MARKER}\n"
        );
        let block = cron_block(Path::new(BIN), &UpdateConfig::default());

        let merged = merge_crontab(&old, &block);
        assert!(merged.starts_with("MAILTO=\"\"\n@daily backup.sh\n\n"));
        assert!(!merged.contains("old update"));
        assert!(merged.ends_with(&block));
        assert_eq!(merge_crontab(&merged, &block), merged);
        assert_eq!(merge_crontab("", &block), block);
    }

    #[test]
    fn schedule_feeds_crontab_on_stdin_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().respond("crontab", "@daily backup.sh\n");
        let ctx = Context::new(&config, &shell, true);

        schedule(&ctx).unwrap();

        let install = shell.calls_to("crontab").last().cloned().unwrap();
        assert_eq!(install.arguments(), ["-"]);
        let stdin = install.stdin_data().unwrap();
        assert!(stdin.starts_with("@daily backup.sh\n\n# >>> archsetup"));
        assert!(ctx.backups.latest(Path::new(ROOT_CRONTAB)).unwrap().is_some());
    }

    #[test]
    fn recent_stamp_skips_the_retry() {
        assert!(recently_updated(Some("1000\n"), 1000 + 3600, 20));
        assert!(!recently_updated(Some("1000\n"), 1000 + 20 * 3600, 20));
        assert!(!recently_updated(Some("garbage"), 1000, 20));
        assert!(!recently_updated(None, 1000, 20));
    }

    #[test]
    fn user_run_uses_paru_then_flatpak_and_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().with_program("paru").with_program("flatpak");
        let ctx = Context::new(&config, &shell, true);

        run_as(&ctx, false).unwrap();
        assert_eq!(shell.calls_to("paru")[0].arguments(), ["-Syu", "--noconfirm"]);
        assert_eq!(shell.calls_to("flatpak").len(), 1);
        assert!(shell.calls_to("pacman").is_empty());

        // The hourly retry finds the stamp and does nothing.
        run_as(&ctx, false).unwrap();
        assert_eq!(shell.calls().len(), 2);
    }

    #[test]
    fn root_run_uses_pacman() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().with_program("paru");
        let ctx = Context::new(&config, &shell, true);

        run_as(&ctx, true).unwrap();
        assert_eq!(shell.calls_to("pacman")[0].arguments(), ["-Syu", "--noconfirm"]);
        assert!(shell.calls_to("paru").is_empty());
        assert!(config.paths.state_dir.join(STAMP_FILE).exists());
    }

    #[test]
    fn dry_run_leaves_no_stamp_for_the_real_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let dry = SystemShell::new(true, true);
        let ctx = Context::new(&config, &dry, true);

        run_as(&ctx, false).unwrap();
        assert!(!config.paths.log_dir.join(STAMP_FILE).exists());
        assert!(!config.paths.log_dir.join(LOCK_FILE).exists());

        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);
        run_as(&ctx, false).unwrap();
        assert_eq!(shell.calls_to("pacman").len(), 1);
    }

    #[test]
    fn held_lock_exits_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let _held = acquire_lock(&config.paths.log_dir.join(LOCK_FILE)).unwrap();
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        run_as(&ctx, false).unwrap();
        assert!(shell.calls().is_empty());
    }
}
