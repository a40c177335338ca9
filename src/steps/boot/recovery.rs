//! Boot-failure counter and recovery menu.
//!
//! `archsetup-boot-count.service` runs early on every boot and increments a
//! counter; `archsetup-boot-ok.service` resets it once `multi-user.target` is
//! reached. When the counter reaches the threshold the loader default is
//! switched to the LTS recovery entry and the menu timeout raised, so the next
//! boot lands somewhere usable.
//!
//! This is a heuristic: a boot that is powered off or interrupted before
//! `multi-user.target` counts as a failure just like a crash does.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use crate::{
    cmd::Cmd,
    config::{Config, KernelVariant},
    error::SetupError,
    patch::{self, PatchOutcome},
    steps::{
        boot::{self, kernels, LoaderEntry},
        Context,
    },
    ui,
};

pub const COUNTER_FILE: &str = "boot-failures";
pub const RECOVERY_PREFIX: &str = "archsetup-recovery";
pub const RECOVERY_DEFAULT: &str = "archsetup-recovery-lts.conf";
pub const COUNT_UNIT: &str = "archsetup-boot-count.service";
pub const OK_UNIT: &str = "archsetup-boot-ok.service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Normal,
    Recovery,
}

// ── Counter ───────────────────────────────────────────────────────────────────

/// Consecutive unfinished boots, persisted as a bare integer.
#[derive(Debug, Clone)]
pub struct BootCounter {
    path: PathBuf,
    threshold: u32,
}

impl BootCounter {
    pub fn new(path: impl Into<PathBuf>, threshold: u32) -> Self {
        BootCounter {
            path: path.into(),
            threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        BootCounter::new(
            config.paths.state_dir.join(COUNTER_FILE),
            config.boot.failure_threshold,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or garbled file reads as zero.
    pub fn count(&self) -> u32 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn state(&self) -> BootState {
        self.state_for(self.count())
    }

    fn state_for(&self, count: u32) -> BootState {
        if count >= self.threshold {
            BootState::Recovery
        } else {
            BootState::Normal
        }
    }

    fn store(&self, count: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{count}\n"))
    }

    /// What `record_boot` would store, without storing it.
    pub fn next_boot(&self) -> (u32, BootState) {
        let count = self.count().saturating_add(1);
        (count, self.state_for(count))
    }

    pub fn record_boot(&self) -> io::Result<(u32, BootState)> {
        let (count, state) = self.next_boot();
        self.store(count)?;
        Ok((count, state))
    }

    pub fn record_success(&self) -> io::Result<()> {
        self.store(0)
    }
}

// ── loader.conf ───────────────────────────────────────────────────────────────

/// `key value` in loader.conf, appended when the key is absent.
fn set_loader_key(content: &str, key: &str, value: &str) -> PatchOutcome {
    match patch::set_directive(content, None, key, " ", value) {
        PatchOutcome::NotFound => {
            let line = format!("{key} {value}");
            patch::append_block(content, &line, &line)
        }
        other => other,
    }
}

pub fn loader_default(content: &str) -> Option<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| {
            l.strip_prefix("default")
                .filter(|rest| rest.starts_with(char::is_whitespace))
        })
        .map(str::trim)
}

/// A missing loader.conf is an error: the unit must fail visibly rather
/// than report a recovery switch that never happened.
fn point_loader(ctx: &Context<'_>, entry: &str, timeout: u32) -> Result<(), SetupError> {
    let path = ctx.config.loader_conf();
    let outcome = patch::patch_file(ctx, &path, &format!("default {entry}"), |c| {
        set_loader_key(c, "default", entry)
    })?;
    if outcome.is_not_found() {
        return Err(SetupError::PatternNotFound {
            path,
            what: format!("default {entry}"),
        });
    }
    let timeout = timeout.to_string();
    patch::patch_file(ctx, &path, &format!("timeout {timeout}"), |c| {
        set_loader_key(c, "timeout", &timeout)
    })?;
    Ok(())
}

// ── Unit-side handlers ────────────────────────────────────────────────────────

/// `boot-counter record-boot`
pub fn on_boot(ctx: &Context<'_>) -> Result<BootState, SetupError> {
    let counter = BootCounter::from_config(ctx.config);
    let (count, state) = if ctx.shell.is_dry_run() {
        tracing::info!(counter = %counter.path().display(), "dry-run, counter not written");
        counter.next_boot()
    } else {
        counter.record_boot()?
    };
    tracing::info!(count, ?state, "boot recorded");

    if state == BootState::Recovery {
        tracing::warn!(count, "failure threshold reached, selecting recovery entry");
        point_loader(ctx, RECOVERY_DEFAULT, ctx.config.boot.recovery_timeout)?;
    }
    Ok(state)
}

/// `boot-counter record-success`
pub fn on_success(ctx: &Context<'_>) -> Result<(), SetupError> {
    if ctx.shell.is_dry_run() {
        tracing::info!("dry-run, counter not reset");
    } else {
        BootCounter::from_config(ctx.config).record_success()?;
        tracing::info!("boot reached multi-user.target, counter reset");
    }

    let loader = ctx.shell.read_file(&ctx.config.loader_conf())?.unwrap_or_default();
    if loader_default(&loader).is_some_and(|d| d.starts_with(RECOVERY_PREFIX)) {
        let boot = &ctx.config.boot;
        tracing::info!(entry = %boot.default_entry, "restoring normal loader default");
        point_loader(ctx, &boot.default_entry, boot.normal_timeout)?;
    }
    Ok(())
}

/// `boot-counter status`
pub fn print_status(ctx: &Context<'_>) -> Result<(), SetupError> {
    let counter = BootCounter::from_config(ctx.config);
    let loader = ctx.shell.read_file(&ctx.config.loader_conf())?.unwrap_or_default();

    let file = counter.path().display().to_string();
    let count = counter.count().to_string();
    let threshold = ctx.config.boot.failure_threshold.to_string();
    let state = match counter.state() {
        BootState::Normal => "normal",
        BootState::Recovery => "recovery",
    };
    ui::print_kv_box(
        "Boot counter",
        &[
            ("File", file.as_str()),
            ("Failures", count.as_str()),
            ("Threshold", threshold.as_str()),
            ("State", state),
            ("Default", loader_default(&loader).unwrap_or("(unset)")),
        ],
    );
    Ok(())
}

// ── Setup ─────────────────────────────────────────────────────────────────────

/// The recovery menu, derived from the default entry.
pub fn recovery_entries(base: &LoaderEntry) -> Vec<(String, LoaderEntry)> {
    let lts = KernelVariant::Lts.package_name();
    let plain = base.clone().without_options(&["quiet", "splash"]);

    vec![
        (
            RECOVERY_DEFAULT.to_string(),
            plain.for_kernel(lts, "Arch Linux recovery (LTS kernel)"),
        ),
        (
            format!("{RECOVERY_PREFIX}-debug.conf"),
            LoaderEntry {
                title: "Arch Linux recovery (debug logging)".to_string(),
                ..plain.clone()
            }
            .with_extra_options(&["systemd.log_level=debug"]),
        ),
        (
            format!("{RECOVERY_PREFIX}-rollback.conf"),
            plain
                .for_kernel(lts, "Arch Linux recovery (rescue shell for snapper rollback)")
                .with_extra_options(&["systemd.unit=rescue.target"]),
        ),
    ]
}

pub fn count_unit(binary: &Path) -> String {
    format!(
        "\
[Unit]
Description=archsetup boot failure counter
DefaultDependencies=no
After=local-fs.target
Before=sysinit.target

[Service]
Type=oneshot
ExecStart={} boot-counter record-boot

[Install]
WantedBy=sysinit.target
",
        binary.display()
    )
}

pub fn ok_unit(binary: &Path) -> String {
    format!(
        "\
[Unit]
Description=archsetup successful boot marker
After=multi-user.target

[Service]
Type=oneshot
ExecStart={} boot-counter record-success

[Install]
WantedBy=multi-user.target
",
        binary.display()
    )
}

/// Copies the running binary to where the units and crontab expect it.
pub fn install_self(ctx: &Context<'_>) -> Result<(), SetupError> {
    let exe = std::env::current_exe()?;
    let target = &ctx.config.paths.installed_binary;
    if exe == *target {
        return Ok(());
    }
    ctx.shell.run_with_spinner(
        &Cmd::sudo("install").args([
            "-Dm755".to_string(),
            exe.display().to_string(),
            target.display().to_string(),
        ]),
        "Installing archsetup system-wide…",
        &format!("archsetup installed to {}", target.display()),
    )
}

pub fn install(ctx: &Context<'_>) -> Result<(), SetupError> {
    kernels::install_kernel(ctx, KernelVariant::Lts)?;

    let base = boot::default_entry(ctx)?;
    let entries_dir = ctx.config.loader_entries_dir();
    for (name, entry) in recovery_entries(&base) {
        patch::write_template(ctx, &entries_dir.join(&name), &entry.render())?;
        tracing::info!(entry = %name, "recovery entry in place");
    }

    install_self(ctx)?;
    let binary = &ctx.config.paths.installed_binary;
    let units = &ctx.config.paths.unit_dir;
    patch::write_template(ctx, &units.join(COUNT_UNIT), &count_unit(binary))?;
    patch::write_template(ctx, &units.join(OK_UNIT), &ok_unit(binary))?;

    ctx.shell.run_with_spinner(
        &Cmd::sudo("systemctl").arg("daemon-reload"),
        "Reloading systemd…",
        "systemd reloaded.",
    )?;
    // Plain enable: starting the counter now would count this boot twice.
    ctx.shell.run_with_spinner(
        &Cmd::sudo("systemctl").args(["enable", COUNT_UNIT, OK_UNIT]),
        "Enabling the boot counter units…",
        "Boot counter enabled.",
    )?;

    ui::print_success("Boot recovery menu installed.");
    ui::print_info(&format!(
        "After {} unfinished boots the LTS recovery entry becomes the default.",
        ctx.config.boot.failure_threshold
    ));
    ui::print_info("A boot interrupted before multi-user.target counts as unfinished.");
    Ok(())
}
