use crate::{
    cmd::Cmd,
    error::SetupError,
    patch,
    steps::{packages, Context},
    ui,
};

const CHAOTIC_KEY: &str = "3056513887B78AEB";
const KEYSERVER: &str = "keyserver.ubuntu.com";
const CHAOTIC_KEYRING: &str = "https://cdn-mirror.chaotic.cx/chaotic-aur/chaotic-keyring.pkg.tar.zst";
const CHAOTIC_MIRRORLIST: &str =
    "https://cdn-mirror.chaotic.cx/chaotic-aur/chaotic-mirrorlist.pkg.tar.zst";

pub const CHAOTIC_BLOCK: &str = "\
[chaotic-aur]
Include = /etc/pacman.d/chaotic-mirrorlist
";

pub const LIZARDBYTE_BLOCK: &str = "\
[lizardbyte]
SigLevel = Optional
Server = https://github.com/LizardByte/pacman-repo/releases/latest/download
";

// ── pacman.conf ───────────────────────────────────────────────────────────────

/// Enables `Color`, `VerbosePkgLists`, `ParallelDownloads` and multilib, then
/// refreshes the databases.
pub fn tweak_config(ctx: &Context<'_>) -> Result<(), SetupError> {
    let path = &ctx.config.paths.pacman_conf;
    let downloads = ctx.config.pacman.parallel_downloads.to_string();

    patch::patch_file(ctx, path, "enable Color", |c| {
        patch::set_directive(c, Some("options"), "Color", "", "")
    })?;
    patch::patch_file(ctx, path, "enable VerbosePkgLists", |c| {
        patch::set_directive(c, Some("options"), "VerbosePkgLists", "", "")
    })?;
    patch::patch_file(ctx, path, &format!("ParallelDownloads = {downloads}"), |c| {
        patch::set_directive(c, Some("options"), "ParallelDownloads", " = ", &downloads)
    })?;
    enable_multilib(ctx)?;
    sync(ctx)
}

/// Fails when pacman.conf carries no `[multilib]` section at all, since
/// 32-bit packages cannot be installed without it.
pub fn enable_multilib(ctx: &Context<'_>) -> Result<(), SetupError> {
    let outcome = patch::patch_file(ctx, &ctx.config.paths.pacman_conf, "enable [multilib]", |c| {
        patch::enable_section(c, "multilib")
    })?;
    if outcome.is_not_found() {
        return Err(SetupError::PatternNotFound {
            path: ctx.config.paths.pacman_conf.clone(),
            what: "[multilib] section".to_string(),
        });
    }
    Ok(())
}

/// `pacman -Sy` to pick up new or changed repositories.
pub fn sync(ctx: &Context<'_>) -> Result<(), SetupError> {
    ctx.shell.run_with_spinner(
        &Cmd::sudo("pacman").arg("-Sy"),
        "Refreshing package databases…",
        "Package databases refreshed.",
    )
}

/// Full system upgrade.
pub fn upgrade(ctx: &Context<'_>) -> Result<(), SetupError> {
    ctx.shell
        .run_interactive(&Cmd::sudo("pacman").args(["-Syu", "--noconfirm"]))
}

// ── Third-party repositories ──────────────────────────────────────────────────

/// Imports the Chaotic-AUR key, installs its keyring and mirrorlist and adds
/// the repository block. Skipped when the block is already present.
pub fn add_chaotic_aur(ctx: &Context<'_>) -> Result<(), SetupError> {
    if repo_configured(ctx, "chaotic-aur")? {
        ui::print_info("Chaotic-AUR already configured.");
        return Ok(());
    }

    ctx.shell.run_with_spinner(
        &Cmd::sudo("pacman-key").args(["--recv-key", CHAOTIC_KEY, "--keyserver", KEYSERVER]),
        "Receiving the Chaotic-AUR signing key…",
        "Chaotic-AUR key received.",
    )?;
    ctx.shell.run_with_spinner(
        &Cmd::sudo("pacman-key").args(["--lsign-key", CHAOTIC_KEY]),
        "Signing the Chaotic-AUR key locally…",
        "Chaotic-AUR key trusted.",
    )?;
    ctx.shell.run_interactive(
        &Cmd::sudo("pacman").args(["-U", "--noconfirm", CHAOTIC_KEYRING, CHAOTIC_MIRRORLIST]),
    )?;

    add_repo_block(ctx, "chaotic-aur", CHAOTIC_BLOCK)?;
    sync(ctx)
}

/// Adds the LizardByte repository (Sunshine game streaming).
pub fn add_lizardbyte(ctx: &Context<'_>) -> Result<(), SetupError> {
    add_repo_block(ctx, "lizardbyte", LIZARDBYTE_BLOCK)?;
    sync(ctx)
}

fn repo_configured(ctx: &Context<'_>, name: &str) -> Result<bool, SetupError> {
    let header = format!("[{name}]");
    Ok(ctx
        .shell
        .read_file(&ctx.config.paths.pacman_conf)?
        .is_some_and(|c| c.lines().any(|l| l.trim() == header)))
}

fn add_repo_block(ctx: &Context<'_>, name: &str, block: &str) -> Result<(), SetupError> {
    let header = format!("[{name}]");
    patch::patch_file(ctx, &ctx.config.paths.pacman_conf, &format!("add {header}"), |c| {
        patch::append_block(c, &header, block)
    })
    .map(drop)
}

// ── Mirrors ───────────────────────────────────────────────────────────────────

/// Ranks mirrors with reflector under a fixed timeout. On failure the
/// previous mirrorlist is put back from the backup store.
pub fn refresh_mirrors(ctx: &Context<'_>) -> Result<(), SetupError> {
    let mirrorlist = &ctx.config.paths.mirrorlist;
    if !ctx.shell.has_program("reflector") {
        packages::pacman_install(ctx, &["reflector"])?;
    }

    ctx.backups.backup(ctx.shell, mirrorlist)?;

    let result = ctx.shell.run_with_spinner(
        &reflector_cmd(ctx),
        "Ranking mirrors (this can take a minute)…",
        "Mirrorlist updated.",
    );

    if let Err(e) = result {
        tracing::warn!(error = %e, "reflector failed, restoring mirrorlist");
        ui::print_warning("Mirror ranking failed, restoring the previous mirrorlist.");
        restore_mirrorlist(ctx);
        return Err(e);
    }
    Ok(())
}

fn reflector_cmd(ctx: &Context<'_>) -> Cmd {
    let pacman = &ctx.config.pacman;
    let mut cmd = Cmd::sudo("timeout")
        .arg(pacman.mirror_timeout_secs.to_string())
        .args(["reflector", "--protocol", "https", "--latest", "20", "--sort", "rate"]);
    if !pacman.mirror_countries.is_empty() {
        cmd = cmd.args(["--country", &pacman.mirror_countries.join(",")]);
    }
    cmd.args(["--save", &ctx.config.paths.mirrorlist.display().to_string()])
}

/// Best effort: a failed restore is logged, never raised.
fn restore_mirrorlist(ctx: &Context<'_>) {
    let mirrorlist = &ctx.config.paths.mirrorlist;
    let restored = ctx
        .backups
        .latest(mirrorlist)
        .and_then(|latest| match latest {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)?;
                ctx.shell.write_file(mirrorlist, &contents)?;
                Ok(Some(path))
            }
            None => Ok(None),
        });

    match restored {
        Ok(Some(from)) => {
            tracing::info!(from = %from.display(), "mirrorlist restored");
            ui::print_success("Previous mirrorlist restored.");
        }
        Ok(None) => ui::print_warning("No mirrorlist backup to restore."),
        Err(e) => {
            tracing::error!(error = %e, "mirrorlist restore failed");
            ui::print_error(&format!("Could not restore the mirrorlist: {}", e));
        }
    }
}
