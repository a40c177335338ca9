use crate::{
    cmd::Cmd,
    error::SetupError,
    patch::{self, PatchOutcome},
    steps::{boot::kernel_params, packages, Context},
    ui,
};

const HOOK: &str = "plymouth";
const SPLASH_PARAMS: &[&str] = &["quiet", "splash"];

/// Inserts the plymouth hook into the active `HOOKS=(…)` array, right after
/// `systemd`, or `udev`, or `base`, whichever comes first in that preference.
pub fn add_hook(content: &str) -> PatchOutcome {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let Some(line) = lines.iter_mut().find(|l| l.trim_start().starts_with("HOOKS=(")) else {
        return PatchOutcome::NotFound;
    };

    let trimmed = line.trim();
    let Some(inner) = trimmed
        .strip_prefix("HOOKS=(")
        .and_then(|rest| rest.split_once(')'))
        .map(|(inner, _)| inner)
    else {
        return PatchOutcome::NotFound;
    };

    let mut hooks: Vec<&str> = inner.split_whitespace().collect();
    if hooks.contains(&HOOK) {
        return PatchOutcome::Unchanged;
    }
    let Some(anchor) = ["systemd", "udev", "base"]
        .iter()
        .find_map(|a| hooks.iter().position(|h| h == a))
    else {
        return PatchOutcome::NotFound;
    };
    hooks.insert(anchor + 1, HOOK);

    *line = format!("HOOKS=({})", hooks.join(" "));
    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    PatchOutcome::Changed(out)
}

/// Boot splash: package, initramfs hook, theme, `quiet splash`.
pub fn install(ctx: &Context<'_>) -> Result<(), SetupError> {
    packages::pacman_install(ctx, &[HOOK])?;

    let path = &ctx.config.paths.mkinitcpio_conf;
    let outcome = patch::patch_file(ctx, path, "add plymouth hook", add_hook)?;
    if outcome.is_not_found() {
        return Err(SetupError::PatternNotFound {
            path: path.clone(),
            what: "HOOKS array with base/udev/systemd".to_string(),
        });
    }

    // -R rebuilds the initramfs, which also picks up the new hook.
    let theme = &ctx.config.boot.plymouth_theme;
    ctx.shell.run_with_spinner(
        &Cmd::sudo("plymouth-set-default-theme").args(["-R", theme.as_str()]),
        &format!("Setting the {} theme and rebuilding the initramfs…", theme),
        "Initramfs rebuilt with the splash screen.",
    )?;

    kernel_params::add_to_all_entries(ctx, SPLASH_PARAMS)?;
    ui::print_success("Plymouth boot splash configured.");
    Ok(())
}
