use crate::{
    cmd::Cmd,
    error::SetupError,
    steps::{packages, Context},
    ui,
};

/// The AUR helper every AUR install goes through.
pub const HELPER: &str = "paru";

const PARU_GIT: &str = "https://aur.archlinux.org/paru-bin.git";

/// Builds and installs paru from the AUR unless it is already on PATH.
///
/// makepkg refuses to run as root, so this only works from the regular user
/// account preflight insists on.
pub fn ensure_helper(ctx: &Context<'_>) -> Result<(), SetupError> {
    if ctx.shell.has_program(HELPER) {
        tracing::debug!("paru already installed");
        return Ok(());
    }

    ui::print_info("Bootstrapping the paru AUR helper…");
    packages::pacman_install(ctx, &["base-devel", "git"])?;

    let build_root = tempfile::Builder::new().prefix("archsetup-paru").tempdir()?;
    let checkout = build_root.path().join("paru-bin");

    ctx.shell.run_with_spinner(
        &Cmd::new("git").args([
            "clone",
            "--depth",
            "1",
            PARU_GIT,
            &checkout.display().to_string(),
        ]),
        "Cloning paru-bin from the AUR…",
        "paru-bin cloned.",
    )?;

    // makepkg asks for the sudo password and shows build output.
    ctx.shell.run_interactive(
        &Cmd::new("makepkg")
            .args(["-si", "--noconfirm"])
            .current_dir(&checkout),
    )?;

    tracing::info!("paru installed");
    ui::print_success("paru installed.");
    Ok(())
}
