use std::path::PathBuf;

use crate::{
    cmd::Cmd,
    error::SetupError,
    steps::{packages, warn_and_continue, Context},
    ui,
};

const GEXT: &str = "gext";
const GEXT_PACKAGE: &str = "gnome-extensions-cli";

/// Where `pipx` puts the `gext` entry point; not always on PATH yet.
fn pipx_bin() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".local/bin").join(GEXT))
}

/// The program to invoke for `gext`.
fn gext_program(ctx: &Context<'_>) -> String {
    if ctx.shell.has_program(GEXT) {
        return GEXT.to_string();
    }
    pipx_bin()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| GEXT.to_string())
}

/// Installs gnome-extensions-cli with pipx unless it is already available.
pub fn ensure_gext(ctx: &Context<'_>) -> Result<(), SetupError> {
    let local = pipx_bin().is_some_and(|p| p.exists());
    if ctx.shell.has_program(GEXT) || local {
        tracing::debug!(local, "gext already installed");
        return Ok(());
    }

    if !ctx.shell.has_program("pipx") {
        packages::pacman_install(ctx, &["python-pipx"])?;
    }
    ctx.shell.run_with_spinner(
        &Cmd::new("pipx").args(["install", GEXT_PACKAGE, "--system-site-packages"]),
        "Installing gnome-extensions-cli…",
        "gnome-extensions-cli installed.",
    )
}

/// Installs and enables every configured extension. A single extension
/// failing does not stop the others.
pub fn install(ctx: &Context<'_>) -> Result<(), SetupError> {
    let uuids = &ctx.config.desktop.extensions;
    if uuids.is_empty() {
        ui::print_info("No GNOME extensions configured.");
        return Ok(());
    }

    ensure_gext(ctx)?;
    let gext = gext_program(ctx);

    for uuid in uuids {
        let result = ctx
            .shell
            .run_with_spinner(
                &Cmd::new(&gext).args(["install", uuid.as_str()]),
                &format!("Installing {}…", uuid),
                &format!("{} installed.", uuid),
            )
            .and_then(|()| {
                ctx.shell
                    .run_capture(&Cmd::new(&gext).args(["enable", uuid.as_str()]))
                    .map(drop)
            });
        warn_and_continue(&format!("extension {}", uuid), result);
    }
    Ok(())
}
