//! Secure Boot with self-signed keys via `sbctl`.
//!
//! Keys can only be enrolled while the firmware is in Setup Mode. Once keys
//! exist and are enrolled, later runs only sign whatever `sbctl verify`
//! reports as unsigned.

use std::path::PathBuf;

use crate::{
    cmd::Cmd,
    error::SetupError,
    steps::{packages, Context},
    ui,
};

/// The fields of `sbctl status` that drive the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SbStatus {
    /// Keys have been created.
    pub installed: bool,
    pub setup_mode: bool,
    pub secure_boot: bool,
}

fn field<'a>(status: &'a str, name: &str) -> Option<&'a str> {
    status
        .lines()
        .find_map(|l| l.trim().strip_prefix(name)?.strip_prefix(':'))
        .map(str::trim)
}

pub fn parse_status(status: &str) -> SbStatus {
    let enabled = |name| field(status, name).is_some_and(|v| v.contains("Enabled"));
    SbStatus {
        installed: field(status, "Installed")
            .is_some_and(|v| !v.contains("not installed")),
        setup_mode: enabled("Setup Mode"),
        secure_boot: enabled("Secure Boot"),
    }
}

/// Paths `sbctl verify` lists as not signed.
pub fn unsigned_files(verify: &str) -> Vec<PathBuf> {
    verify
        .lines()
        .filter_map(|l| l.split_once(" is not signed"))
        .filter_map(|(head, _)| head.split_whitespace().last())
        .filter(|p| p.starts_with('/'))
        .map(PathBuf::from)
        .collect()
}

fn sbctl(args: &[&str]) -> Cmd {
    Cmd::sudo("sbctl").args(args.iter().copied())
}

pub fn configure(ctx: &Context<'_>) -> Result<(), SetupError> {
    packages::pacman_install(ctx, &["sbctl"])?;

    let status = parse_status(&ctx.shell.run_capture(&sbctl(&["status"]))?);
    tracing::info!(?status, "sbctl status");
    ui::print_kv_box(
        "Secure Boot",
        &[
            ("Keys", if status.installed { "created" } else { "none" }),
            ("Setup Mode", if status.setup_mode { "enabled" } else { "disabled" }),
            ("Secure Boot", if status.secure_boot { "enabled" } else { "disabled" }),
        ],
    );

    if status.setup_mode {
        if !ui::confirm(
            "Create and enroll Secure Boot keys (Microsoft keys included)?",
            true,
            ctx.assume_yes,
        )? {
            ui::print_info("Secure Boot setup skipped.");
            return Ok(());
        }
        if !status.installed {
            ctx.shell.run_with_spinner(
                &sbctl(&["create-keys"]),
                "Creating Secure Boot keys…",
                "Keys created.",
            )?;
        }
        ctx.shell.run_with_spinner(
            &sbctl(&["enroll-keys", "-m"]),
            "Enrolling keys into the firmware…",
            "Keys enrolled.",
        )?;
    } else if !status.installed {
        return Err(SetupError::SecureBootNotInSetupMode);
    } else {
        ui::print_info("Keys already enrolled; signing boot files only.");
    }

    sign_unsigned(ctx)
}

/// Signs every file `sbctl verify` flags; `-s` registers it for re-signing
/// by the pacman hook on kernel updates.
fn sign_unsigned(ctx: &Context<'_>) -> Result<(), SetupError> {
    let pending = unsigned_files(&ctx.shell.run_capture(&sbctl(&["verify"]))?);
    if pending.is_empty() {
        ui::print_success("All boot files are signed.");
        return Ok(());
    }

    for path in &pending {
        let path = path.display().to_string();
        ctx.shell.run_with_spinner(
            &sbctl(&["sign", "-s", path.as_str()]),
            &format!("Signing {}…", path),
            &format!("Signed {}", path),
        )?;
    }

    let left = unsigned_files(&ctx.shell.run_capture(&sbctl(&["verify"]))?);
    if left.is_empty() {
        ui::print_success("Secure Boot configured. Enable it in the firmware settings.");
    } else {
        tracing::warn!(?left, "files still unsigned after signing");
        ui::print_warning(&format!("{} file(s) are still unsigned.", left.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cmd::mock::MockShell, steps::testing::config_in};

    const SETUP_MODE: &str = "\
Installed:\t✗ sbctl is not installed
Setup Mode:\t✗ Enabled
Secure Boot:\t✗ Disabled
Vendor Keys:\tnone
";

    const USER_MODE: &str = "\
Installed:\t✓ sbctl is installed
Owner GUID:\ta9fbbdb7-a05f-48d5-b63a-08c5df45ee70
Setup Mode:\t✓ Disabled
Secure Boot:\t✓ Enabled
Vendor Keys:\tmicrosoft
";

    const VERIFY: &str = "\
Verifying file database and EFI images in /boot...
✓ /boot/EFI/systemd/systemd-bootx64.efi is signed
✗ /boot/vmlinuz-linux is not signed
✗ /boot/EFI/BOOT/BOOTX64.EFI is not signed
";

    #[test]
    fn status_fields() {
        assert_eq!(
            parse_status(SETUP_MODE),
            SbStatus { installed: false, setup_mode: true, secure_boot: false }
        );
        assert_eq!(
            parse_status(USER_MODE),
            SbStatus { installed: true, setup_mode: false, secure_boot: true }
        );
    }

    #[test]
    fn verify_lists_unsigned_paths() {
        assert_eq!(
            unsigned_files(VERIFY),
            [PathBuf::from("/boot/vmlinuz-linux"), PathBuf::from("/boot/EFI/BOOT/BOOTX64.EFI")]
        );
    }

    #[test]
    fn refuses_without_setup_mode_or_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().respond(
            "sbctl",
            "Installed:\t✗ sbctl is not installed\nSetup Mode:\t✓ Disabled\n",
        );
        let ctx = Context::new(&config, &shell, true);

        assert!(matches!(configure(&ctx), Err(SetupError::SecureBootNotInSetupMode)));
        assert!(shell
            .calls_to("sbctl")
            .iter()
            .all(|c| c.arguments() == ["status"]));
    }

    #[test]
    fn setup_mode_creates_and_enrolls_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().respond("sbctl", SETUP_MODE);
        let ctx = Context::new(&config, &shell, true);

        configure(&ctx).unwrap();

        let subcommands: Vec<String> = shell
            .calls_to("sbctl")
            .iter()
            .map(|c| c.arguments()[0].clone())
            .collect();
        assert_eq!(subcommands, ["status", "create-keys", "enroll-keys", "verify"]);
        assert!(shell.calls_to("sbctl").iter().all(Cmd::is_sudo));
    }
}
