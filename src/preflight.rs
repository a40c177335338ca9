//! Environment checks run before any component: invoking user, required
//! tools and network reachability.

use crate::{
    cmd::{Cmd, Shell},
    error::SetupError,
    ui,
};

/// `(binary, package)` pairs that must be on PATH before anything runs.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("sudo", "sudo"),
    ("curl", "curl"),
    ("git", "git"),
];

const CONNECTIVITY_URL: &str = "https://archlinux.org";

/// Effective UID of this process, read from `/proc/self/status`.
fn current_uid() -> Option<u32> {
    std::fs::read_to_string("/proc/self/status").ok().and_then(|s| {
        s.lines()
            .find(|l| l.starts_with("Uid:"))
            .and_then(|l| l.split_whitespace().nth(2))
            .and_then(|v| v.parse::<u32>().ok())
    })
}

pub fn is_root() -> bool {
    current_uid() == Some(0)
}

/// Runs every check in order; the first failure aborts the run.
pub fn run(shell: &dyn Shell, assume_yes: bool) -> Result<(), SetupError> {
    check_not_root()?;
    ui::print_success("Running as a regular user.");

    ensure_tools(shell, assume_yes)?;
    ui::print_success("Required tools present.");

    // Cache sudo credentials once so later spinners are not interrupted.
    shell.run_interactive(&Cmd::new("sudo").arg("-v"))?;

    check_internet(shell)?;
    ui::print_success("Internet connection available.");
    Ok(())
}

fn check_not_root() -> Result<(), SetupError> {
    if is_root() {
        return Err(SetupError::RunningAsRoot);
    }
    Ok(())
}

/// Packages providing the required tools that are not on PATH.
pub fn missing_packages(shell: &dyn Shell) -> Vec<String> {
    let mut missing: Vec<String> = REQUIRED_TOOLS
        .iter()
        .filter(|(tool, _)| !shell.has_program(tool))
        .map(|(_, pkg)| pkg.to_string())
        .collect();
    missing.dedup();
    missing
}

/// Attempts an unattended install of missing tools, then re-checks.
pub fn ensure_tools(shell: &dyn Shell, assume_yes: bool) -> Result<(), SetupError> {
    let missing = missing_packages(shell);
    if missing.is_empty() {
        return Ok(());
    }

    tracing::warn!(?missing, "required tools missing");
    ui::print_warning(&format!("Missing required packages: {}", missing.join(", ")));

    // Without sudo there is no way to self-heal.
    if shell.has_program("sudo")
        && ui::confirm("Install them now with pacman?", true, assume_yes)?
    {
        let install = Cmd::sudo("pacman")
            .args(["-S", "--needed", "--noconfirm"])
            .args(missing.iter().cloned());
        if let Err(e) = shell.run_interactive(&install) {
            tracing::warn!(error = %e, "self-heal install failed");
        }
    }

    let still_missing = missing_packages(shell);
    if still_missing.is_empty() {
        Ok(())
    } else {
        Err(SetupError::MissingDependencies(still_missing))
    }
}

pub fn check_internet(shell: &dyn Shell) -> Result<(), SetupError> {
    let probe = Cmd::new("curl").args([
        "--silent",
        "--head",
        "--fail",
        "--max-time",
        "10",
        "--output",
        "/dev/null",
        CONNECTIVITY_URL,
    ]);
    match shell.probe(&probe) {
        Some(_) => Ok(()),
        None => Err(SetupError::Offline(CONNECTIVITY_URL.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::mock::MockShell;

    #[test]
    fn all_tools_present_needs_no_install() {
        let shell = MockShell::new()
            .with_program("sudo")
            .with_program("curl")
            .with_program("git");
        ensure_tools(&shell, true).unwrap();
        assert!(shell.calls_to("pacman").is_empty());
    }

    #[test]
    fn missing_tools_are_installed_then_rechecked() {
        // The mock never gains programs, so the re-check still fails.
        let shell = MockShell::new().with_program("sudo").with_program("curl");
        let err = ensure_tools(&shell, true).unwrap_err();

        let installs = shell.calls_to("pacman");
        assert_eq!(installs.len(), 1);
        assert_eq!(installs[0].arguments().last().map(String::as_str), Some("git"));
        match err {
            SetupError::MissingDependencies(pkgs) => assert_eq!(pkgs, vec!["git"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn without_sudo_nothing_is_attempted() {
        let shell = MockShell::new().with_program("git");
        let err = ensure_tools(&shell, true).unwrap_err();
        assert!(shell.calls().is_empty());
        assert!(err.to_string().contains("sudo pacman -S sudo curl"));
    }

    #[test]
    fn offline_when_curl_probe_fails() {
        let shell = MockShell::new().fail("curl", 6);
        assert!(matches!(
            check_internet(&shell),
            Err(SetupError::Offline(_))
        ));

        let shell = MockShell::new().respond("curl", "");
        assert!(check_internet(&shell).is_ok());
    }
}
