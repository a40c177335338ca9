use crate::{
    cmd::Cmd,
    error::SetupError,
    patch,
    steps::{boot::kernel_params, packages, Context},
    ui,
};

pub const ZSWAP_PARAMS: &[&str] = &[
    "zswap.enabled=1",
    "zswap.compressor=zstd",
    "zswap.max_pool_percent=20",
];

pub const SYSCTL_FILE: &str = "99-archsetup.conf";
pub const SYSCTL: &str = "\
vm.swappiness = 10
vm.vfs_cache_pressure = 50
";

const SNAPPER_TIMERS: &[&str] = &["snapper-timeline.timer", "snapper-cleanup.timer"];

/// Compressed swap cache and desktop-friendly VM sysctls.
pub fn apply(ctx: &Context<'_>) -> Result<(), SetupError> {
    kernel_params::add_to_all_entries(ctx, ZSWAP_PARAMS)?;

    let path = ctx.config.paths.sysctl_dir.join(SYSCTL_FILE);
    if !patch::write_template(ctx, &path, SYSCTL)?.is_unchanged() {
        // Live values; the file covers the next boot regardless.
        ctx.shell.run_best_effort(&Cmd::sudo("sysctl").arg("--system"));
    }
    ui::print_success("zswap and sysctl tuning applied (zswap active after reboot).");
    Ok(())
}

/// True when `snapper list-configs` shows a `root` config.
pub fn has_root_config(list: &str) -> bool {
    list.lines()
        .filter_map(|l| l.split(&['│', '|'][..]).next())
        .any(|first| first.trim() == "root")
}

/// Timeline snapshots of `/` plus pre/post snapshots around pacman.
/// Snapper needs btrfs; other filesystems are skipped with a warning.
pub fn snapshots(ctx: &Context<'_>) -> Result<(), SetupError> {
    let fstype = ctx
        .shell
        .probe(&Cmd::new("findmnt").args(["-n", "-o", "FSTYPE", "/"]))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if fstype != "btrfs" {
        tracing::warn!(%fstype, "root is not btrfs, skipping snapper");
        ui::print_warning(&format!(
            "Root filesystem is '{}', snapper needs btrfs. Skipped.",
            if fstype.is_empty() { "unknown" } else { fstype.as_str() }
        ));
        return Ok(());
    }

    packages::pacman_install(ctx, &["snapper", "snap-pac"])?;

    let configs = ctx
        .shell
        .run_capture(&Cmd::sudo("snapper").arg("list-configs"))?;
    if has_root_config(&configs) {
        ui::print_info("snapper root config already exists.");
    } else {
        ctx.shell.run_with_spinner(
            &Cmd::sudo("snapper").args(["-c", "root", "create-config", "/"]),
            "Creating the snapper root config…",
            "snapper root config created.",
        )?;
    }

    for timer in SNAPPER_TIMERS {
        packages::enable_service(ctx, timer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::mock::MockShell,
        steps::{
            boot::fixtures::{install_loader, read},
            testing::config_in,
        },
    };

    #[test]
    fn apply_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        install_loader(&config);
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        apply(&ctx).unwrap();
        apply(&ctx).unwrap();

        assert_eq!(read(&config.paths.sysctl_dir.join(SYSCTL_FILE)), SYSCTL);
        let entry = read(&config.loader_entries_dir().join("arch.conf"));
        assert!(entry.ends_with(
            "rw zswap.enabled=1 zswap.compressor=zstd zswap.max_pool_percent=20\n"
        ));
        assert_eq!(shell.calls_to("sysctl").len(), 1);
        assert_eq!(shell.written().len(), 2);
    }

    #[test]
    fn root_config_detection() {
        let table = "\
Config │ Subvolume
───────┼──────────
root   │ /
";
        assert!(has_root_config(table));
        assert!(has_root_config("Config | Subvolume\n-------+----------\nroot   | /\n"));
        assert!(!has_root_config("Config │ Subvolume\n───────┼──────────\nhome   │ /home\n"));
    }

    #[test]
    fn snapper_is_skipped_off_btrfs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().respond("findmnt", "ext4\n");
        let ctx = Context::new(&config, &shell, true);

        snapshots(&ctx).unwrap();
        assert!(shell.calls_to("pacman").is_empty());
    }

    #[test]
    fn snapper_creates_root_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new().respond("findmnt", "btrfs\n");
        let ctx = Context::new(&config, &shell, true);

        snapshots(&ctx).unwrap();

        let snapper: Vec<Vec<String>> = shell
            .calls_to("snapper")
            .iter()
            .map(|c| c.arguments().to_vec())
            .collect();
        assert_eq!(snapper.len(), 2);
        assert_eq!(snapper[1], ["-c", "root", "create-config", "/"]);
        assert_eq!(shell.calls_to("systemctl").len(), 2);
    }
}
