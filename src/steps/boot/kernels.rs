use console::style;

use crate::{
    config::KernelVariant,
    error::SetupError,
    patch,
    steps::{boot, packages, Context},
    ui,
};

/// Kernels offered next to the stock `linux`. LTS is what the recovery
/// entries boot, so it is preselected.
const OFFERED: &[KernelVariant] = &[KernelVariant::Lts, KernelVariant::Zen];

/// Asks which extra kernels to install.
pub fn ask(ctx: &Context<'_>) -> Result<Vec<KernelVariant>, SetupError> {
    ui::print_kv_box(
        "Kernel variants",
        &[
            ("lts", "long-term support, boots the recovery entries"),
            ("zen", "performance-tuned, lower latency"),
        ],
    );
    println!();

    let items: Vec<String> = OFFERED
        .iter()
        .map(|k| {
            format!(
                "{}  {}",
                style(format!("{:<10}", k.package_name())).cyan().bold(),
                style(k.display_name()).dim()
            )
        })
        .collect();
    let defaults: Vec<bool> = OFFERED.iter().map(|k| *k == KernelVariant::Lts).collect();

    let picked = ui::choose_many(
        "Which kernels do you want to add?",
        &items,
        &defaults,
        ctx.assume_yes,
    )?
    .unwrap_or_default();
    Ok(picked.into_iter().map(|i| OFFERED[i]).collect())
}

/// Installs `kernel` with its headers and gives it a loader entry cloned
/// from the default one.
pub fn install_kernel(ctx: &Context<'_>, kernel: KernelVariant) -> Result<(), SetupError> {
    let pkg = kernel.package_name();
    let headers = kernel.headers_package();
    packages::pacman_install(ctx, &[pkg, headers.as_str()])?;

    let entry = boot::default_entry(ctx)?.for_kernel(pkg, &format!("Arch Linux ({})", pkg));
    let path = ctx.config.loader_entries_dir().join(format!("{pkg}.conf"));
    patch::write_template(ctx, &path, &entry.render())?;

    ui::print_success(&format!("Kernel '{}' installed.", pkg));
    Ok(())
}

pub fn install(ctx: &Context<'_>) -> Result<(), SetupError> {
    let kernels = ask(ctx)?;
    if kernels.is_empty() {
        ui::print_info("No extra kernel selected.");
        return Ok(());
    }
    for kernel in kernels {
        install_kernel(ctx, kernel)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        cmd::mock::MockShell,
        steps::{
            boot::fixtures::{install_loader, read},
            testing::{config_in, installed},
        },
    };

    #[test]
    fn default_selection_installs_lts_with_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        install_loader(&config);
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        install(&ctx).unwrap();

        let calls = shell.calls_to("pacman");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            installed(&calls[0]),
            BTreeSet::from(["linux-lts", "linux-lts-headers"].map(String::from))
        );
        let entry = read(&config.loader_entries_dir().join("linux-lts.conf"));
        assert!(entry.starts_with("title   Arch Linux (linux-lts)\nlinux   /vmlinuz-linux-lts\n"));
        assert!(entry.contains("initrd  /initramfs-linux-lts.img\n"));
    }

    #[test]
    fn missing_default_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        let err = install_kernel(&ctx, KernelVariant::Zen).unwrap_err();
        assert!(matches!(err, SetupError::PatternNotFound { .. }));
    }
}
