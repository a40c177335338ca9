//! The component checklist and its dispatch.

use std::fmt;

use console::style;

use crate::{
    error::SetupError,
    steps::{aur, boot, desktop, gpu, packages, pacman, tuning, update, Context},
    ui,
};

/// Everything the checklist offers, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    PacmanTweaks,
    SystemUpgrade,
    Mirrors,
    ChaoticAur,
    LizardByte,
    AurHelper,
    GpuDrivers,
    Plymouth,
    Kernels,
    BootRecovery,
    SecureBoot,
    Tuning,
    Snapshots,
    DevTools,
    Utilities,
    Codecs,
    Flatpaks,
    Gaming,
    Virtualization,
    Extensions,
    AppFolders,
    Theme,
    AutoUpdate,
}

impl Component {
    pub const ALL: &'static [Component] = &[
        Component::PacmanTweaks,
        Component::SystemUpgrade,
        Component::Mirrors,
        Component::ChaoticAur,
        Component::LizardByte,
        Component::AurHelper,
        Component::GpuDrivers,
        Component::Plymouth,
        Component::Kernels,
        Component::BootRecovery,
        Component::SecureBoot,
        Component::Tuning,
        Component::Snapshots,
        Component::DevTools,
        Component::Utilities,
        Component::Codecs,
        Component::Flatpaks,
        Component::Gaming,
        Component::Virtualization,
        Component::Extensions,
        Component::AppFolders,
        Component::Theme,
        Component::AutoUpdate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Component::PacmanTweaks => "pacman: colour, parallel downloads, multilib",
            Component::SystemUpgrade => "Full system upgrade",
            Component::Mirrors => "Rank mirrors with reflector",
            Component::ChaoticAur => "Chaotic-AUR repository",
            Component::LizardByte => "LizardByte repository (Sunshine)",
            Component::AurHelper => "paru AUR helper",
            Component::GpuDrivers => "Graphics drivers (auto-detected)",
            Component::Plymouth => "Plymouth boot splash",
            Component::Kernels => "Extra kernels (LTS, Zen)",
            Component::BootRecovery => "Boot failure counter and recovery menu",
            Component::SecureBoot => "Secure Boot with sbctl",
            Component::Tuning => "zswap and sysctl tuning",
            Component::Snapshots => "snapper snapshots (btrfs)",
            Component::DevTools => "Development tools",
            Component::Utilities => "Command-line and desktop utilities",
            Component::Codecs => "Multimedia codecs",
            Component::Flatpaks => "Flatpak apps from Flathub",
            Component::Gaming => "Gaming (Steam, Lutris, Wine)",
            Component::Virtualization => "Virtualization (QEMU, libvirt)",
            Component::Extensions => "GNOME extensions",
            Component::AppFolders => "GNOME app folders",
            Component::Theme => "GNOME theme, icons and fonts",
            Component::AutoUpdate => "Weekly scheduled updates",
        }
    }

    /// Preselected in the checklist and what `--yes` runs.
    pub fn default_selected(self) -> bool {
        matches!(
            self,
            Component::PacmanTweaks
                | Component::SystemUpgrade
                | Component::Mirrors
                | Component::AurHelper
                | Component::GpuDrivers
                | Component::Utilities
                | Component::Codecs
                | Component::Flatpaks
                | Component::Extensions
                | Component::AppFolders
                | Component::Theme
        )
    }

    pub fn run(self, ctx: &Context<'_>) -> Result<(), SetupError> {
        match self {
            Component::PacmanTweaks => pacman::tweak_config(ctx),
            Component::SystemUpgrade => pacman::upgrade(ctx),
            Component::Mirrors => pacman::refresh_mirrors(ctx),
            Component::ChaoticAur => pacman::add_chaotic_aur(ctx),
            Component::LizardByte => pacman::add_lizardbyte(ctx),
            Component::AurHelper => aur::ensure_helper(ctx),
            Component::GpuDrivers => gpu::install_drivers(ctx),
            Component::Plymouth => boot::plymouth::install(ctx),
            Component::Kernels => boot::kernels::install(ctx),
            Component::BootRecovery => boot::recovery::install(ctx),
            Component::SecureBoot => boot::secureboot::configure(ctx),
            Component::Tuning => tuning::apply(ctx),
            Component::Snapshots => tuning::snapshots(ctx),
            Component::DevTools => packages::install_dev_tools(ctx),
            Component::Utilities => packages::install_utilities(ctx),
            Component::Codecs => packages::install_codecs(ctx),
            Component::Flatpaks => packages::install_flatpaks(ctx),
            Component::Gaming => packages::install_gaming(ctx),
            Component::Virtualization => packages::install_virtualization(ctx),
            Component::Extensions => desktop::extensions::install(ctx),
            Component::AppFolders => desktop::folders::apply(ctx),
            Component::Theme => desktop::theme::apply(ctx),
            Component::AutoUpdate => update::schedule(ctx),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shows the checklist. Esc or an empty selection yields an empty list.
pub fn choose(ctx: &Context<'_>) -> Result<Vec<Component>, SetupError> {
    let items: Vec<String> = Component::ALL.iter().map(|c| c.label().to_string()).collect();
    let defaults: Vec<bool> = Component::ALL.iter().map(|c| c.default_selected()).collect();

    let picked = ui::choose_many(
        "What should be set up? (space toggles, enter confirms)",
        &items,
        &defaults,
        ctx.assume_yes,
    )?
    .unwrap_or_default();
    Ok(picked.into_iter().map(|i| Component::ALL[i]).collect())
}

/// Runs `selection` in order. The first failing component stops the run;
/// whatever was left is listed before the error is returned.
pub fn run_selection(ctx: &Context<'_>, selection: &[Component]) -> Result<(), SetupError> {
    let total = selection.len();
    for (i, component) in selection.iter().enumerate() {
        ui::print_step(i + 1, total, component.label());
        tracing::info!(component = ?component, "starting component");

        if let Err(e) = component.run(ctx) {
            tracing::error!(component = ?component, error = %e, "component failed");
            let skipped = &selection[i + 1..];
            if !skipped.is_empty() {
                println!();
                ui::print_warning("Not run because of the failure above:");
                for s in skipped {
                    println!("     {}", style(s.label()).dim());
                }
            }
            return Err(e);
        }
        tracing::info!(component = ?component, "component finished");
    }
    Ok(())
}
