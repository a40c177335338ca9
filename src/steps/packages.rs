use console::style;

use crate::{
    cmd::Cmd,
    error::SetupError,
    steps::{aur, pacman, warn_and_continue, Context},
    ui,
};

// ── Package sets ──────────────────────────────────────────────────────────────

pub const DEV_TOOLS: &[&str] = &[
    "base-devel",
    "git",
    "rustup",
    "go",
    "nodejs",
    "npm",
    "python",
    "python-pip",
    "cmake",
    "ninja",
    "gdb",
    "jq",
    "neovim",
    "docker",
    "docker-compose",
];

pub const DEV_TOOLS_AUR: &[&str] = &["visual-studio-code-bin"];

pub const UTILITIES: &[&str] = &[
    "htop",
    "btop",
    "fastfetch",
    "ripgrep",
    "fd",
    "bat",
    "eza",
    "fzf",
    "unzip",
    "p7zip",
    "wget",
    "rsync",
    "tldr",
    "man-db",
    "gnome-tweaks",
    "bluez-utils",
];

pub const CODECS: &[&str] = &[
    "ffmpeg",
    "gst-libav",
    "gst-plugins-good",
    "gst-plugins-bad",
    "gst-plugins-ugly",
    "gstreamer-vaapi",
    "x264",
    "x265",
    "libdvdcss",
];

pub const GAMING: &[&str] = &[
    "steam",
    "lutris",
    "wine-staging",
    "winetricks",
    "gamemode",
    "lib32-gamemode",
    "mangohud",
    "lib32-mangohud",
    "gamescope",
];

pub const GAMING_AUR: &[&str] = &["protonup-qt"];

pub const VIRTUALIZATION: &[&str] = &[
    "qemu-full",
    "libvirt",
    "virt-manager",
    "dnsmasq",
    "edk2-ovmf",
    "swtpm",
];

pub const FLATPAK_APPS: &[&str] = &[
    "com.github.tchx84.Flatseal",
    "com.mattjakeman.ExtensionManager",
    "org.videolan.VLC",
    "com.obsproject.Studio",
    "com.spotify.Client",
    "com.discordapp.Discord",
];

const FLATHUB_URL: &str = "https://dl.flathub.org/repo/flathub.flatpakrepo";

// ── Installers ────────────────────────────────────────────────────────────────

/// `sudo pacman -S --needed --noconfirm <pkgs>`. pacman streams download
/// progress, so the terminal is handed over.
pub fn pacman_install(ctx: &Context<'_>, pkgs: &[&str]) -> Result<(), SetupError> {
    if pkgs.is_empty() {
        return Ok(());
    }
    ui::print_info(&format!(
        "Installing {} package(s) with pacman…",
        style(pkgs.len()).cyan().bold()
    ));
    ctx.shell.run_interactive(
        &Cmd::sudo("pacman")
            .args(["-S", "--needed", "--noconfirm"])
            .args(pkgs.iter().copied()),
    )
}

/// `paru -S --needed --noconfirm <pkgs>`, bootstrapping paru first.
pub fn aur_install(ctx: &Context<'_>, pkgs: &[&str]) -> Result<(), SetupError> {
    if pkgs.is_empty() {
        return Ok(());
    }
    aur::ensure_helper(ctx)?;
    ui::print_info(&format!(
        "Installing {} package(s) with paru…",
        style(pkgs.len()).cyan().bold()
    ));
    ctx.shell.run_interactive(
        &Cmd::new(aur::HELPER)
            .args(["-S", "--needed", "--noconfirm"])
            .args(pkgs.iter().copied()),
    )
}

/// Installs Flatpak apps from Flathub, adding the remote when missing.
pub fn flatpak_install(ctx: &Context<'_>, apps: &[&str]) -> Result<(), SetupError> {
    if apps.is_empty() {
        return Ok(());
    }
    ensure_flathub(ctx)?;
    ctx.shell.run_interactive(
        &Cmd::new("flatpak")
            .args(["install", "-y", "--noninteractive", "flathub"])
            .args(apps.iter().copied()),
    )
}

fn ensure_flathub(ctx: &Context<'_>) -> Result<(), SetupError> {
    if !ctx.shell.has_program("flatpak") {
        pacman_install(ctx, &["flatpak"])?;
    }
    ctx.shell.run_with_spinner(
        &Cmd::sudo("flatpak").args([
            "remote-add",
            "--if-not-exists",
            "flathub",
            FLATHUB_URL,
        ]),
        "Adding the Flathub remote…",
        "Flathub remote configured.",
    )
}

/// `systemctl enable --now <unit>`.
pub fn enable_service(ctx: &Context<'_>, unit: &str) -> Result<(), SetupError> {
    ctx.shell.run_with_spinner(
        &Cmd::sudo("systemctl").args(["enable", "--now", unit]),
        &format!("Enabling {}…", unit),
        &format!("{} enabled.", unit),
    )
}

/// Adds the invoking user to `group`.
pub fn add_user_to_group(ctx: &Context<'_>, group: &str) -> Result<(), SetupError> {
    let user = match std::env::var("USER") {
        Ok(u) if !u.is_empty() => u,
        _ => ctx.shell.run_capture(&Cmd::new("id").arg("-un"))?.trim().to_string(),
    };
    ctx.shell.run_with_spinner(
        &Cmd::sudo("usermod").args(["-aG", group, &user]),
        &format!("Adding {} to the {} group…", user, group),
        &format!("{} added to {} (effective after re-login).", user, group),
    )
}

fn owned(extra: &[String]) -> Vec<&str> {
    extra.iter().map(String::as_str).collect()
}

// ── Components ────────────────────────────────────────────────────────────────

pub fn install_dev_tools(ctx: &Context<'_>) -> Result<(), SetupError> {
    pacman_install(ctx, DEV_TOOLS)?;
    warn_and_continue("Development AUR packages", aur_install(ctx, DEV_TOOLS_AUR));
    warn_and_continue("Docker service", enable_service(ctx, "docker.service"));
    warn_and_continue("docker group", add_user_to_group(ctx, "docker"));
    Ok(())
}

pub fn install_utilities(ctx: &Context<'_>) -> Result<(), SetupError> {
    pacman_install(ctx, UTILITIES)?;

    let extra = &ctx.config.packages;
    pacman_install(ctx, &owned(&extra.pacman))?;
    warn_and_continue("Extra AUR packages", aur_install(ctx, &owned(&extra.aur)));
    Ok(())
}

pub fn install_codecs(ctx: &Context<'_>) -> Result<(), SetupError> {
    pacman_install(ctx, CODECS)
}

pub fn install_flatpaks(ctx: &Context<'_>) -> Result<(), SetupError> {
    flatpak_install(ctx, FLATPAK_APPS)?;
    warn_and_continue(
        "Extra Flatpak apps",
        flatpak_install(ctx, &owned(&ctx.config.packages.flatpak)),
    );
    Ok(())
}

/// Steam and friends need 32-bit libraries, so multilib is enabled first.
pub fn install_gaming(ctx: &Context<'_>) -> Result<(), SetupError> {
    pacman::enable_multilib(ctx)?;
    pacman::sync(ctx)?;
    pacman_install(ctx, GAMING)?;
    warn_and_continue("Gaming AUR packages", aur_install(ctx, GAMING_AUR));
    Ok(())
}

pub fn install_virtualization(ctx: &Context<'_>) -> Result<(), SetupError> {
    pacman_install(ctx, VIRTUALIZATION)?;
    enable_service(ctx, "libvirtd.service")?;
    warn_and_continue("libvirt group", add_user_to_group(ctx, "libvirt"));
    Ok(())
}
