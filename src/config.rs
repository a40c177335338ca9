use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SetupError;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR: &str = "archsetup";

/// Every tunable of a run. Built once in `main` and only ever borrowed.
///
/// All sections are optional in the TOML file; missing keys keep their
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: Paths,
    pub pacman: PacmanConfig,
    pub boot: BootConfig,
    pub desktop: DesktopConfig,
    pub packages: ExtraPackages,
    pub update: UpdateConfig,
}

/// Host files and directories touched by the components.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    pub pacman_conf: PathBuf,
    pub mirrorlist: PathBuf,
    pub mkinitcpio_conf: PathBuf,
    /// systemd-boot root, containing `loader.conf` and `entries/`.
    pub loader_dir: PathBuf,
    pub sysctl_dir: PathBuf,
    pub modprobe_dir: PathBuf,
    pub unit_dir: PathBuf,
    pub dri_dir: PathBuf,
    /// Root-owned state: boot counter, update lock.
    pub state_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub installed_binary: PathBuf,
    pub application_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacmanConfig {
    pub parallel_downloads: u32,
    /// Passed to reflector as `--country`; empty means worldwide.
    pub mirror_countries: Vec<String>,
    pub mirror_timeout_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootConfig {
    pub failure_threshold: u32,
    pub plymouth_theme: String,
    /// Loader entry restored as default after a successful boot.
    pub default_entry: String,
    pub normal_timeout: u32,
    pub recovery_timeout: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesktopConfig {
    pub extensions: Vec<String>,
    pub theme_packages: Vec<String>,
    pub color_scheme: String,
    pub gtk_theme: String,
    pub icon_theme: String,
    pub cursor_theme: String,
    pub font: String,
    pub button_layout: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraPackages {
    pub pacman: Vec<String>,
    pub aur: Vec<String>,
    pub flatpak: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateConfig {
    /// Day of week for the scheduled run, cron numbering (0 = Sunday).
    pub weekday: u8,
    pub hour: u8,
    /// Extra attempts, one hour apart, after the first run.
    pub retries: u8,
    /// A successful update newer than this skips the later attempts.
    pub min_interval_hours: u64,
}

/// Extra kernel installed next to the stock `linux`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    Lts,
    Zen,
}

impl KernelVariant {
    /// The pacman package name for this variant.
    pub fn package_name(self) -> &'static str {
        match self {
            KernelVariant::Lts => "linux-lts",
            KernelVariant::Zen => "linux-zen",
        }
    }

    /// Human-readable label shown to the user.
    pub fn display_name(self) -> &'static str {
        match self {
            KernelVariant::Lts => "Linux LTS (long-term support)",
            KernelVariant::Zen => "Linux Zen (performance-optimized)",
        }
    }

    pub fn headers_package(self) -> String {
        format!("{}-headers", self.package_name())
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

fn user_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

impl Default for Paths {
    fn default() -> Self {
        let state = user_state_dir();
        let mut application_dirs = Vec::new();
        if let Some(data) = dirs::data_dir() {
            application_dirs.push(data.join("applications"));
            application_dirs.push(data.join("flatpak/exports/share/applications"));
        }
        application_dirs.push("/var/lib/flatpak/exports/share/applications".into());
        application_dirs.push("/usr/share/applications".into());

        Paths {
            pacman_conf: "/etc/pacman.conf".into(),
            mirrorlist: "/etc/pacman.d/mirrorlist".into(),
            mkinitcpio_conf: "/etc/mkinitcpio.conf".into(),
            loader_dir: "/boot/loader".into(),
            sysctl_dir: "/etc/sysctl.d".into(),
            modprobe_dir: "/etc/modprobe.d".into(),
            unit_dir: "/etc/systemd/system".into(),
            dri_dir: "/dev/dri".into(),
            state_dir: "/var/lib/archsetup".into(),
            backup_dir: state.join("backups"),
            log_dir: state,
            installed_binary: "/usr/local/bin/archsetup".into(),
            application_dirs,
        }
    }
}

impl Default for PacmanConfig {
    fn default() -> Self {
        PacmanConfig {
            parallel_downloads: 10,
            mirror_countries: Vec::new(),
            mirror_timeout_secs: 60,
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            failure_threshold: 3,
            plymouth_theme: "bgrt".into(),
            default_entry: "arch.conf".into(),
            normal_timeout: 3,
            recovery_timeout: 15,
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        DesktopConfig {
            extensions: [
                "appindicatorsupport@rgcjonas.gmail.com",
                "dash-to-dock@micxgx.gmail.com",
                "blur-my-shell@aunetx",
                "caffeine@patapon.info",
                "clipboard-indicator@tudmotu.com",
                "gsconnect@andyholmes.github.io",
            ]
            .map(String::from)
            .to_vec(),
            theme_packages: ["adw-gtk-theme", "papirus-icon-theme"].map(String::from).to_vec(),
            color_scheme: "prefer-dark".into(),
            gtk_theme: "adw-gtk3-dark".into(),
            icon_theme: "Papirus-Dark".into(),
            cursor_theme: "Adwaita".into(),
            font: "Cantarell 11".into(),
            button_layout: "appmenu:minimize,maximize,close".into(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig {
            weekday: 0,
            hour: 10,
            retries: 3,
            min_interval_hours: 20,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Loads the config from `explicit` if given (the file must exist), else
    /// from `$XDG_CONFIG_HOME/archsetup/config.toml` when present, else
    /// returns the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Config, SetupError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME)) {
                Some(p) if p.exists() => p,
                _ => return Ok(Config::default()),
            },
        };

        let text = std::fs::read_to_string(&path)?;
        Config::from_toml_str(&text).map_err(|source| SetupError::Config { path, source })
    }

    pub fn from_toml_str(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn loader_entries_dir(&self) -> PathBuf {
        self.paths.loader_dir.join("entries")
    }

    pub fn loader_conf(&self) -> PathBuf {
        self.paths.loader_dir.join("loader.conf")
    }
}
