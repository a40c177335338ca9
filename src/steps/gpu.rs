//! Graphics vendor detection and driver installation.
//!
//! Detection is a priority chain over live host state, first match wins:
//!
//! 1. `nvidia-smi` runs successfully
//! 2. a DRI node exists, the OpenGL renderer names AMD and `amdgpu` is loaded
//! 3. a DRI node exists, the OpenGL renderer names Intel and `i915` is loaded
//! 4. `vulkaninfo --summary` reports a known vendor
//! 5. `lspci` lists a display controller from a known vendor
//!
//! Any probe that is missing or fails counts as "no match"; the result falls
//! back to [`GpuVariant::Unknown`], which installs plain Mesa.

use std::{fmt, path::PathBuf};

use crate::{
    cmd::Cmd,
    error::SetupError,
    patch,
    steps::{boot::kernel_params, packages, Context},
    ui,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVariant {
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

pub const NVIDIA_PACKAGES: &[&str] = &[
    "nvidia-dkms",
    "nvidia-utils",
    "lib32-nvidia-utils",
    "nvidia-settings",
    "libva-nvidia-driver",
];

pub const AMD_PACKAGES: &[&str] = &[
    "mesa",
    "lib32-mesa",
    "vulkan-radeon",
    "lib32-vulkan-radeon",
    "libva-mesa-driver",
    "xf86-video-amdgpu",
];

pub const INTEL_PACKAGES: &[&str] = &[
    "mesa",
    "lib32-mesa",
    "vulkan-intel",
    "lib32-vulkan-intel",
    "intel-media-driver",
];

pub const GENERIC_PACKAGES: &[&str] = &["mesa", "lib32-mesa"];

const NVIDIA_MODPROBE: &str = "options nvidia_drm modeset=1 fbdev=1\n";
const NVIDIA_KERNEL_PARAMS: &[&str] = &["nvidia_drm.modeset=1"];

impl GpuVariant {
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            GpuVariant::Nvidia => NVIDIA_PACKAGES,
            GpuVariant::Amd => AMD_PACKAGES,
            GpuVariant::Intel => INTEL_PACKAGES,
            GpuVariant::Unknown => GENERIC_PACKAGES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GpuVariant::Nvidia => "NVIDIA",
            GpuVariant::Amd => "AMD",
            GpuVariant::Intel => "Intel",
            GpuVariant::Unknown => "Unknown",
        }
    }

    /// Matches a PCI vendor id (`0x10de`) or a vendor name in free text.
    fn from_vendor_text(text: &str) -> Option<GpuVariant> {
        let t = text.to_lowercase();
        if t.contains("0x10de") || t.contains("nvidia") {
            Some(GpuVariant::Nvidia)
        } else if t.contains("0x1002")
            || t.contains("amd")
            || t.contains("radeon")
            || t.contains("ati technologies")
        {
            Some(GpuVariant::Amd)
        } else if t.contains("0x8086") || t.contains("intel") {
            Some(GpuVariant::Intel)
        } else {
            None
        }
    }
}

impl fmt::Display for GpuVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Output parsers ────────────────────────────────────────────────────────────

fn has_dri_node(entries: &[PathBuf]) -> bool {
    entries.iter().any(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("card") || n.starts_with("renderD"))
    })
}

/// The `OpenGL renderer string:` value from `glxinfo -B`.
pub fn renderer_string(glxinfo: &str) -> Option<&str> {
    glxinfo
        .lines()
        .find_map(|l| l.trim().strip_prefix("OpenGL renderer string:"))
        .map(str::trim)
}

/// Whether `module` appears in the first column of `lsmod` output.
pub fn module_loaded(lsmod: &str, module: &str) -> bool {
    lsmod
        .lines()
        .skip(1)
        .any(|l| l.split_whitespace().next() == Some(module))
}

/// First non-software device in `vulkaninfo --summary`.
pub fn vulkan_vendor(summary: &str) -> Option<GpuVariant> {
    summary
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("vendorID") || l.starts_with("deviceName"))
        .filter(|l| !l.contains("llvmpipe") && !l.contains("0x10005"))
        .find_map(GpuVariant::from_vendor_text)
}

/// Vendor of the first display controller in `lspci` output.
pub fn pci_vendor(lspci: &str) -> GpuVariant {
    lspci
        .lines()
        .filter(|l| {
            let l = l.to_lowercase();
            l.contains("vga compatible controller")
                || l.contains("3d controller")
                || l.contains("display controller")
        })
        .find_map(|l| {
            // Skip the "00:02.0 VGA compatible controller:" prefix.
            let description = l.splitn(3, ':').nth(2).unwrap_or(l);
            GpuVariant::from_vendor_text(description)
        })
        .unwrap_or(GpuVariant::Unknown)
}

// ── Detection ─────────────────────────────────────────────────────────────────

pub fn detect(ctx: &Context<'_>) -> GpuVariant {
    let shell = ctx.shell;

    if shell.probe(&Cmd::new("nvidia-smi")).is_some() {
        tracing::info!(signal = "nvidia-smi", "detected NVIDIA GPU");
        return GpuVariant::Nvidia;
    }

    let dri = shell.list_dir(&ctx.config.paths.dri_dir).unwrap_or_default();
    if has_dri_node(&dri) {
        let renderer = shell
            .probe(&Cmd::new("glxinfo").arg("-B"))
            .and_then(|out| renderer_string(&out).map(str::to_lowercase));
        let lsmod = shell.probe(&Cmd::new("lsmod")).unwrap_or_default();

        if let Some(ref r) = renderer {
            tracing::debug!(renderer = %r, "OpenGL renderer");
            let amd = r.contains("radeon") || r.contains("amdgpu") || r.contains("amd");
            if amd && module_loaded(&lsmod, "amdgpu") {
                tracing::info!(signal = "glxinfo+lsmod", "detected AMD GPU");
                return GpuVariant::Amd;
            }
            if r.contains("intel") && module_loaded(&lsmod, "i915") {
                tracing::info!(signal = "glxinfo+lsmod", "detected Intel GPU");
                return GpuVariant::Intel;
            }
        }
    }

    if let Some(variant) = shell
        .probe(&Cmd::new("vulkaninfo").arg("--summary"))
        .and_then(|out| vulkan_vendor(&out))
    {
        tracing::info!(signal = "vulkaninfo", %variant, "detected GPU");
        return variant;
    }

    let variant = shell
        .probe(&Cmd::new("lspci"))
        .map(|out| pci_vendor(&out))
        .unwrap_or(GpuVariant::Unknown);
    tracing::info!(signal = "lspci", %variant, "GPU detection finished");
    variant
}

// ── Install ───────────────────────────────────────────────────────────────────

pub fn install_drivers(ctx: &Context<'_>) -> Result<(), SetupError> {
    let pb = ui::spinner("Detecting graphics hardware…");
    let variant = detect(ctx);
    ui::done_spinner(pb, &format!("Graphics vendor: {}", variant));

    let packages = variant.packages().join(" ");
    ui::print_kv_box("Graphics", &[("GPU", variant.name()), ("Drivers", packages.as_str())]);
    if variant == GpuVariant::Unknown {
        ui::print_warning("No known GPU vendor detected, installing generic Mesa drivers.");
    }

    packages::pacman_install(ctx, variant.packages())?;

    if variant == GpuVariant::Nvidia {
        configure_nvidia(ctx)?;
    }
    ui::print_success(&format!("{} graphics drivers installed.", variant));
    Ok(())
}

/// Kernel mode setting for the proprietary driver.
fn configure_nvidia(ctx: &Context<'_>) -> Result<(), SetupError> {
    let path = ctx.config.paths.modprobe_dir.join("nvidia.conf");
    patch::write_template(ctx, &path, NVIDIA_MODPROBE)?;
    kernel_params::add_to_all_entries(ctx, NVIDIA_KERNEL_PARAMS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;
    use crate::{
        cmd::mock::MockShell,
        steps::testing::{config_in, installed},
    };

    const LSMOD_AMD: &str = "\
Module                  Size  Used by
amdgpu              12894208  42
drm_exec               12288  1 amdgpu
";

    const LSMOD_INTEL: &str = "\
Module                  Size  Used by
i915                 4194304  31
";

    const LSPCI: &str = "\
00:00.0 Host bridge: Intel Corporation 8th Gen Core Processor Host Bridge
00:02.0 VGA compatible controller: Intel Corporation UHD Graphics 620 (rev 07)
";

    const LSPCI_NVIDIA: &str = "\
00:02.0 VGA compatible controller: Advanced Micro Devices, Inc. [AMD/ATI] Renoir
01:00.0 3D controller: NVIDIA Corporation TU117M [GeForce GTX 1650 Mobile]
";

    fn with_dri(dir: &Path) -> crate::config::Config {
        let config = config_in(dir);
        fs::create_dir_all(&config.paths.dri_dir).unwrap();
        fs::write(config.paths.dri_dir.join("card0"), "").unwrap();
        config
    }

    #[test]
    fn nvidia_smi_wins_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = with_dri(dir.path());
        let shell = MockShell::new()
            .respond("nvidia-smi", "GPU 0: NVIDIA GeForce RTX 3070")
            .respond("glxinfo", "OpenGL renderer string: AMD Radeon RX 6600")
            .respond("lsmod", LSMOD_AMD);
        let ctx = Context::new(&config, &shell, true);
        assert_eq!(detect(&ctx), GpuVariant::Nvidia);
    }

    #[test]
    fn amd_needs_renderer_and_module() {
        let dir = tempfile::tempdir().unwrap();
        let config = with_dri(dir.path());

        let shell = MockShell::new()
            .fail("nvidia-smi", 9)
            .respond("glxinfo", "OpenGL renderer string: AMD Radeon Graphics (radeonsi, renoir)")
            .respond("lsmod", LSMOD_AMD);
        assert_eq!(detect(&Context::new(&config, &shell, true)), GpuVariant::Amd);

        // Renderer matches but the module is not loaded: fall through to lspci.
        let shell = MockShell::new()
            .respond("glxinfo", "OpenGL renderer string: AMD Radeon Graphics")
            .respond("lsmod", LSMOD_INTEL)
            .respond("lspci", LSPCI);
        assert_eq!(detect(&Context::new(&config, &shell, true)), GpuVariant::Intel);
    }

    #[test]
    fn intel_via_renderer_and_i915() {
        let dir = tempfile::tempdir().unwrap();
        let config = with_dri(dir.path());
        let shell = MockShell::new()
            .respond("glxinfo", "OpenGL renderer string: Mesa Intel(R) UHD Graphics 620 (KBL GT2)")
            .respond("lsmod", LSMOD_INTEL);
        assert_eq!(detect(&Context::new(&config, &shell, true)), GpuVariant::Intel);
    }

    #[test]
    fn renderer_is_ignored_without_dri_node() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new()
            .respond("glxinfo", "OpenGL renderer string: AMD Radeon Graphics")
            .respond("lsmod", LSMOD_AMD);
        let ctx = Context::new(&config, &shell, true);
        assert_eq!(detect(&ctx), GpuVariant::Unknown);
        assert!(shell.calls_to("glxinfo").is_empty());
    }

    #[test]
    fn vulkan_summary_skips_llvmpipe() {
        let summary = "\
GPU0:
\tvendorID           = 0x10005
\tdeviceName         = llvmpipe (LLVM 17.0.6, 256 bits)
GPU1:
\tvendorID           = 0x1002
\tdeviceName         = AMD Radeon RX 7800 XT (RADV NAVI32)
";
        assert_eq!(vulkan_vendor(summary), Some(GpuVariant::Amd));
        assert_eq!(vulkan_vendor("GPU0:\n\tdeviceName = llvmpipe\n"), None);
    }

    #[test]
    fn lspci_takes_first_display_controller() {
        assert_eq!(pci_vendor(LSPCI), GpuVariant::Intel);
        assert_eq!(pci_vendor(LSPCI_NVIDIA), GpuVariant::Amd);
        assert_eq!(pci_vendor("00:1f.3 Audio device: Intel Corporation\n"), GpuVariant::Unknown);
    }

    #[test]
    fn nothing_matches_yields_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new();
        assert_eq!(detect(&Context::new(&config, &shell, true)), GpuVariant::Unknown);
    }

    #[test]
    fn parsers() {
        assert_eq!(
            renderer_string("direct rendering: Yes\nOpenGL renderer string: llvmpipe\n"),
            Some("llvmpipe")
        );
        assert!(module_loaded(LSMOD_AMD, "amdgpu"));
        assert!(!module_loaded(LSMOD_AMD, "drm"));
        assert!(!module_loaded("Module Size Used by\n", "Module"));
    }

    #[test]
    fn unknown_installs_generic_mesa_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        install_drivers(&ctx).unwrap();

        let calls = shell.calls_to("pacman");
        assert_eq!(calls.len(), 1);
        let expected = GENERIC_PACKAGES.iter().map(|s| s.to_string()).collect();
        assert_eq!(installed(&calls[0]), expected);
    }
}
