//! systemd-boot related components.

pub mod kernel_params;
pub mod kernels;
pub mod plymouth;
pub mod recovery;
pub mod secureboot;

use std::path::PathBuf;

use crate::{error::SetupError, steps::Context};

// ── Loader entries ────────────────────────────────────────────────────────────

/// The parts of a systemd-boot entry this tool reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderEntry {
    pub title: String,
    pub linux: String,
    /// In file order; microcode images come before the initramfs.
    pub initrd: Vec<String>,
    pub options: String,
}

impl LoaderEntry {
    pub fn parse(text: &str) -> LoaderEntry {
        let mut entry = LoaderEntry {
            title: String::new(),
            linux: String::new(),
            initrd: Vec::new(),
            options: String::new(),
        };
        for line in text.lines().map(str::trim) {
            if line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim().to_string()),
                None => continue,
            };
            match key {
                "title" => entry.title = value,
                "linux" => entry.linux = value,
                "initrd" => entry.initrd.push(value),
                "options" => entry.options = value,
                _ => {}
            }
        }
        entry
    }

    /// Same entry booting `kernel` (a package name such as `linux-lts`).
    /// Microcode initrds are kept, the kernel's own initramfs is swapped.
    pub fn for_kernel(&self, kernel: &str, title: &str) -> LoaderEntry {
        let mut initrd: Vec<String> = self
            .initrd
            .iter()
            .filter(|i| !i.contains("initramfs-"))
            .cloned()
            .collect();
        initrd.push(format!("/initramfs-{kernel}.img"));

        LoaderEntry {
            title: title.to_string(),
            linux: format!("/vmlinuz-{kernel}"),
            initrd,
            options: self.options.clone(),
        }
    }

    pub fn with_extra_options(mut self, extra: &[&str]) -> LoaderEntry {
        for param in extra {
            if !self.options.split_whitespace().any(|p| p == *param) {
                if !self.options.is_empty() {
                    self.options.push(' ');
                }
                self.options.push_str(param);
            }
        }
        self
    }

    pub fn without_options(mut self, drop: &[&str]) -> LoaderEntry {
        self.options = self
            .options
            .split_whitespace()
            .filter(|p| !drop.contains(p))
            .collect::<Vec<_>>()
            .join(" ");
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("title   {}\nlinux   {}\n", self.title, self.linux);
        for initrd in &self.initrd {
            out.push_str(&format!("initrd  {}\n", initrd));
        }
        out.push_str(&format!("options {}\n", self.options));
        out
    }
}

/// `*.conf` files in the loader entries directory, sorted.
pub fn entry_files(ctx: &Context<'_>) -> Result<Vec<PathBuf>, SetupError> {
    Ok(ctx
        .shell
        .list_dir(&ctx.config.loader_entries_dir())?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "conf"))
        .collect())
}

/// The configured default entry, the template for every generated one.
pub fn default_entry(ctx: &Context<'_>) -> Result<LoaderEntry, SetupError> {
    let path = ctx
        .config
        .loader_entries_dir()
        .join(&ctx.config.boot.default_entry);
    match ctx.shell.read_file(&path)? {
        Some(text) => Ok(LoaderEntry::parse(&text)),
        None => Err(SetupError::PatternNotFound {
            path,
            what: "systemd-boot entry".to_string(),
        }),
    }
}
