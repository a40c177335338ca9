use crate::{
    error::SetupError,
    patch::{self, PatchOutcome},
    steps::{boot, Context},
    ui,
};

/// Appends the missing `params` to the `options` line of a loader entry.
pub fn add_params(content: &str, params: &[&str]) -> PatchOutcome {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let Some(line) = lines.iter_mut().find(|l| {
        let t = l.trim_start();
        t.strip_prefix("options")
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    }) else {
        return PatchOutcome::NotFound;
    };

    let present: Vec<&str> = line.split_whitespace().skip(1).collect();
    let missing: Vec<&str> = params
        .iter()
        .copied()
        .filter(|p| !present.contains(p))
        .collect();
    if missing.is_empty() {
        return PatchOutcome::Unchanged;
    }

    let mut updated = present;
    updated.extend(missing);
    *line = format!("options {}", updated.join(" "));

    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    PatchOutcome::Changed(out)
}

/// Adds `params` to every systemd-boot entry.
pub fn add_to_all_entries(ctx: &Context<'_>, params: &[&str]) -> Result<(), SetupError> {
    let entries = boot::entry_files(ctx)?;
    if entries.is_empty() {
        tracing::warn!(dir = %ctx.config.loader_entries_dir().display(), "no loader entries");
        ui::print_warning("No systemd-boot entries found; kernel parameters not added.");
        return Ok(());
    }

    let what = format!("kernel parameters {}", params.join(" "));
    for entry in entries {
        patch::patch_file(ctx, &entry, &what, |c| add_params(c, params))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        cmd::mock::MockShell,
        steps::{
            boot::fixtures::{install_loader, read},
            testing::config_in,
        },
    };

    #[test]
    fn appends_only_missing_params() {
        let entry = "title Arch\noptions root=UUID=1 rw quiet\n";
        assert_eq!(
            add_params(entry, &["quiet", "splash"]),
            PatchOutcome::Changed("title Arch\noptions root=UUID=1 rw quiet splash\n".into())
        );
        assert_eq!(add_params(entry, &["rw", "quiet"]), PatchOutcome::Unchanged);
    }

    #[test]
    fn entry_without_options_is_not_found() {
        assert_eq!(
            add_params("title Arch\nlinux /vmlinuz-linux\n", &["quiet"]),
            PatchOutcome::NotFound
        );
        // `optionsfoo` is not an options line.
        assert_eq!(add_params("optionsfoo x\n", &["quiet"]), PatchOutcome::NotFound);
    }

    #[test]
    fn every_entry_is_patched_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        install_loader(&config);
        let fallback = config.loader_entries_dir().join("arch-fallback.conf");
        fs::write(&fallback, "title Fallback\noptions root=PARTUUID=1234 rw\n").unwrap();
        fs::write(config.loader_entries_dir().join("notes.txt"), "options x\n").unwrap();

        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);
        add_to_all_entries(&ctx, &["zswap.enabled=1"]).unwrap();
        add_to_all_entries(&ctx, &["zswap.enabled=1"]).unwrap();

        assert_eq!(shell.written().len(), 2);
        assert!(read(&fallback).ends_with("rw zswap.enabled=1\n"));
        assert_eq!(read(&config.loader_entries_dir().join("notes.txt")), "options x\n");
    }
}
