//! Idempotent edits of line-oriented config files.
//!
//! The text transforms are pure; [`patch_file`] and [`write_template`] wrap
//! them with read → backup → write against the host.

use std::path::Path;

use crate::{error::SetupError, steps::Context, ui};

/// Result of a text transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// New file content.
    Changed(String),
    /// Already in the desired state.
    Unchanged,
    /// The anchor the transform looks for is absent; nothing was changed.
    NotFound,
}

impl PatchOutcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PatchOutcome::NotFound)
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, PatchOutcome::Unchanged)
    }
}

/// `key` as the first word of `line`, followed by whitespace, `=` or nothing.
fn has_key(line: &str, key: &str) -> bool {
    line.strip_prefix(key).is_some_and(|rest| {
        rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '=')
    })
}

fn uncommented(line: &str) -> &str {
    line.trim_start().trim_start_matches('#').trim_start()
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

/// Ensures `key<sep>value` is set and active. An active line with another
/// value is rewritten; otherwise the first commented occurrence is enabled.
/// Only lines inside `section` are considered when one is given.
pub fn set_directive(
    content: &str,
    section: Option<&str>,
    key: &str,
    sep: &str,
    value: &str,
) -> PatchOutcome {
    let wanted = if value.is_empty() {
        key.to_string()
    } else {
        format!("{key}{sep}{value}")
    };

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut current: Option<String> = None;
    let mut active = None;
    let mut commented = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            current = Some(trimmed[1..trimmed.len() - 1].to_string());
            continue;
        }
        if section.is_some() && current.as_deref() != section {
            continue;
        }
        if trimmed.starts_with('#') {
            if commented.is_none() && has_key(uncommented(trimmed), key) {
                commented = Some(i);
            }
        } else if active.is_none() && has_key(trimmed, key) {
            active = Some(i);
        }
    }

    let target = match (active, commented) {
        (Some(i), _) if lines[i].trim() == wanted => return PatchOutcome::Unchanged,
        (Some(i), _) | (None, Some(i)) => i,
        (None, None) => return PatchOutcome::NotFound,
    };
    lines[target] = wanted;
    PatchOutcome::Changed(join_lines(&lines, content.ends_with('\n')))
}

/// Enables a commented-out INI section (`#[multilib]`) together with the
/// commented lines that directly follow it.
pub fn enable_section(content: &str, name: &str) -> PatchOutcome {
    let header = format!("[{name}]");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    if lines.iter().any(|l| l.trim() == header) {
        return PatchOutcome::Unchanged;
    }
    let Some(start) = lines
        .iter()
        .position(|l| l.trim().starts_with('#') && uncommented(l) == header)
    else {
        return PatchOutcome::NotFound;
    };

    lines[start] = header;
    for line in lines.iter_mut().skip(start + 1) {
        let body = uncommented(line);
        if !line.trim().starts_with('#') || body.is_empty() || body.starts_with('[') {
            break;
        }
        // Only key lines belong to the section; prose comments end it.
        if !body.contains('=') {
            break;
        }
        *line = body.to_string();
    }
    PatchOutcome::Changed(join_lines(&lines, content.ends_with('\n')))
}

/// Appends `block` unless a line equal to `marker` is already present.
pub fn append_block(content: &str, marker: &str, block: &str) -> PatchOutcome {
    if content.lines().any(|l| l.trim() == marker) {
        return PatchOutcome::Unchanged;
    }
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(block.trim_end());
    out.push('\n');
    PatchOutcome::Changed(out)
}

/// Reads `path`, applies `transform`, backs up and writes on change.
///
/// A missing file or anchor is logged as a warning and reported as
/// [`PatchOutcome::NotFound`]; it is the caller's call whether that matters.
pub fn patch_file(
    ctx: &Context<'_>,
    path: &Path,
    what: &str,
    transform: impl FnOnce(&str) -> PatchOutcome,
) -> Result<PatchOutcome, SetupError> {
    let Some(content) = ctx.shell.read_file(path)? else {
        tracing::warn!(path = %path.display(), what, "file to patch does not exist");
        ui::print_warning(&format!("{} not found, skipping: {}", path.display(), what));
        return Ok(PatchOutcome::NotFound);
    };

    let outcome = transform(&content);
    match &outcome {
        PatchOutcome::Changed(new) => {
            ctx.backups.backup_contents(path, &content)?;
            ctx.shell.write_file(path, new)?;
            tracing::info!(path = %path.display(), what, "patched");
            ui::print_success(&format!("{}: {}", path.display(), what));
        }
        PatchOutcome::Unchanged => {
            tracing::info!(path = %path.display(), what, "already configured");
            ui::print_info(&format!("{}: {} (already set)", path.display(), what));
        }
        PatchOutcome::NotFound => {
            tracing::warn!(path = %path.display(), what, "pattern not found, file left unchanged");
            ui::print_warning(&format!(
                "{}: could not apply '{}', pattern not found",
                path.display(),
                what
            ));
        }
    }
    Ok(outcome)
}

/// Writes a whole templated file, backing up a differing original.
pub fn write_template(
    ctx: &Context<'_>,
    path: &Path,
    contents: &str,
) -> Result<PatchOutcome, SetupError> {
    let existing = ctx.shell.read_file(path)?;
    if existing.as_deref() == Some(contents) {
        tracing::info!(path = %path.display(), "template already in place");
        return Ok(PatchOutcome::Unchanged);
    }
    if let Some(ref old) = existing {
        ctx.backups.backup_contents(path, old)?;
    }
    ctx.shell.write_file(path, contents)?;
    tracing::info!(path = %path.display(), "template written");
    Ok(PatchOutcome::Changed(contents.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::{mock::MockShell, SystemShell},
        config::Config,
    };

    const PACMAN_CONF: &str = "\
[options]
HoldPkg     = pacman glibc
#Color
#NoProgressBar
CheckSpace
#VerbosePkgLists
ParallelDownloads = 5

[core]
Include = /etc/pacman.d/mirrorlist

#[multilib-testing]
#Include = /etc/pacman.d/mirrorlist

#[multilib]
#Include = /etc/pacman.d/mirrorlist

# An example of a custom package repository.  See the pacman manpage for
#[custom]
";

    fn changed(outcome: PatchOutcome) -> String {
        match outcome {
            PatchOutcome::Changed(s) => s,
            other => panic!("expected a change, got {other:?}"),
        }
    }

    #[test]
    fn uncomments_a_flag_directive() {
        let out = changed(set_directive(PACMAN_CONF, Some("options"), "Color", "", ""));
        assert!(out.contains("\nColor\n"));
        assert!(out.contains("#NoProgressBar"));
        assert_eq!(
            set_directive(&out, Some("options"), "Color", "", ""),
            PatchOutcome::Unchanged
        );
    }

    #[test]
    fn rewrites_an_active_value() {
        let out = changed(set_directive(
            PACMAN_CONF,
            Some("options"),
            "ParallelDownloads",
            " = ",
            "10",
        ));
        assert!(out.contains("ParallelDownloads = 10"));
        assert!(!out.contains("ParallelDownloads = 5"));
    }

    #[test]
    fn key_match_is_whole_word() {
        let conf = "#ColorScheme = x\n";
        assert_eq!(set_directive(conf, None, "Color", "", ""), PatchOutcome::NotFound);
    }

    #[test]
    fn missing_directive_is_reported_not_invented() {
        assert_eq!(
            set_directive(PACMAN_CONF, Some("options"), "ILoveCandy", "", ""),
            PatchOutcome::NotFound
        );
    }

    #[test]
    fn loader_style_separator() {
        let loader = "default arch.conf\ntimeout 3\n#console-mode max\n";
        let out = changed(set_directive(loader, None, "timeout", " ", "15"));
        assert_eq!(out, "default arch.conf\ntimeout 15\n#console-mode max\n");
    }

    #[test]
    fn enables_multilib_but_not_multilib_testing() {
        let out = changed(enable_section(PACMAN_CONF, "multilib"));
        assert!(out.contains("\n[multilib]\nInclude = /etc/pacman.d/mirrorlist\n"));
        assert!(out.contains("#[multilib-testing]\n#Include"));
        assert_eq!(enable_section(&out, "multilib"), PatchOutcome::Unchanged);
    }

    #[test]
    fn enable_section_stops_at_prose_comments() {
        let out = changed(enable_section(PACMAN_CONF, "custom"));
        assert!(out.ends_with("[custom]\n"));
        assert!(out.contains("# An example of a custom package repository."));
    }

    #[test]
    fn append_block_is_idempotent() {
        let block = "[chaotic-aur]\nInclude = /etc/pacman.d/chaotic-mirrorlist\n";
        let once = changed(append_block(PACMAN_CONF, "[chaotic-aur]", block));
        assert!(once.ends_with("\n\n[chaotic-aur]\nInclude = /etc/pacman.d/chaotic-mirrorlist\n"));
        assert_eq!(append_block(&once, "[chaotic-aur]", block), PatchOutcome::Unchanged);
    }

    #[test]
    fn patch_file_backs_up_before_writing_and_second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.backup_dir = dir.path().join("backups");
        let path = dir.path().join("pacman.conf");
        std::fs::write(&path, PACMAN_CONF).unwrap();

        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        let first = patch_file(&ctx, &path, "enable Color", |c| {
            set_directive(c, Some("options"), "Color", "", "")
        })
        .unwrap();
        assert!(matches!(first, PatchOutcome::Changed(_)));
        let after_first = std::fs::read_to_string(&path).unwrap();

        let backup = ctx.backups.latest(&path).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), PACMAN_CONF);

        let second = patch_file(&ctx, &path, "enable Color", |c| {
            set_directive(c, Some("options"), "Color", "", "")
        })
        .unwrap();
        assert_eq!(second, PatchOutcome::Unchanged);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), after_first);
        assert_eq!(shell.written().len(), 1);
    }

    #[test]
    fn patch_file_on_missing_file_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.backup_dir = dir.path().join("backups");
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);

        let outcome =
            patch_file(&ctx, &dir.path().join("absent.conf"), "x", |_| unreachable!()).unwrap();
        assert!(outcome.is_not_found());
        assert!(shell.written().is_empty());
    }

    #[test]
    fn dry_run_edits_and_backs_up_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.backup_dir = dir.path().join("backups");
        let path = dir.path().join("pacman.conf");
        std::fs::write(&path, PACMAN_CONF).unwrap();
        let shell = SystemShell::new(true, true);
        let ctx = Context::new(&config, &shell, true);

        let outcome = patch_file(&ctx, &path, "enable Color", |c| {
            set_directive(c, Some("options"), "Color", "", "")
        })
        .unwrap();
        assert!(matches!(outcome, PatchOutcome::Changed(_)));
        write_template(&ctx, &dir.path().join("sysctl.conf"), "vm.swappiness = 10\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), PACMAN_CONF);
        assert!(!dir.path().join("sysctl.conf").exists());
        assert!(!config.paths.backup_dir.exists());
    }

    #[test]
    fn write_template_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.backup_dir = dir.path().join("backups");
        let shell = MockShell::new();
        let ctx = Context::new(&config, &shell, true);
        let path = dir.path().join("sysctl.d/99-archsetup.conf");

        assert!(matches!(
            write_template(&ctx, &path, "vm.swappiness = 10\n").unwrap(),
            PatchOutcome::Changed(_)
        ));
        assert_eq!(
            write_template(&ctx, &path, "vm.swappiness = 10\n").unwrap(),
            PatchOutcome::Unchanged
        );
        assert!(ctx.backups.latest(&path).unwrap().is_none());

        write_template(&ctx, &path, "vm.swappiness = 20\n").unwrap();
        let backup = ctx.backups.latest(&path).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "vm.swappiness = 10\n");
    }
}
