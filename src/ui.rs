use console::{style, Term};
use dialoguer::{Confirm, MultiSelect};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::error::SetupError;

// ── Terminal helpers ──────────────────────────────────────────────────────────

fn term_width() -> usize {
    Term::stdout().size().1.max(60) as usize
}

pub fn rule() -> String {
    style("─".repeat(term_width().min(52))).dim().to_string()
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let _ = Term::stdout().clear_screen();

    let logo = [
        r"    _             _              _               ",
        r"   / \   _ __ ___| |__  ___  ___| |_ _   _ _ __  ",
        r"  / _ \ | '__/ __| '_ \/ __|/ _ \ __| | | | '_ \ ",
        r" / ___ \| | | (__| | | \__ \  __/ |_| |_| | |_) |",
        r"/_/   \_\_|  \___|_| |_|___/\___|\__|\__,_| .__/ ",
        r"                                          |_|    ",
    ];

    println!();
    for line in &logo {
        println!("{}", style(line).cyan().bold());
    }
    println!();
    println!(
        "{}",
        style(format!(
            "   Arch Linux post-install  ·  GNOME Edition  ·  v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
        .italic()
    );
    println!();
    println!("{}", rule());
    println!();
}

// ── Step header ───────────────────────────────────────────────────────────────

/// Prints a visually distinct numbered step header.
pub fn print_step(step: usize, total: usize, title: &str) {
    println!();
    let tag = style(format!(" {}/{} ", step, total)).black().on_cyan().bold();
    let heading = style(format!("  {}", title)).white().bold();
    println!("{}{}", tag, heading);
    println!("{}", rule());
}

// ── Feedback messages ─────────────────────────────────────────────────────────

/// Green ✓: operation completed successfully.
pub fn print_success(msg: &str) {
    println!("  {}  {}", style("✓").green().bold(), style(msg).green());
}

/// Blue →: neutral info / progress note.
pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

/// Yellow ⚠: non-fatal notice.
pub fn print_warning(msg: &str) {
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Red ✗: error (written to stderr).
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

// ── Info box ──────────────────────────────────────────────────────────────────

/// Renders a bordered key→value box in the terminal.
///
/// ```text
/// ┌─ Detected hardware ───────────────┐
/// │  GPU          NVIDIA              │
/// │  Driver       nvidia-dkms …       │
/// └───────────────────────────────────┘
/// ```
pub fn print_kv_box(title: &str, rows: &[(&str, &str)]) {
    const BOX_INNER: usize = 38;

    let dashes = "─".repeat(BOX_INNER.saturating_sub(title.chars().count() + 2));
    println!(
        "  ┌─ {} {}┐",
        style(title).white().bold(),
        style(&dashes).dim()
    );

    for (key, val) in rows {
        println!(
            "  │  {:<13}{}",
            style(*key).dim(),
            style(*val).white().bold()
        );
    }

    println!("  └{}┘", style("─".repeat(BOX_INNER + 2)).dim());
}

// ── Prompts ───────────────────────────────────────────────────────────────────
//
// Every prompt takes `assume_yes`: with `--yes` the default answer is used
// and nothing is read from the terminal.

/// Yes/no question.
pub fn confirm(prompt: &str, default: bool, assume_yes: bool) -> Result<bool, SetupError> {
    if assume_yes {
        return Ok(default);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Checklist. `None` when the user pressed Esc/q.
pub fn choose_many(
    prompt: &str,
    items: &[String],
    defaults: &[bool],
    assume_yes: bool,
) -> Result<Option<Vec<usize>>, SetupError> {
    if assume_yes {
        let picked = defaults
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i)
            .collect();
        return Ok(Some(picked));
    }
    Ok(MultiSelect::new()
        .with_prompt(prompt)
        .items(items)
        .defaults(defaults)
        .interact_opt()?)
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Returns a running braille spinner.
/// Call `pb.finish_and_clear()` (or the `done_spinner` helper) when done.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}") {
        pb.set_style(
            template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Clears the spinner and prints a success message in its place.
pub fn done_spinner(pb: ProgressBar, msg: &str) {
    pb.finish_and_clear();
    print_success(msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assume_yes_returns_defaults_without_a_terminal() {
        assert!(confirm("go?", true, true).unwrap());
        assert!(!confirm("go?", false, true).unwrap());

        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            choose_many("pick", &items, &[false, true], true).unwrap(),
            Some(vec![1])
        );
    }
}
