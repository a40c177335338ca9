mod backup;
mod cli;
mod cmd;
mod config;
mod error;
mod logging;
mod menu;
mod patch;
mod preflight;
mod steps;
mod ui;

use cli::{Cli, Command, CounterAction};
use cmd::SystemShell;
use config::Config;
use error::SetupError;
use steps::{boot::recovery, update, Context};

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let (cli, ignored) = Cli::parse_lenient(std::env::args_os());

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            ui::print_error(&e.to_string());
            std::process::exit(1);
        }
    };

    let guard = match logging::init(&config.paths.log_dir) {
        Ok(g) => Some(g),
        Err(e) => {
            ui::print_warning(&format!("File logging disabled: {}", e));
            None
        }
    };
    if let Some(reason) = &ignored {
        cli::warn_ignored(reason);
    }

    if let Err(e) = run(&cli, &config) {
        tracing::error!(error = %e, "archsetup failed");
        drop(guard);
        println!();
        ui::print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: &Cli, config: &Config) -> Result<(), SetupError> {
    let shell = SystemShell::new(cli.dry_run, cli.yes);
    let ctx = Context::new(config, &shell, cli.yes);

    match cli.command {
        Some(Command::BootCounter { action }) => match action {
            CounterAction::RecordBoot => recovery::on_boot(&ctx).map(drop),
            CounterAction::RecordSuccess => recovery::on_success(&ctx),
            CounterAction::Status => recovery::print_status(&ctx),
        },
        Some(Command::Update) => update::run(&ctx),
        None => match interactive(&ctx, cli.dry_run) {
            Err(SetupError::Cancelled) => {
                tracing::info!("cancelled by user");
                ui::print_info("Setup cancelled, nothing was changed.");
                Ok(())
            }
            other => other,
        },
    }
}

fn interactive(ctx: &Context<'_>, dry_run: bool) -> Result<(), SetupError> {
    // ── Welcome ───────────────────────────────────────────────────────────────
    ui::print_banner();

    if dry_run {
        ui::print_warning("DRY-RUN MODE: commands are printed, nothing is changed.");
    }
    ui::print_info("Every component can be re-run; finished steps are skipped.");
    ui::print_info(&format!(
        "Files are backed up to {} before they are edited.",
        ctx.backups.dir().display()
    ));

    // ── Checks ────────────────────────────────────────────────────────────────
    println!();
    preflight::run(ctx.shell, ctx.assume_yes)?;

    // ── Selection ─────────────────────────────────────────────────────────────
    println!();
    let selection = menu::choose(ctx)?;
    if selection.is_empty() {
        return Err(SetupError::Cancelled);
    }

    println!();
    println!("{}", ui::rule());
    for component in &selection {
        ui::print_info(&component.to_string());
    }
    println!("{}", ui::rule());
    println!();

    if !ui::confirm(
        &format!("Run {} component(s)?", selection.len()),
        true,
        ctx.assume_yes,
    )? {
        return Err(SetupError::Cancelled);
    }

    // ── Run ───────────────────────────────────────────────────────────────────
    menu::run_selection(ctx, &selection)?;

    println!();
    ui::print_success("All selected components finished.");
    ui::print_info("Reboot to pick up kernel, driver and boot changes.");
    Ok(())
}
