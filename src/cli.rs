use std::path::PathBuf;

use clap::{error::ErrorKind, ArgAction, Parser, Subcommand};

#[derive(Debug, Default, Parser)]
#[command(name = "archsetup")]
#[command(about = "Post-install setup for Arch Linux GNOME desktops")]
#[command(version, disable_version_flag = true)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Print every command instead of running it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Config file (default: ~/.config/archsetup/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Accept the default selection and answers without prompting
    #[arg(short, long)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Boot failure counter, driven by the archsetup systemd units
    BootCounter {
        #[command(subcommand)]
        action: CounterAction,
    },
    /// Upgrade the system (run by the scheduled crontab entry)
    Update,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum CounterAction {
    /// Count a boot; switches to the recovery entry at the threshold
    RecordBoot,
    /// Reset the counter after a successful boot
    RecordSuccess,
    /// Show the counter and the loader default
    Status,
}

impl Cli {
    /// `--help` and `--version` print and exit; any other unparsable
    /// invocation falls back to the interactive run. The second value is the
    /// reason the arguments were ignored, for [`warn_ignored`] once logging
    /// is up.
    pub fn parse_lenient<I, T>(args: I) -> (Cli, Option<String>)
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        match Cli::try_parse_from(args) {
            Ok(cli) => (cli, None),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => (Cli::default(), Some(e.kind().to_string())),
        }
    }
}

pub fn warn_ignored(reason: &str) {
    tracing::warn!(%reason, "unrecognised arguments, starting interactive setup");
    crate::ui::print_warning(&format!(
        "Ignoring unrecognised arguments ({}), starting the interactive setup.",
        reason
    ));
}
