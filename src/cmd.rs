use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

use dialoguer::Confirm;

use crate::{error::SetupError, preflight, ui};

// ── Command description ───────────────────────────────────────────────────────

/// One external program invocation, built up front so it can be logged,
/// shown in dry-run mode and inspected by tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    sudo: bool,
    dir: Option<PathBuf>,
    stdin: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Cmd {
            program: program.into(),
            args: Vec::new(),
            sudo: false,
            dir: None,
            stdin: None,
        }
    }

    /// Same as [`Cmd::new`] but runs through `sudo` unless we already are root.
    pub fn sudo(program: impl Into<String>) -> Self {
        Cmd {
            sudo: true,
            ..Cmd::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Feeds `input` to the child's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    #[cfg(test)]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    #[cfg(test)]
    pub fn is_sudo(&self) -> bool {
        self.sudo
    }

    pub fn stdin_data(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    fn to_command(&self, elevated: bool) -> Command {
        let mut command = if self.sudo && !elevated {
            let mut c = Command::new("sudo");
            c.arg(&self.program);
            c
        } else {
            Command::new(&self.program)
        };
        command.args(&self.args);
        if let Some(ref dir) = self.dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sudo {
            f.write_str("sudo ")?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

// ── Execution seam ────────────────────────────────────────────────────────────

/// Everything the components need from the host. [`SystemShell`] talks to the
/// real system; tests substitute a recording double.
pub trait Shell {
    /// Runs a command that **takes over the terminal** (pacman, makepkg…).
    fn run_interactive(&self, cmd: &Cmd) -> Result<(), SetupError>;

    /// Runs a command silently behind a spinner; prints `done_msg` on success
    /// and the captured output on failure.
    fn run_with_spinner(&self, cmd: &Cmd, spin_msg: &str, done_msg: &str)
        -> Result<(), SetupError>;

    /// Runs a command and returns its stdout. Executed in dry-run mode too,
    /// so only use it for commands that do not change the system.
    fn run_capture(&self, cmd: &Cmd) -> Result<String, SetupError>;

    /// Runs a command whose failure is acceptable, discarding all output.
    fn run_best_effort(&self, cmd: &Cmd);

    /// Hardware/state probe: stdout on success, `None` when the program is
    /// missing or exits non-zero. Never offers to install anything.
    fn probe(&self, cmd: &Cmd) -> Option<String>;

    fn has_program(&self, program: &str) -> bool;

    /// Reads a host file, escalating with sudo if it is not world-readable.
    /// Returns `Ok(None)` when the file does not exist.
    fn read_file(&self, path: &Path) -> Result<Option<String>, SetupError>;

    /// Writes a host file as root, creating parent directories.
    fn write_file(&self, path: &Path, contents: &str) -> Result<(), SetupError>;

    /// Lists the entries of a host directory; a missing directory is empty.
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, SetupError>;

    /// `--dry-run`: state the program keeps itself (backups, counters,
    /// stamps) must not be written either.
    fn is_dry_run(&self) -> bool {
        false
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn not_found_or_io(program: &str, err: io::Error) -> SetupError {
    if err.kind() == io::ErrorKind::NotFound {
        SetupError::CommandNotFound(program.to_string())
    } else {
        SetupError::Io(err)
    }
}

fn exit_error(cmd: &Cmd, output_code: Option<i32>) -> SetupError {
    SetupError::CommandFailed(cmd.program().to_string(), output_code.unwrap_or(-1))
}

fn print_captured_output(stdout: &[u8], stderr: &[u8]) {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    if !out.trim().is_empty() {
        eprintln!("{}", out.trim());
    }
    if !err.trim().is_empty() {
        eprintln!("{}", err.trim());
    }
}

/// Maps a binary name to its Arch package name.
fn package_for(program: &str) -> &str {
    match program {
        "glxinfo" => "mesa-utils",
        "vulkaninfo" => "vulkan-tools",
        "lspci" => "pciutils",
        "lsmod" | "modprobe" => "kmod",
        "makepkg" => "base-devel",
        "gext" => "gnome-extensions-cli",
        "pipx" => "python-pipx",
        "crontab" => "cronie",
        "gsettings" => "glib2",
        "timeout" | "install" | "tee" | "cat" | "ls" | "mkdir" => "coreutils",
        "plymouth-set-default-theme" => "plymouth",
        "mkinitcpio" => "mkinitcpio",
        "bootctl" | "systemctl" => "systemd",
        other => other,
    }
}

/// Spawns `cmd`, feeding its stdin if any, and collects the output.
fn spawn_output(
    mut command: Command,
    cmd: &Cmd,
    stdout: Stdio,
    stderr: Stdio,
) -> Result<Output, SetupError> {
    command.stdout(stdout).stderr(stderr);
    let Some(input) = cmd.stdin_data() else {
        return command.output().map_err(|e| not_found_or_io(cmd.program(), e));
    };

    command.stdin(Stdio::piped());
    let mut child = command
        .spawn()
        .map_err(|e| not_found_or_io(cmd.program(), e))?;
    if let Some(mut pipe) = child.stdin.take() {
        pipe.write_all(input.as_bytes())?;
    }
    Ok(child.wait_with_output()?)
}

// ── Real host ─────────────────────────────────────────────────────────────────

pub struct SystemShell {
    dry_run: bool,
    assume_yes: bool,
    elevated: bool,
}

impl SystemShell {
    pub fn new(dry_run: bool, assume_yes: bool) -> Self {
        SystemShell {
            dry_run,
            assume_yes,
            elevated: preflight::is_root(),
        }
    }

    fn dry(&self, cmd: &Cmd) -> bool {
        if self.dry_run {
            ui::print_info(&format!("[dry-run] {}", cmd));
            tracing::info!(command = %cmd, "dry-run, not executed");
        }
        self.dry_run
    }

    /// When `program` is not found, asks the user if they want to install the
    /// correct package via `pacman -S`. Returns `Ok(())` if installed
    /// successfully, or `Err(CommandNotFound)` if the user declines.
    fn offer_install(&self, program: &str) -> Result<(), SetupError> {
        let pkg = package_for(program);

        ui::print_warning(&format!("Command '{}' not found.", program));
        if self.dry_run {
            return Err(SetupError::CommandNotFound(program.to_string()));
        }
        println!();

        let accepted = self.assume_yes
            || Confirm::new()
                .with_prompt(format!("Install '{}' with pacman?", pkg))
                .default(true)
                .interact()?;
        if !accepted {
            return Err(SetupError::CommandNotFound(program.to_string()));
        }

        let install = Cmd::sudo("pacman").args(["-S", "--needed", "--noconfirm", pkg]);
        tracing::info!(program, package = pkg, "installing missing program");
        let status = install
            .to_command(self.elevated)
            .status()
            .map_err(|e| not_found_or_io("pacman", e))?;
        if !status.success() {
            return Err(exit_error(&install, status.code()));
        }

        if which::which(program).is_err() {
            ui::print_error(&format!(
                "'{}' still not found after install. Check the package name.",
                program
            ));
            return Err(SetupError::CommandNotFound(program.to_string()));
        }

        Ok(())
    }

    /// Runs `attempt`, offering to install the program once if it is missing.
    fn with_install_offer<T>(
        &self,
        cmd: &Cmd,
        attempt: impl Fn() -> Result<T, SetupError>,
    ) -> Result<T, SetupError> {
        let checked = || {
            if which::which(cmd.program()).is_err() {
                return Err(SetupError::CommandNotFound(cmd.program().to_string()));
            }
            attempt()
        };

        match checked() {
            Err(SetupError::CommandNotFound(_)) => {
                self.offer_install(cmd.program())?;
                attempt()
            }
            other => other,
        }
    }
}

impl Shell for SystemShell {
    fn run_interactive(&self, cmd: &Cmd) -> Result<(), SetupError> {
        if self.dry(cmd) {
            return Ok(());
        }
        tracing::info!(command = %cmd, "running");

        self.with_install_offer(cmd, || {
            let mut command = cmd.to_command(self.elevated);
            let status = if cmd.stdin_data().is_some() {
                spawn_output(command, cmd, Stdio::inherit(), Stdio::inherit())?.status
            } else {
                command
                    .status()
                    .map_err(|e| not_found_or_io(cmd.program(), e))?
            };

            if !status.success() {
                tracing::warn!(command = %cmd, code = ?status.code(), "command failed");
                return Err(exit_error(cmd, status.code()));
            }
            Ok(())
        })
    }

    fn run_with_spinner(
        &self,
        cmd: &Cmd,
        spin_msg: &str,
        done_msg: &str,
    ) -> Result<(), SetupError> {
        if self.dry(cmd) {
            return Ok(());
        }
        tracing::info!(command = %cmd, "running");

        self.with_install_offer(cmd, || {
            let pb = ui::spinner(spin_msg);
            let result = spawn_output(
                cmd.to_command(self.elevated),
                cmd,
                Stdio::piped(),
                Stdio::piped(),
            );
            pb.finish_and_clear();

            let output = result?;
            if !output.status.success() {
                print_captured_output(&output.stdout, &output.stderr);
                tracing::warn!(
                    command = %cmd,
                    code = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "command failed"
                );
                return Err(exit_error(cmd, output.status.code()));
            }

            ui::print_success(done_msg);
            Ok(())
        })
    }

    fn run_capture(&self, cmd: &Cmd) -> Result<String, SetupError> {
        tracing::debug!(command = %cmd, "capturing");

        self.with_install_offer(cmd, || {
            let output = spawn_output(
                cmd.to_command(self.elevated),
                cmd,
                Stdio::piped(),
                Stdio::inherit(),
            )?;
            if !output.status.success() {
                return Err(exit_error(cmd, output.status.code()));
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn run_best_effort(&self, cmd: &Cmd) {
        if self.dry(cmd) {
            return;
        }
        let result = spawn_output(
            cmd.to_command(self.elevated),
            cmd,
            Stdio::null(),
            Stdio::null(),
        );
        let ok = result.is_ok_and(|o| o.status.success());
        tracing::debug!(command = %cmd, ok, "best effort");
    }

    fn probe(&self, cmd: &Cmd) -> Option<String> {
        if which::which(cmd.program()).is_err() {
            tracing::debug!(program = cmd.program(), "probe: not installed");
            return None;
        }
        let output = spawn_output(
            cmd.to_command(self.elevated),
            cmd,
            Stdio::piped(),
            Stdio::null(),
        )
        .ok()?;
        tracing::debug!(command = %cmd, ok = output.status.success(), "probe");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn has_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>, SetupError> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                let cat = Cmd::sudo("cat").arg(path.display().to_string());
                match self.run_capture(&cat) {
                    Ok(s) => Ok(Some(s)),
                    Err(SetupError::CommandFailed(..)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), SetupError> {
        let tee = Cmd::sudo("tee").arg(path.display().to_string()).stdin(contents);
        if self.dry(&tee) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            let mkdir = Cmd::sudo("mkdir").arg("-p").arg(parent.display().to_string());
            self.run_capture(&mkdir)?;
        }
        tracing::info!(path = %path.display(), bytes = contents.len(), "writing file");

        let output = spawn_output(
            tee.to_command(self.elevated),
            &tee,
            Stdio::null(),
            Stdio::piped(),
        )?;
        if !output.status.success() {
            print_captured_output(&[], &output.stderr);
            return Err(exit_error(&tee, output.status.code()));
        }
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, SetupError> {
        match fs::read_dir(dir) {
            Ok(entries) => {
                let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
                paths.sort();
                Ok(paths)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                let ls = Cmd::sudo("ls").args(["-1", "-A"]).arg(dir.display().to_string());
                let listing = self.run_capture(&ls)?;
                let mut paths: Vec<PathBuf> = listing
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| dir.join(l.trim()))
                    .collect();
                paths.sort();
                Ok(paths)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

// ── Test double ───────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod mock {
    use std::{
        cell::RefCell,
        collections::{HashMap, HashSet},
        fs, io,
        path::{Path, PathBuf},
    };

    use super::{Cmd, Shell};
    use crate::error::SetupError;

    /// Records every command and answers from canned responses keyed by
    /// program name. File operations hit the real filesystem, so tests point
    /// the config paths at a temp dir.
    #[derive(Default)]
    pub struct MockShell {
        calls: RefCell<Vec<Cmd>>,
        responses: HashMap<String, String>,
        failures: HashMap<String, i32>,
        programs: HashSet<String>,
        written: RefCell<Vec<PathBuf>>,
    }

    impl MockShell {
        pub fn new() -> Self {
            Self::default()
        }

        /// `program` exists and prints `stdout`.
        pub fn respond(mut self, program: &str, stdout: &str) -> Self {
            self.programs.insert(program.to_string());
            self.responses.insert(program.to_string(), stdout.to_string());
            self
        }

        /// `program` exists and exits with `code`.
        pub fn fail(mut self, program: &str, code: i32) -> Self {
            self.programs.insert(program.to_string());
            self.failures.insert(program.to_string(), code);
            self
        }

        pub fn with_program(mut self, program: &str) -> Self {
            self.programs.insert(program.to_string());
            self
        }

        pub fn calls(&self) -> Vec<Cmd> {
            self.calls.borrow().clone()
        }

        pub fn calls_to(&self, program: &str) -> Vec<Cmd> {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.program() == program)
                .cloned()
                .collect()
        }

        pub fn written(&self) -> Vec<PathBuf> {
            self.written.borrow().clone()
        }

        fn record(&self, cmd: &Cmd) {
            self.calls.borrow_mut().push(cmd.clone());
        }

        fn outcome(&self, cmd: &Cmd) -> Result<String, SetupError> {
            if let Some(code) = self.failures.get(cmd.program()) {
                return Err(SetupError::CommandFailed(cmd.program().to_string(), *code));
            }
            Ok(self.responses.get(cmd.program()).cloned().unwrap_or_default())
        }
    }

    impl Shell for MockShell {
        fn run_interactive(&self, cmd: &Cmd) -> Result<(), SetupError> {
            self.record(cmd);
            self.outcome(cmd).map(drop)
        }

        fn run_with_spinner(&self, cmd: &Cmd, _: &str, _: &str) -> Result<(), SetupError> {
            self.record(cmd);
            self.outcome(cmd).map(drop)
        }

        fn run_capture(&self, cmd: &Cmd) -> Result<String, SetupError> {
            self.record(cmd);
            self.outcome(cmd)
        }

        fn run_best_effort(&self, cmd: &Cmd) {
            self.record(cmd);
        }

        fn probe(&self, cmd: &Cmd) -> Option<String> {
            self.record(cmd);
            if !self.programs.contains(cmd.program()) {
                return None;
            }
            self.outcome(cmd).ok()
        }

        fn has_program(&self, program: &str) -> bool {
            self.programs.contains(program)
        }

        fn read_file(&self, path: &Path) -> Result<Option<String>, SetupError> {
            match fs::read_to_string(path) {
                Ok(s) => Ok(Some(s)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn write_file(&self, path: &Path, contents: &str) -> Result<(), SetupError> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)?;
            self.written.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, SetupError> {
            match fs::read_dir(dir) {
                Ok(entries) => {
                    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
                    paths.sort();
                    Ok(paths)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            }
        }
    }
}
