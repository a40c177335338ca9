use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use time::OffsetDateTime;

use crate::{cmd::Shell, error::SetupError};

/// Timestamped copies of host files, taken before they are edited.
///
/// A copy of `/etc/pacman.conf` lands at `<dir>/pacman.conf.20261019T101502.123Z`.
/// The timestamp format sorts lexicographically, which [`BackupStore::latest`]
/// relies on. A second copy within the same millisecond gets a `-1`, `-2`, …
/// suffix; an existing copy is never replaced.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    dry_run: bool,
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:03}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}

/// Orders `<stamp>Z` and `<stamp>Z-<n>` names; `None` for anything else.
fn sort_key(stamp: &str) -> Option<(&str, u32)> {
    let (time, rest) = stamp.split_once('Z')?;
    if !time.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let n = match rest {
        "" => 0,
        _ => rest.strip_prefix('-')?.parse().ok()?,
    };
    Some((time, n))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BackupStore {
            dir: dir.into(),
            dry_run: false,
        }
    }

    /// In dry-run mode copies are logged, never written.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `path` into the store, reading it through `shell` so root-only
    /// files work. A nonexistent source is not an error and produces no copy.
    pub fn backup(&self, shell: &dyn Shell, path: &Path) -> Result<Option<PathBuf>, SetupError> {
        match shell.read_file(path)? {
            Some(contents) => self.backup_contents(path, &contents).map(Some),
            None => Ok(None),
        }
    }

    /// Stores `contents` as the backup of `path`. Callers pass what they read
    /// through the shell, since most targets are only readable with sudo.
    pub fn backup_contents(&self, path: &Path, contents: &str) -> Result<PathBuf, SetupError> {
        self.store(path, contents.as_bytes())
    }

    fn store(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, SetupError> {
        let base = format!("{}.{}", file_name(path), timestamp());
        if self.dry_run {
            let target = self.dir.join(base);
            tracing::info!(
                source = %path.display(),
                backup = %target.display(),
                "dry-run, backup not written"
            );
            return Ok(target);
        }

        fs::create_dir_all(&self.dir)?;
        let mut attempt = 0u32;
        loop {
            let target = match attempt {
                0 => self.dir.join(&base),
                n => self.dir.join(format!("{base}-{n}")),
            };
            match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    tracing::info!(
                        source = %path.display(),
                        backup = %target.display(),
                        "backed up"
                    );
                    return Ok(target);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Most recent backup of a file with the same name as `path`.
    pub fn latest(&self, path: &Path) -> Result<Option<PathBuf>, SetupError> {
        let prefix = format!("{}.", file_name(path));
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let key = sort_key(name.strip_prefix(&prefix)?)?;
                let key = (key.0.to_string(), key.1);
                Some((key, e.path()))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, path)| path))
    }
}
