//! Groups the application grid into folders by `.desktop` categories.

use std::collections::BTreeSet;

use crate::{
    error::SetupError,
    steps::{desktop::gsettings_set, Context},
    ui,
};

const SCHEMA: &str = "org.gnome.desktop.app-folders";
const FOLDER_SCHEMA: &str = "org.gnome.desktop.app-folders.folder";
const FOLDER_PATH: &str = "/org/gnome/desktop/app-folders/folders";

/// `(folder id, display name, category substrings)`; the first row whose
/// substring occurs in an entry's `Categories=` value takes the entry.
pub const FOLDERS: &[(&str, &str, &[&str])] = &[
    ("games", "Games", &["Game"]),
    ("office", "Office", &["Office"]),
    ("development", "Development", &["Development", "IDE"]),
    ("graphics", "Graphics", &["Graphics"]),
    ("multimedia", "Multimedia", &["AudioVideo", "Audio", "Video"]),
    ("internet", "Internet", &["Network", "WebBrowser", "Email", "Chat"]),
    ("system", "System", &["System", "Settings", "Monitor"]),
    ("utilities", "Utilities", &["Utility", "Accessories"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    /// File name, which is what GNOME uses as the application id.
    pub id: String,
    pub categories: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: &'static str,
    pub name: &'static str,
    pub apps: Vec<String>,
}

/// Reads the `[Desktop Entry]` group only; actions and other groups carry
/// their own keys that must not leak in.
pub fn parse_desktop_entry(id: &str, text: &str) -> DesktopEntry {
    let mut entry = DesktopEntry {
        id: id.to_string(),
        categories: String::new(),
        hidden: false,
    };
    let mut in_main = false;
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_main = line == "[Desktop Entry]";
            continue;
        }
        if !in_main {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "Categories" => entry.categories = value.trim().to_string(),
            "NoDisplay" | "Hidden" if value.trim() == "true" => entry.hidden = true,
            _ => {}
        }
    }
    entry
}

pub fn folder_for(categories: &str) -> Option<usize> {
    FOLDERS
        .iter()
        .position(|(_, _, needles)| needles.iter().any(|n| categories.contains(n)))
}

/// Non-empty folders in table order, apps sorted.
pub fn assign(entries: &[DesktopEntry]) -> Vec<Folder> {
    let mut buckets: Vec<BTreeSet<String>> = vec![BTreeSet::new(); FOLDERS.len()];
    for entry in entries.iter().filter(|e| !e.hidden) {
        if let Some(i) = folder_for(&entry.categories) {
            buckets[i].insert(entry.id.clone());
        }
    }
    FOLDERS
        .iter()
        .zip(buckets)
        .filter(|(_, apps)| !apps.is_empty())
        .map(|(&(id, name, _), apps)| Folder {
            id,
            name,
            apps: apps.into_iter().collect(),
        })
        .collect()
}

/// GVariant string array literal.
pub fn gvariant_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        return "@as []".to_string();
    }
    let quoted: Vec<String> = items.iter().map(|s| gvariant_string(s.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}

fn gvariant_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Every `.desktop` file across the configured application dirs. An id seen
/// in an earlier directory shadows later ones, as in XDG lookup.
pub fn scan(ctx: &Context<'_>) -> Result<Vec<DesktopEntry>, SetupError> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();

    for dir in &ctx.config.paths.application_dirs {
        for path in ctx.shell.list_dir(dir)? {
            if !path.extension().is_some_and(|e| e == "desktop") {
                continue;
            }
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(text) = ctx.shell.read_file(&path)? {
                entries.push(parse_desktop_entry(&id, &text));
            }
        }
    }
    tracing::debug!(count = entries.len(), "desktop entries scanned");
    Ok(entries)
}

pub fn apply(ctx: &Context<'_>) -> Result<(), SetupError> {
    let folders = assign(&scan(ctx)?);
    if folders.is_empty() {
        ui::print_info("No applications to sort into folders.");
        return Ok(());
    }

    let counts: Vec<(String, String)> = folders
        .iter()
        .map(|f| (f.name.to_string(), format!("{} apps", f.apps.len())))
        .collect();
    let rows: Vec<(&str, &str)> = counts.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    ui::print_kv_box("App folders", &rows);

    let ids: Vec<&str> = folders.iter().map(|f| f.id).collect();
    gsettings_set(ctx, SCHEMA, "folder-children", &gvariant_list(&ids))?;

    for folder in &folders {
        let schema = format!("{FOLDER_SCHEMA}:{FOLDER_PATH}/{}/", folder.id);
        gsettings_set(ctx, &schema, "name", &gvariant_string(folder.name))?;
        gsettings_set(ctx, &schema, "apps", &gvariant_list(&folder.apps))?;
        tracing::info!(folder = folder.id, apps = folder.apps.len(), "app folder written");
    }
    ui::print_success(&format!("{} app folders created.", folders.len()));
    Ok(())
}
