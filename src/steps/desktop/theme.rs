use crate::{
    config::DesktopConfig,
    error::SetupError,
    steps::{desktop::gsettings_set, packages, warn_and_continue, Context},
    ui,
};

const INTERFACE: &str = "org.gnome.desktop.interface";
const WM: &str = "org.gnome.desktop.wm.preferences";

/// `(schema, key, value)` triples for the configured look.
pub fn settings(cfg: &DesktopConfig) -> Vec<(&'static str, &'static str, &str)> {
    vec![
        (INTERFACE, "color-scheme", cfg.color_scheme.as_str()),
        (INTERFACE, "gtk-theme", cfg.gtk_theme.as_str()),
        (INTERFACE, "icon-theme", cfg.icon_theme.as_str()),
        (INTERFACE, "cursor-theme", cfg.cursor_theme.as_str()),
        (INTERFACE, "font-name", cfg.font.as_str()),
        (WM, "button-layout", cfg.button_layout.as_str()),
    ]
}

pub fn apply(ctx: &Context<'_>) -> Result<(), SetupError> {
    let cfg = &ctx.config.desktop;
    let pkgs: Vec<&str> = cfg.theme_packages.iter().map(String::as_str).collect();
    packages::pacman_install(ctx, &pkgs)?;

    for (schema, key, value) in settings(cfg) {
        warn_and_continue(key, gsettings_set(ctx, schema, key, value));
    }

    ui::print_kv_box(
        "Appearance",
        &[
            ("Style", cfg.color_scheme.as_str()),
            ("GTK theme", cfg.gtk_theme.as_str()),
            ("Icons", cfg.icon_theme.as_str()),
            ("Font", cfg.font.as_str()),
        ],
    );
    ui::print_success("Theme applied.");
    Ok(())
}
