//! GNOME customisation.

pub mod extensions;
pub mod folders;
pub mod theme;

use crate::{cmd::Cmd, error::SetupError, steps::Context};

/// `gsettings set`, as the desktop user.
pub fn gsettings_set(
    ctx: &Context<'_>,
    schema: &str,
    key: &str,
    value: &str,
) -> Result<(), SetupError> {
    ctx.shell
        .run_interactive(&Cmd::new("gsettings").args(["set", schema, key, value]))
}
