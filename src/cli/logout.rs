//! Logout command implementation

use colored::Colorize;

use crate::cli::CommandContext;
use crate::error::Result;
use crate::session::SessionStore;

/// Run the logout command
pub fn run(ctx: &CommandContext) -> Result<()> {
    if ctx.session().clear()? {
        println!("{} Signed out", "✓".green());
    } else {
        println!("{} Not signed in", "○".dimmed());
    }
    Ok(())
}
