//! Login command implementation

use std::io::BufRead;

use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use serde::Serialize;

use crate::cli::{CommandContext, OutputFormat};
use crate::client::AuthApi;
use crate::client::models::AuthResponse;
use crate::error::{Error, Result};
use crate::output::json::format_json;
use crate::output::table::{FieldRow, format_table};
use crate::output::{self, Formattable};

/// Result of any successful sign-in (password, QR code or QR token)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInReport {
    pub user: String,
    pub role: Option<String>,
    /// How the session was obtained
    pub method: &'static str,
}

impl SignInReport {
    pub fn new(auth: &AuthResponse, method: &'static str) -> Self {
        Self {
            user: auth.user.display_name(),
            role: auth.user.role.clone(),
            method,
        }
    }
}

impl Formattable for SignInReport {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(format_json(self)?),
            OutputFormat::Table => {
                let mut rows = vec![
                    FieldRow::new("User", &self.user),
                    FieldRow::new("Method", self.method),
                ];
                if let Some(role) = &self.role {
                    rows.push(FieldRow::new("Role", role));
                }
                Ok(format_table(&rows))
            }
            OutputFormat::Pretty => {
                let mut out = format!("{} Signed in as {}", "✓".green(), self.user.bold());
                if let Some(role) = &self.role {
                    out.push_str(&format!(" ({})", role.dimmed()));
                }
                Ok(out)
            }
        }
    }
}

/// Read one line from stdin, without the trailing newline
fn read_password_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(Error::Other("No password received on stdin".to_string()));
    }
    Ok(password)
}

/// Run the login command
pub async fn run(ctx: &CommandContext, user: Option<String>, password_stdin: bool) -> Result<()> {
    let theme = ColorfulTheme::default();

    let login = match user {
        Some(user) => user,
        None => Input::with_theme(&theme)
            .with_prompt("Email or username")
            .interact_text()?,
    };

    let password = if password_stdin {
        read_password_line(std::io::stdin().lock())?
    } else {
        Password::with_theme(&theme)
            .with_prompt("Password")
            .interact()?
    };

    let auth = ctx.client.login(&login, &password).await?;
    output::print(&SignInReport::new(&auth, "password"), ctx.format)
}
