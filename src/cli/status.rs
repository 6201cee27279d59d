//! Status command implementation

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::cli::{CommandContext, OutputFormat};
use crate::error::{ApiError, Result};
use crate::output::json::format_json;
use crate::output::table::{FieldRow, format_table};
use crate::output::{self, Formattable};
use crate::session::SessionStore;

/// Read the `exp` claim of a JWT access token without verifying it.
///
/// Returns [`ApiError::InvalidToken`] when the token is not a JWT with a
/// numeric `exp`.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>> {
    #[derive(Deserialize)]
    struct Claims {
        exp: i64,
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ApiError::InvalidToken.into());
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| ApiError::InvalidToken)?;
    let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| ApiError::InvalidToken)?;

    DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| ApiError::InvalidToken.into())
}

/// Snapshot of local configuration and session state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub config_file: String,
    pub api_url: String,
    pub session_file: String,
    pub signed_in: bool,
    pub user: Option<String>,
    pub role: Option<String>,
    /// `None` when signed out or the access token is opaque
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub session_updated_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn collect(ctx: &CommandContext) -> Self {
        let session = ctx.session().load();
        let user = session.as_ref().and_then(|s| s.user.as_ref());

        Self {
            config_file: ctx.config_path.display().to_string(),
            api_url: ctx.api_url.clone(),
            session_file: ctx.session().path().display().to_string(),
            signed_in: session.is_some(),
            user: user.map(|u| u.display_name()),
            role: user.and_then(|u| u.role.clone()),
            access_token_expires_at: session
                .as_ref()
                .and_then(|s| token_expiry(&s.tokens.access_token).ok()),
            session_updated_at: session.as_ref().map(|s| s.updated_at),
        }
    }

    fn expiry_text(&self, now: DateTime<Utc>) -> Option<String> {
        let expires = self.access_token_expires_at?;
        let remaining = expires.signed_duration_since(now);
        if remaining.num_seconds() <= 0 {
            Some("expired (refreshes on next request)".to_string())
        } else {
            Some(format!(
                "expires in {}h {}m",
                remaining.num_hours(),
                remaining.num_minutes() % 60
            ))
        }
    }
}

impl Formattable for StatusReport {
    fn format(&self, format: OutputFormat) -> Result<String> {
        let now = Utc::now();
        match format {
            OutputFormat::Json => Ok(format_json(self)?),
            OutputFormat::Table => {
                let mut rows = vec![
                    FieldRow::new("Config file", &self.config_file),
                    FieldRow::new("API URL", &self.api_url),
                    FieldRow::new("Session file", &self.session_file),
                    FieldRow::new("Signed in", if self.signed_in { "yes" } else { "no" }),
                ];
                if let Some(user) = &self.user {
                    rows.push(FieldRow::new("User", user));
                }
                if let Some(expiry) = self.expiry_text(now) {
                    rows.push(FieldRow::new("Access token", expiry));
                }
                Ok(format_table(&rows))
            }
            OutputFormat::Pretty => {
                let mut lines = vec![
                    format!("{}\n", "Vigora Status".bold()),
                    format!("Config file: {}", self.config_file.cyan()),
                    format!("API URL: {}", self.api_url.cyan()),
                    String::new(),
                ];

                if !self.signed_in {
                    lines.push(format!("{} Not signed in", "✗".red()));
                    lines.push(format!(
                        "  → Run '{}' or '{}' to sign in",
                        "vigora login".cyan(),
                        "vigora qr start".cyan()
                    ));
                    return Ok(lines.join("\n"));
                }

                let who = self.user.as_deref().unwrap_or("unknown user");
                match &self.role {
                    Some(role) => lines.push(format!(
                        "{} Signed in as {} ({})",
                        "✓".green(),
                        who.bold(),
                        role
                    )),
                    None => lines.push(format!("{} Signed in as {}", "✓".green(), who.bold())),
                }

                match self.expiry_text(now) {
                    Some(text) if self.access_token_expires_at.is_some_and(|e| e <= now) => {
                        lines.push(format!("{} Access token {}", "⚠".yellow(), text));
                    }
                    Some(text) => lines.push(format!("{} Access token {}", "✓".green(), text)),
                    None => lines.push(format!(
                        "{} Access token expiry unknown",
                        "○".dimmed()
                    )),
                }
                Ok(lines.join("\n"))
            }
        }
    }
}

/// Run the status command
pub fn run(ctx: &CommandContext) -> Result<()> {
    output::print(&StatusReport::collect(ctx), ctx.format)
}
