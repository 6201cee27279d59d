//! QR login command implementations

use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::login::SignInReport;
use crate::cli::{CommandContext, OutputFormat, QrCommands};
use crate::client::QrApi;
use crate::client::models::{QrCode, QrToken};
use crate::error::{Error, Result};
use crate::output::json::format_json;
use crate::output::table::{FieldRow, format_table};
use crate::output::{self, Formattable};
use crate::qr::{QrDisplay, QrLoginOutcome, QrPoller};
use crate::session::{SessionEvent, SessionStore};

const SPINNER_TICK: Duration = Duration::from_millis(120);

/// A code or token shown to the user, with its expiry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QrDisplayReport<'a> {
    kind: &'static str,
    value: &'a str,
    expires_at: DateTime<Utc>,
    #[serde(skip)]
    hint: &'static str,
}

impl<'a> QrDisplayReport<'a> {
    fn for_code(code: &'a QrCode) -> Self {
        Self {
            kind: "code",
            value: &code.code,
            expires_at: code.expires_at,
            hint: "Approve it on a signed-in device with `vigora qr approve <CODE>`",
        }
    }

    fn for_token(token: &'a QrToken) -> Self {
        Self {
            kind: "token",
            value: &token.token,
            expires_at: token.expires_at,
            hint: "Sign in on the other device with `vigora qr scan <TOKEN>`",
        }
    }
}

impl Formattable for QrDisplayReport<'_> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        let expires = self.expires_at.format("%H:%M:%S UTC").to_string();
        match format {
            OutputFormat::Json => Ok(format_json(self)?),
            OutputFormat::Table => Ok(format_table(&[
                FieldRow::new("Kind", self.kind),
                FieldRow::new(if self.kind == "code" { "Code" } else { "Token" }, self.value),
                FieldRow::new("Expires", expires),
            ])),
            OutputFormat::Pretty => Ok(format!(
                "QR {}: {}\n  {} {}\n  {}",
                self.kind,
                self.value.bold().cyan(),
                "expires at".dimmed(),
                expires,
                self.hint.dimmed()
            )),
        }
    }
}

/// Acknowledgement of an approve or reject decision
#[derive(Debug, Serialize)]
struct DecisionReport {
    code: String,
    message: String,
}

impl Formattable for DecisionReport {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(format_json(self)?),
            OutputFormat::Table => Ok(format_table(&[
                FieldRow::new("Code", &self.code),
                FieldRow::new("Result", &self.message),
            ])),
            OutputFormat::Pretty => Ok(format!("{} {}", "✓".green(), self.message)),
        }
    }
}

/// Dispatch a `vigora qr` subcommand
pub async fn run(ctx: &CommandContext, command: QrCommands) -> Result<()> {
    match command {
        QrCommands::Start => start(ctx).await,
        QrCommands::Approve { code } => {
            let message = ctx.client.qr_approve(&code).await?;
            output::print(&DecisionReport { code, message }, ctx.format)
        }
        QrCommands::Reject { code } => {
            let message = ctx.client.qr_reject(&code).await?;
            output::print(&DecisionReport { code, message }, ctx.format)
        }
        QrCommands::Generate { watch } => generate(ctx, watch).await,
        QrCommands::Scan { token } => {
            let auth = ctx.client.qr_scan_login(&token).await?;
            output::print(&SignInReport::new(&auth, "qr-token"), ctx.format)
        }
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .map_err(|e| Error::Other(format!("Invalid progress template: {}", e)))?,
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(SPINNER_TICK);
    Ok(bar)
}

/// Show a code and wait until another device approves or rejects it
async fn start(ctx: &CommandContext) -> Result<()> {
    let code = ctx.client.qr_start().await?;
    output::print(&QrDisplayReport::for_code(&code), ctx.format)?;

    let poller = QrPoller::new(ctx.client.as_ref(), code, ctx.config.qr_poll_interval());
    let cancel = poller.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling QR login");
            cancel.cancel();
        }
    });

    let progress = spinner("Waiting for approval")?;
    let outcome = poller.run().await;
    progress.finish_and_clear();
    ctrl_c.abort();

    match outcome {
        QrLoginOutcome::Approved(auth) => {
            output::print(&SignInReport::new(&auth, "qr-code"), ctx.format)
        }
        QrLoginOutcome::Rejected => Err(Error::Other(
            "QR login was rejected on the other device".to_string(),
        )),
        QrLoginOutcome::Expired => Err(Error::Other(
            "QR code expired before it was approved. Run `vigora qr start` again.".to_string(),
        )),
        QrLoginOutcome::Cancelled => {
            eprintln!("{} QR login cancelled", "○".dimmed());
            Ok(())
        }
    }
}

/// Generate a scan-login token; with `watch`, keep a valid one on screen
async fn generate(ctx: &CommandContext, watch: bool) -> Result<()> {
    let display = QrDisplay::new();
    let mut events = ctx.session().subscribe();

    let token = display.generate(ctx.client.as_ref()).await?;
    output::print(&QrDisplayReport::for_token(&token), ctx.format)?;
    if !watch {
        return Ok(());
    }

    loop {
        let Some(shown) = display.current() else {
            let token = display.generate(ctx.client.as_ref()).await?;
            output::print(&QrDisplayReport::for_token(&token), ctx.format)?;
            continue;
        };
        let until_expiry = (shown.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                display.clear();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Cleared) | Err(RecvError::Closed) => {
                    display.clear();
                    return Err(Error::Other(
                        "Signed out while showing QR tokens. Run `vigora login` to sign in again."
                            .to_string(),
                    ));
                }
                Ok(SessionEvent::Updated) | Err(RecvError::Lagged(_)) => {}
            },
            _ = tokio::time::sleep(until_expiry) => {
                debug!("QR token {} expired, generating a new one", shown.token);
            }
        }
    }
}
