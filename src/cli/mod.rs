//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;

pub mod args;
pub mod completions;
pub mod context;
pub mod login;
pub mod logout;
pub mod qr;
pub mod status;

pub use args::OutputFormat;
pub use context::CommandContext;

/// Vigora CLI - sign in to the Vigora training platform from the terminal
#[derive(Parser, Debug)]
#[command(name = "vigora")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "VIGORA_FORMAT",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: Option<OutputFormat>,

    /// Override config file location
    #[arg(long, global = true, env = "VIGORA_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override the API base URL (e.g. http://localhost:5000/api)
    #[arg(long, global = true, env = "VIGORA_API_URL", hide_env = true)]
    pub api_url: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "VIGORA_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with username or email and password
    #[command(after_help = "EXAMPLES:\n  \
            vigora login                              # Prompt for everything\n  \
            vigora login --user ana                   # Prompt for the password\n  \
            echo \"$PASS\" | vigora login -u ana --password-stdin")]
    Login {
        /// Email or username
        #[arg(long, short = 'u')]
        user: Option<String>,

        /// Read the password from stdin instead of prompting
        #[arg(long, requires = "user")]
        password_stdin: bool,
    },

    /// Forget the stored session
    Logout,

    /// Show configuration and session status
    Status,

    /// Sign in or approve sign-ins with QR codes
    #[command(subcommand)]
    Qr(QrCommands),

    /// Display version information
    Version,

    /// Generate shell completions
    #[command(after_help = "\
Examples:
  bash:   vigora completion bash > /etc/bash_completion.d/vigora
  zsh:    vigora completion zsh > \"${fpath[1]}/_vigora\"
  fish:   vigora completion fish > ~/.config/fish/completions/vigora.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// QR login subcommands
#[derive(Subcommand, Debug)]
pub enum QrCommands {
    /// Show a code on this device and wait for a signed-in device to approve it
    Start,

    /// Approve a code shown on another device (requires sign-in)
    Approve {
        /// Code displayed by the device that wants to sign in
        code: String,
    },

    /// Reject a code shown on another device
    Reject {
        /// Code displayed by the device that wants to sign in
        code: String,
    },

    /// Create a single-use token another device can scan to sign in (requires sign-in)
    #[command(after_help = "EXAMPLES:\n  \
            vigora qr generate           # One token\n  \
            vigora qr generate --watch   # Keep a valid token on screen until Ctrl-C")]
    Generate {
        /// Replace the token with a fresh one whenever it expires
        #[arg(long, short = 'w')]
        watch: bool,
    },

    /// Sign in with a token generated on a signed-in device
    Scan {
        /// Token shown by the signed-in device
        token: String,
    },
}
