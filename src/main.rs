//! Vigora CLI - terminal companion for the Vigora training platform

use clap::Parser;

mod cli;
mod client;
mod config;
mod error;
mod output;
mod qr;
mod session;

use cli::args::GlobalOptions;
use cli::{Cli, CommandContext, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `--debug` forces debug output; otherwise `RUST_LOG` applies, defaulting to warnings
fn init_logging(debug: bool) {
    let mut builder = if debug {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(log::LevelFilter::Debug);
        builder
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    };
    builder.format_timestamp(None).init();
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Version => {
            println!("vigora version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Completion { shell } => {
            cli::completions::run(shell);
            Ok(())
        }
        Commands::Login {
            user,
            password_stdin,
        } => cli::login::run(&CommandContext::new(&opts)?, user, password_stdin).await,
        Commands::Logout => cli::logout::run(&CommandContext::new(&opts)?),
        Commands::Status => cli::status::run(&CommandContext::new(&opts)?),
        Commands::Qr(command) => cli::qr::run(&CommandContext::new(&opts)?, command).await,
    }
}
