//! Command execution context
//!
//! Loads the config once and wires the session file, HTTP transport and
//! refreshing client together for the command being run.

use std::path::PathBuf;
use std::sync::Arc;

use log::debug;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::client::{HttpTransport, VigoraClient};
use crate::config::Config;
use crate::error::Result;
use crate::session::FileSessionStore;

/// The client every command talks to the API through
pub type Client = VigoraClient<HttpTransport, FileSessionStore>;

/// Context for command execution containing config, client, and runtime options.
pub struct CommandContext {
    pub config: Config,
    /// Where `config` was loaded from (it may not exist yet)
    pub config_path: PathBuf,
    /// Resolved API base URL
    pub api_url: String,
    /// Client backed by the session file next to the config file
    pub client: Arc<Client>,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Build the context from the global options.
    ///
    /// # Errors
    /// Returns error if the config file exists but cannot be parsed, or the
    /// session file is unreadable.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config_path = Config::resolve_path(opts.config_ref())?;
        let config = Config::load_from(&config_path)?;
        let api_url = config.api_url(opts.api_url_ref());

        let session = FileSessionStore::open(Config::session_path_for(&config_path))?;
        debug!("Using session file {}", session.path().display());

        let transport = HttpTransport::new(api_url.clone())?;
        let client = Arc::new(VigoraClient::new(Arc::new(transport), Arc::new(session)));

        let format = opts
            .format
            .or_else(|| {
                config
                    .preferences
                    .format
                    .as_deref()
                    .and_then(OutputFormat::from_preference)
            })
            .unwrap_or_default();

        Ok(Self {
            config,
            config_path,
            api_url,
            client,
            format,
        })
    }

    /// The session store behind the client
    pub fn session(&self) -> &FileSessionStore {
        self.client.session()
    }
}
