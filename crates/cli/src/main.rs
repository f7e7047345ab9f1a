//! Loners CLI
//!
//! Terminal front end for the Loners API: sign in, browse nearby events,
//! chat in event rooms and follow unread badges over the push channel.

mod cli;
mod cmd_account;
mod cmd_chat;
mod cmd_events;
mod logging;
mod output;

use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use console::style;
use loners_client::{ApiClient, ApiError, ClientConfig, ConfigOverrides, LocalStore, SessionStore};
use tracing::info;

use crate::cli::{Cli, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a command needs, built once per invocation
pub struct App {
    pub config: ClientConfig,
    pub session: Arc<SessionStore>,
    pub api: ApiClient,
}

impl App {
    fn open(config: ClientConfig) -> anyhow::Result<Self> {
        let storage_path = config.storage_path();
        let storage = LocalStore::open(&storage_path)
            .with_context(|| format!("opening {}", storage_path.display()))?;
        let session = Arc::new(SessionStore::restore(Arc::new(storage)));
        let api = ApiClient::new(&config, session.clone())?;
        Ok(Self {
            config,
            session,
            api,
        })
    }

    pub fn require_login(&self) -> anyhow::Result<()> {
        if !self.session.current().is_authenticated() {
            anyhow::bail!("not logged in; run `loners login --email <EMAIL>` first");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let message = match err.downcast_ref::<ApiError>() {
            Some(api) => api.user_message(),
            None => format!("{err:#}"),
        };
        eprintln!("{} {message}", style("error:").red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "loners", &mut std::io::stdout());
        return Ok(());
    }

    let config = ClientConfig::load(ConfigOverrides {
        api_url: cli.api_url,
        socket_url: cli.socket_url,
        data_dir: cli.data_dir,
    })?;
    let log_handle = logging::init_logging(&config.log_dir())?;
    info!(
        component = "cli",
        event = "cli.started",
        run_id = %log_handle.run_id,
        version = VERSION,
        api_url = %config.api_url,
        data_dir = %config.data_dir.display(),
    );
    let app = App::open(config)?;

    match cli.command {
        Command::Login(args) => cmd_account::login(&app, args).await,
        Command::Signup(args) => cmd_account::signup(&app, args).await,
        Command::Google { credential } => cmd_account::google(&app, &credential).await,
        Command::Logout => cmd_account::logout(&app),
        Command::Whoami => cmd_account::whoami(&app),
        Command::VerifyEmail { token } => cmd_account::verify_email(&app, &token).await,
        Command::ResendVerification { email } => {
            cmd_account::resend_verification(&app, &email).await
        }
        Command::Unread => cmd_chat::unread(&app).await,
        Command::MarkRead { room } => cmd_chat::mark_read(&app, &room).await,
        Command::Rooms => cmd_chat::rooms(&app).await,
        Command::Chat(args) => cmd_chat::chat(&app, args).await,
        Command::Watch => cmd_chat::watch(&app).await,
        Command::Events(command) => cmd_events::events(&app, command).await,
        Command::Locations(command) => cmd_events::locations(&app, command).await,
        Command::Profile(command) => cmd_account::profile(&app, command).await,
        Command::Consent(command) => cmd_account::consent(&app, command),
        Command::Completions { .. } => Ok(()),
    }
}
