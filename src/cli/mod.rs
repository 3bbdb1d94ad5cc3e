mod auth;
mod rows;
mod show;

use caspio_client::caspio::{FileTokenStore, RestClient, TokenManager, build_http_client};
use caspio_client::config::Config;
use caspio_client::error::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

pub use rows::RowsAction;
pub use show::ShowResource;

#[derive(Parser, Debug)]
#[command(name = "caspio")]
#[command(about = "Read and modify Caspio tables and views", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Auth { reset } => auth::execute(*reset).await,
            Commands::Rows { action } => action.execute().await,
            Commands::Show { resource } => resource.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain an access token and check the backend accepts it
    Auth {
        /// Discard the stored token first
        #[arg(long)]
        reset: bool,
    },
    /// Work with table and view rows
    Rows {
        #[command(subcommand)]
        action: RowsAction,
    },
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}

fn token_manager(config: &Config, http_client: reqwest::Client) -> Result<TokenManager> {
    let store = Arc::new(FileTokenStore::in_cache_dir()?);
    TokenManager::new(&config.caspio, http_client, store)
}

fn connect(config: &Config) -> Result<RestClient> {
    let http_client = build_http_client(&config.caspio)?;
    let tokens = Arc::new(token_manager(config, http_client.clone())?);

    Ok(RestClient::new(
        &config.caspio,
        http_client,
        tokens,
        Uuid::new_v4().to_string(),
    ))
}
