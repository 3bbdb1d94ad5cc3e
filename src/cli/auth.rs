use caspio_client::caspio::{FileTokenStore, TokenStore, build_http_client};
use caspio_client::config::Config;
use caspio_client::error::Result;
use tracing::info;

pub async fn execute(reset: bool) -> Result<()> {
    if reset {
        FileTokenStore::in_cache_dir()?.clear()?;
        info!("Cleared stored Caspio tokens");
    }

    let config = Config::load()?;
    let manager = super::token_manager(&config, build_http_client(&config.caspio)?)?;
    manager.get_token().await?;

    info!(state = ?manager.state().await, "Caspio authentication verified");

    Ok(())
}
