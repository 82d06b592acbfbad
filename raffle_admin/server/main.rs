use log::{info, warn};
use raffle_admin_logic::config::AdminConfig;
use raffle_admin_logic::metadata::MetaBackend;
use raffle_admin_server::{router, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = AdminConfig::from_env()?;
    let listen_addr = config.listen_addr.clone();
    let state = AppState::from_config(config);

    if let Some(MetaBackend::Postgres(store)) = &state.meta_store {
        if let Err(e) = store.ensure_schema().await {
            warn!("raffle_meta table not checked: {e}");
        }
    }

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("raffle admin listening on {listen_addr}");
    axum::serve(listener, router(Arc::new(state))).await?;
    Ok(())
}
