use log::{debug, error, info};
use mattergpt::BotKind;

#[tokio::main]
async fn main() -> mattergpt::error::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("mattergpt=info"))
        .init();

    // reqwest and tokio-tungstenite share one rustls provider.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("TLS crypto provider already installed");
    }

    info!("Starting mattergpt chat bot");

    match mattergpt::run(BotKind::Chat).await {
        Ok(()) => {
            info!("Bot shut down successfully");
            Ok(())
        }
        Err(e) => {
            error!("Bot encountered an error: {e}");
            Err(e)
        }
    }
}
