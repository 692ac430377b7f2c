use anyhow::Context as _;

use pathgram::{
    config::Config,
    endpoint::{Endpoint, MAX_DATAGRAM},
};

use tracing::{error, info, level_filters::LevelFilter};

use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let terminal_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(if cfg!(debug_assertions) {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .boxed();

    tracing_subscriber::registry().with(terminal_layer).init();

    let config = Config::from_env();

    let endpoint = Endpoint::bind(&config.local)
        .await
        .with_context(|| format!("couldn't bind client socket at {:?}", config.local))?;

    let outcome = exchange(&endpoint, &config).await;

    // Release the local path on every exit path before reporting the outcome.
    if let Err(err) = endpoint.close().await {
        error!("{err}");
    }

    outcome
}

/// One round trip: send the configured message, wait for whatever the peer
/// sends back. The wait is unbounded: if the message or the reply is lost,
/// only process termination gets us out.
async fn exchange(endpoint: &Endpoint, config: &Config) -> anyhow::Result<()> {
    endpoint
        .send_to(&config.peer, &config.message)
        .await
        .with_context(|| format!("couldn't send datagram to {:?}", config.peer))?;

    let reply = endpoint
        .recv(MAX_DATAGRAM, None)
        .await
        .context("couldn't receive reply")?;

    info!("got reply: {}", String::from_utf8_lossy(&reply));

    Ok(())
}
