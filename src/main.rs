use clap::Parser;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sliding_gate::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    sliding_gate::telemetry::init();

    let shutdown = CancellationToken::new();
    let app = sliding_gate::build_app(&args, shutdown.clone())?;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "gateway listening");
    info!(
        limit = args.rate_limit,
        window_secs = args.rate_window,
        sweep_interval_secs = args.sweep_interval,
        trust_proxy_headers = args.trust_proxy_headers,
        "rate limiting enabled"
    );
    if args.rate_limit == 0 {
        warn!("rate limit is 0, every guarded request will be rejected");
    }

    // Ctrl-C stops both the server and the limiter's sweeper
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await?;

    info!("gateway stopped");
    Ok(())
}
