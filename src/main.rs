use std::sync::Arc;

use cloud_ops_mcp::{build_server, config::Config, domain::tools::CatalogProvider, logging};
use tokio::{signal, sync::watch};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let served = runtime.block_on(async move {
        let provider = Arc::new(CatalogProvider::new(config.services.as_deref()));
        let server = build_server(config, provider);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_tx.send_replace(true);
        });

        server
            .run(tokio::io::stdin(), tokio::io::stdout(), shutdown_rx)
            .await
    });

    // stdin is read on a blocking thread and timed-out handlers may still be running;
    // neither may keep the process alive
    runtime.shutdown_background();
    served?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received terminate signal, shutting down");
        },
    }
}
