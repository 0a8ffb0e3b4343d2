use evlog::meta;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::Config;
use crate::db::dbclient::DBClient;
use crate::handler::AppData;
use crate::runtime::{console_logger, get_logger, set_logger};

mod auth;
mod chain;
mod config;
mod db;
mod error;
mod forms;
mod handler;
mod runtime;
mod support;
mod views;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    set_logger(console_logger());

    let config = Config::load()?;

    let db_client = DBClient::new(&config.database_url, config.database_max_connections).await?;
    get_logger().info("Connected to database.", meta! {
        "URL" => config.database_url,
    });

    let data = AppData::new(db_client, &config)?;
    let app = handler::router(data);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;

    get_logger().info("Server running.", meta! {
        "Address" => address,
        "ChainRPC" => config.chain_rpc_url,
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    get_logger().info("Server shut down.", meta! {
        "Address" => address,
    });

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            get_logger().error("Failed to install Ctrl+C handler.", meta! {
                "Error" => e,
            });
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut v) => {
                v.recv().await;
            }
            Err(e) => {
                get_logger().error("Failed to install SIGTERM handler.", meta! {
                    "Error" => e,
                });
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    get_logger().info("Received shutdown signal.", meta! {
        "PID" => std::process::id(),
    });
}
