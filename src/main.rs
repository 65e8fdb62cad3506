#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem::{EndpointExt, Route, Server, get, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use tokio_util::sync::CancellationToken;
use tracing::info;

use ssh_relay::relay::config::{resolve_compression, resolve_listen_port, resolve_shutdown_grace};
use ssh_relay::relay::gateway::{list_sessions, server_info, terminal_socket};
use ssh_relay::relay::ops::RelayOpsTools;
use ssh_relay::relay::{InactivityReaper, RusshTransport, SessionRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let registry = Arc::new(SessionRegistry::new(Arc::new(RusshTransport::new(
        resolve_compression(None),
    ))));

    let shutdown = CancellationToken::new();
    let reaper = InactivityReaper::new(registry.clone()).spawn(shutdown.clone());

    let addr = format!("0.0.0.0:{}", resolve_listen_port(None));
    info!("Starting SSH relay on {}", addr);

    let ops_registry = registry.clone();
    let app = Route::new()
        .at("/ssh", get(terminal_socket))
        .at("/api/sessions", get(list_sessions))
        .at("/api/info", get(server_info))
        .at(
            "/mcp",
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(RelayOpsTools::new(ops_registry.clone()))
            }),
        )
        .data(registry.clone())
        .with(Tracing);

    let served = Server::new(TcpListener::bind(addr))
        .name("SSH Relay")
        .run_with_graceful_shutdown(
            app,
            async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            },
            Some(resolve_shutdown_grace(None)),
        )
        .await;

    shutdown.cancel();
    if let Err(e) = reaper.await {
        tracing::error!("Reaper task failed: {}", e);
    }
    registry.shutdown().await;
    info!("SSH relay stopped");

    served?;
    Ok(())
}
