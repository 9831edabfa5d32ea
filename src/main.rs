/*!
 * Echo Server - Main Entry Point
 *
 * Listens on the configured address (10.0.0.240:1234 unless overridden) and
 * replies to every message with "You've sent: <message>".
 */

use miette::IntoDiagnostic;
use tracing::{error, info};
use unisockets::{init_tracing, net, ConnectionServer, EchoResponder, ServerConfig, TransportBackend};

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    let config = ServerConfig::load()?;
    let sockets = net::global();
    info!(backend = sockets.backend().name(), "echo server starting");

    let server = ConnectionServer::bind(sockets, &config, EchoResponder)?;
    info!(address = %server.local_address(), "press Ctrl+C to exit");

    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.into_diagnostic()?;
            info!("interrupt received");
            if let Err(e) = server.stop() {
                error!(error = %e, "stopping listener failed");
            }
        }
    }

    let stats = server.stats();
    info!(
        accepted = stats.accepted,
        closed = stats.closed,
        errored = stats.errored,
        failed_accepts = stats.failed_accepts,
        "echo server stopped"
    );
    Ok(())
}
