use tracing::error;
use tracing_subscriber::EnvFilter;

use rudis::server::RedisServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = match RedisServer::new(std::env::args()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "invalid command line arguments");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "server exited");
        std::process::exit(1);
    }
}
