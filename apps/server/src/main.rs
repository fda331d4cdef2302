use gomoku_server::server::registry::Registry;
use gomoku_server::{run_listener, ServerConfig};

#[tokio::main]
async fn main() {
    gomoku_server::telemetry::init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let registry = Registry::new();
    if let Err(err) = run_listener(&config, registry).await {
        eprintln!("server exited with error: {err}");
        std::process::exit(1);
    }
}
