use dicoweb::config::Settings;
use dicoweb::server::DictServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };

    dicoweb::telemetry::init(&settings.logging);

    info!("Starting dicod...");

    let server = match DictServer::bind(&settings.dictd).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start dicod: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down dicod");
    };

    if let Err(e) = server.run_until(shutdown).await {
        error!("dicod stopped: {}", e);
        return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
    }

    Ok(())
}
