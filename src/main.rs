use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use dicoweb::config::Settings;
use dicoweb::routes::{self, AppState};
use dicoweb::services::CacheManager;
use std::sync::Arc;
use tracing::{error, info, warn};

/// JSON error response for query string errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle query payload errors
pub fn handle_query_payload_error(
    err: error::QueryPayloadError,
    req: &actix_web::HttpRequest,
) -> actix_web::Error {
    tracing::info!("Query payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };

    dicoweb::telemetry::init(&settings.logging);

    info!("Starting dicoweb...");

    if settings.dict.servers.is_empty() {
        error!("No DICT servers configured (dict.servers or DICT_SERVERS)");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no DICT servers configured",
        ));
    }
    info!("DICT servers: {}", settings.dict.servers.join(", "));

    // The L2 cache is optional; fall back to the in-process tier
    let cache = match CacheManager::new(&settings.cache).await {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to connect to Redis ({}), using in-memory cache only", e);
            CacheManager::in_memory(settings.cache.l1_cache_size)
        }
    };
    info!(
        "Cache manager initialized (L1: {} entries, listings TTL: {}s, results TTL: {}s)",
        settings.cache.l1_cache_size, settings.cache.listing_ttl_secs, settings.cache.result_ttl_secs
    );

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    let app_state = AppState {
        settings: Arc::new(settings),
        cache: Arc::new(cache),
    };

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
