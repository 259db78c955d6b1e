// Route exports
pub mod index;
pub mod page;

pub use index::{AppState, SESSION_COOKIE};

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").configure(index::configure_api))
        .configure(index::configure);
}
