use crate::config::Settings;
use crate::core::{render_definitions, HtmlOptions};
use crate::models::{
    DatabaseEntry, ErrorResponse, HealthResponse, IndexQuery, LookupKind, LookupRecord,
    LookupRequest, LookupResponse, LookupResult, MatchResult,
};
use crate::routes::page::{opensearch_xml, IndexPage, Selects};
use crate::services::lookup::{self, LookupParams, DBINFO};
use crate::services::{accept_languages, CacheKey, CacheManager};
use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Cookie identifying a browser session
pub const SESSION_COOKIE: &str = "dicoweb_sid";

/// Internal links in rendered definitions are relative searches
const LINK_BASE: &str = "?q=";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<CacheManager>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/opensearch.xml", web::get().to(opensearch));
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/lookup", web::get().to(lookup_json));
}

/// Pick the server for this request: explicit choice, then the session's, then the first
fn choose_server<'a>(
    settings: &'a Settings,
    requested: Option<&str>,
    remembered: Option<&str>,
) -> Option<&'a str> {
    let servers = &settings.dict.servers;
    requested
        .or(remembered)
        .and_then(|wanted| servers.iter().find(|s| *s == wanted))
        .or_else(|| servers.first())
        .map(|s| s.as_str())
}

fn session_ttl(settings: &Settings) -> Duration {
    Duration::from_secs(settings.cache.listing_ttl_secs)
}

fn html_response(body: String, cookie: Option<Cookie<'static>>) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response.content_type("text/html; charset=utf-8");
    if let Some(cookie) = cookie {
        response.cookie(cookie);
    }
    response.body(body)
}

/// Index page
///
/// GET /?q=word&db=*&strategy=.&server=host[&define]
async fn index(
    state: web::Data<AppState>,
    query: web::Query<IndexQuery>,
    req: HttpRequest,
) -> impl Responder {
    let settings = state.settings.as_ref();
    let cache = state.cache.as_ref();

    if let Err(errors) = query.validate() {
        tracing::info!("Validation failed for index request: {}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let (cookie_value, new_cookie) = match req.cookie(SESSION_COOKIE) {
        Some(c) if !c.value().is_empty() => (c.value().to_string(), None),
        _ => {
            let value = uuid::Uuid::new_v4().simple().to_string();
            let cookie = Cookie::build(SESSION_COOKIE, value.clone())
                .path("/")
                .http_only(true)
                .finish();
            (value, Some(cookie))
        }
    };

    let languages = req
        .headers()
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(accept_languages)
        .unwrap_or_default();

    let session_key = CacheKey::session_server(&cookie_value);
    let remembered = cache.get_opt::<String>(&session_key).await;
    let Some(server) = choose_server(settings, query.server.as_deref(), remembered.as_deref())
    else {
        tracing::error!("No DICT servers configured");
        return HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "No DICT servers configured".to_string(),
            message: "dict.servers is empty".to_string(),
            status_code: 503,
        });
    };
    if remembered.as_deref() != Some(server) {
        if let Err(e) = cache.set(&session_key, &server, session_ttl(settings)).await {
            tracing::warn!("Failed to remember server for session: {}", e);
        }
    }

    let mut selects = Selects::default();
    if settings.dict.servers.len() > 1 {
        selects.sv = Some(HtmlOptions::from_values(settings.dict.servers.iter().cloned(), server));
    }

    let sid = CacheKey::session_id(&cookie_value, server);
    let kind = if query.define.is_some() {
        LookupKind::Define
    } else {
        LookupKind::Search
    };
    let db = query.db.as_deref().unwrap_or("*");
    let strategy = query.strategy.as_deref().unwrap_or(".");

    let listings = match lookup::listings(settings, cache, server).await {
        Ok(listings) => listings,
        Err(e) => {
            tracing::warn!("Failed to list databases of {}: {}", server, e);
            let page = IndexPage::fallback(&settings.site, selects);
            return html_response(page.render(), new_cookie);
        }
    };

    let mut databases = vec![
        DatabaseEntry::new("*", "All"),
        DatabaseEntry::new("!", "First match"),
    ];
    databases.extend(listings.databases);
    let strategies = std::iter::once((".".to_string(), "Default".to_string()))
        .chain(listings.strategies.into_iter().map(|s| (s.name, s.descr)));

    selects.db = Some(HtmlOptions::new(
        databases.iter().map(|d| (d.name.clone(), d.descr.clone())),
        db,
    ));
    selects.st = Some(HtmlOptions::new(strategies, strategy));

    let mut q = query.q.clone().unwrap_or_default();
    let mut title = None;
    let mut robots = "index";
    let mut record: Option<LookupRecord> = None;
    let mut mtc: Option<MatchResult> = None;

    if !q.is_empty() {
        let params = LookupParams {
            server,
            kind,
            db,
            strategy,
            query: &q,
            languages: &languages,
        };
        let outcome = match lookup::lookup(settings, cache, &params).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Lookup of {:?} on {} failed: {}", q, server, e);
                let page = IndexPage::fallback(&settings.site, selects);
                return html_response(page.render(), new_cookie);
            }
        };

        mtc = last_match(settings, cache, &sid, kind, &outcome.key).await;
        if mtc.is_none() {
            if let LookupResult::Match(m) = &outcome.record.result {
                mtc = Some(m.clone());
            }
        }
        if let Some(mtc) = mtc.as_mut() {
            for group in &mut mtc.matches {
                group.db_fullname = databases
                    .iter()
                    .find(|d| d.name == group.db)
                    .map(|d| d.descr.clone());
            }
        }

        record = Some(outcome.record);
        if db == DBINFO {
            q.clear();
        }
        if !q.is_empty() {
            title = Some(format!("{} - ", q));
            robots = "noindex,nofollow";
        }
    }

    let markup_style = record
        .as_ref()
        .map(|r| r.markup_style.clone())
        .unwrap_or_else(|| lookup::DEFAULT_MARKUP_STYLE.to_string());
    let result = record.map(|r| {
        render_definitions(r.result, &settings.onerror.unsupported_content_type, LINK_BASE)
    });

    let page = IndexPage {
        site: &settings.site,
        title,
        robots,
        q: &q,
        selects,
        result: result.as_ref(),
        mtc: mtc.as_ref(),
        markup_style: &markup_style,
    };
    html_response(page.render(), new_cookie)
}

/// Remember the key of a search for this session, or fetch the last one
async fn last_match(
    settings: &Settings,
    cache: &CacheManager,
    sid: &str,
    kind: LookupKind,
    key: &str,
) -> Option<MatchResult> {
    let last_key = CacheKey::last_match(sid);
    let key = match kind {
        LookupKind::Search => {
            let ttl = Duration::from_secs(settings.cache.result_ttl_secs);
            if let Err(e) = cache.set(&last_key, &key, ttl).await {
                tracing::warn!("Failed to remember last match: {}", e);
            }
            key.to_string()
        }
        LookupKind::Define => cache.get_opt::<String>(&last_key).await?,
    };

    match cache.get_opt::<LookupRecord>(&key).await?.result {
        LookupResult::Match(m) => Some(m),
        _ => None,
    }
}

/// OpenSearch descriptor
///
/// GET /opensearch.xml
async fn opensearch(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let info = req.connection_info();
    let base = format!("{}://{}", info.scheme(), info.host());
    let media = &state.settings.site.media_url;
    let url_media = if media.contains("://") {
        media.clone()
    } else {
        format!("{}{}", base, media)
    };
    let url_query = format!("{}/", base);

    HttpResponse::Ok()
        .content_type("application/xml")
        .body(opensearch_xml(&state.settings.site, &url_query, &url_media))
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let stats = state.cache.stats();
    tracing::debug!("Cache: {} L1 entries, L2 enabled: {}", stats.l1_size, stats.l2_enabled);

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// JSON lookup endpoint
///
/// GET /api/v1/lookup?q=word&db=*&strategy=.&server=host&define=true
async fn lookup_json(
    state: web::Data<AppState>,
    query: web::Query<LookupRequest>,
    req: HttpRequest,
) -> impl Responder {
    let settings = state.settings.as_ref();

    if let Err(errors) = query.validate() {
        tracing::info!("Validation failed for lookup request: {}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let server = match query.server.as_deref() {
        Some(wanted) => settings.dict.servers.iter().find(|s| *s == wanted),
        None => settings.dict.servers.first(),
    };
    let Some(server) = server else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Unknown server".to_string(),
            message: format!("{:?} is not a configured DICT server", query.server),
            status_code: 400,
        });
    };

    let languages = req
        .headers()
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(accept_languages)
        .unwrap_or_default();
    let kind = if query.define {
        LookupKind::Define
    } else {
        LookupKind::Search
    };
    let params = LookupParams {
        server,
        kind,
        db: &query.db,
        strategy: &query.strategy,
        query: &query.q,
        languages: &languages,
    };

    match lookup::lookup(settings, &state.cache, &params).await {
        Ok(outcome) => HttpResponse::Ok().json(LookupResponse {
            server: server.clone(),
            query: query.q.clone(),
            markup_style: outcome.record.markup_style,
            cached: outcome.cached,
            result: render_definitions(
                outcome.record.result,
                &settings.onerror.unsupported_content_type,
                LINK_BASE,
            ),
        }),
        Err(e) => {
            tracing::error!("Lookup of {:?} on {} failed: {}", query.q, server, e);
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "DICT server unavailable".to_string(),
                message: e.to_string(),
                status_code: 502,
            })
        }
    }
}
