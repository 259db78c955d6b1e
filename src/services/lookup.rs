//! Lookups on behalf of the web front-end, memoized in the cache.

use crate::config::Settings;
use crate::models::{DatabaseEntry, LookupKind, LookupRecord, StrategyEntry};
use crate::services::cache::{CacheKey, CacheManager};
use crate::services::dict_client::{split_server, DictClient, DictError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pseudo-database that asks for information about the database named by the query
pub const DBINFO: &str = "dbinfo";

/// Markup style of results that are not wiki markup
pub const DEFAULT_MARKUP_STYLE: &str = "default";

/// Databases and strategies offered by a server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listings {
    pub databases: Vec<DatabaseEntry>,
    pub strategies: Vec<StrategyEntry>,
}

/// Parameters of one lookup
#[derive(Debug, Clone)]
pub struct LookupParams<'a> {
    /// `host` or `host:port`
    pub server: &'a str,
    pub kind: LookupKind,
    pub db: &'a str,
    pub strategy: &'a str,
    pub query: &'a str,
    /// Language ranges from `Accept-Language`, most preferred first
    pub languages: &'a [String],
}

impl LookupParams<'_> {
    /// Cache key of the result; languages only matter when searching all databases
    pub fn cache_key(&self) -> String {
        let (host, port) = split_server(self.server);
        let langkey = if self.db == "*" {
            self.languages.join(",")
        } else {
            "*".to_string()
        };
        CacheKey::lookup(
            &host,
            port,
            &langkey,
            self.kind.as_str(),
            self.db,
            self.strategy,
            self.query,
        )
    }
}

/// A lookup result and where it lives in the cache
#[derive(Debug, Clone)]
pub struct LookupOutcome {
    pub record: LookupRecord,
    pub key: String,
    pub cached: bool,
}

fn dict_timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.dict.timeout_secs)
}

/// Database and strategy lists of `server`, from the cache when possible
pub async fn listings(
    settings: &Settings,
    cache: &CacheManager,
    server: &str,
) -> Result<Listings, DictError> {
    let key_databases = CacheKey::databases(server);
    let key_strategies = CacheKey::strategies(server);

    let databases = cache.get_opt::<Vec<DatabaseEntry>>(&key_databases).await;
    let strategies = cache.get_opt::<Vec<StrategyEntry>>(&key_strategies).await;
    if let (Some(databases), Some(strategies)) = (databases, strategies) {
        return Ok(Listings {
            databases,
            strategies,
        });
    }

    let (host, port) = split_server(server);
    let mut client = DictClient::new(dict_timeout(settings));
    client.open(&host, port).await?;
    let databases = client.show_databases().await?;
    let strategies = client.show_strategies().await?;
    close_quietly(&mut client).await;

    let ttl = Duration::from_secs(settings.cache.listing_ttl_secs);
    if let Err(e) = cache.set(&key_databases, &databases, ttl).await {
        tracing::warn!("Failed to cache database list of {}: {}", server, e);
    }
    if let Err(e) = cache.set(&key_strategies, &strategies, ttl).await {
        tracing::warn!("Failed to cache strategy list of {}: {}", server, e);
    }

    Ok(Listings {
        databases,
        strategies,
    })
}

/// Run a lookup, reusing a cached result when one exists
pub async fn lookup(
    settings: &Settings,
    cache: &CacheManager,
    params: &LookupParams<'_>,
) -> Result<LookupOutcome, DictError> {
    let key = params.cache_key();
    if let Some(record) = cache.get_opt::<LookupRecord>(&key).await {
        tracing::debug!("Serving {:?} from cache", params.query);
        return Ok(LookupOutcome {
            record,
            key,
            cached: true,
        });
    }

    let record = query_server(settings, params).await?;
    let ttl = Duration::from_secs(settings.cache.result_ttl_secs);
    if let Err(e) = cache.set(&key, &record, ttl).await {
        tracing::warn!("Failed to cache lookup result: {}", e);
    }

    Ok(LookupOutcome {
        record,
        key,
        cached: false,
    })
}

async fn query_server(
    settings: &Settings,
    params: &LookupParams<'_>,
) -> Result<LookupRecord, DictError> {
    let (host, port) = split_server(params.server);
    let mut client = DictClient::new(dict_timeout(settings));
    client.open(&host, port).await?;
    client.client(&settings.dict.client_name).await?;
    client.option("MIME", None).await?;

    if params.db == "*" && client.has_capability("lang") && !params.languages.is_empty() {
        let langs = format!(": {}", params.languages.join(" "));
        client.option("LANG", Some(&langs)).await?;
    }

    let mut markup_style = DEFAULT_MARKUP_STYLE;
    if client.has_capability("markup-wiki") && client.option("MARKUP", Some("wiki")).await? {
        markup_style = "wiki";
    }

    let result = if params.db == DBINFO {
        client.show_info(params.query).await?
    } else {
        match params.kind {
            LookupKind::Define => client.define(params.db, params.query).await?,
            LookupKind::Search => {
                client
                    .match_word(params.db, params.strategy, params.query)
                    .await?
            }
        }
    };
    close_quietly(&mut client).await;

    tracing::info!(
        "{} {:?} in {} on {}",
        params.kind.as_str(),
        params.query,
        params.db,
        params.server
    );

    Ok(LookupRecord {
        result,
        markup_style: markup_style.to_string(),
    })
}

async fn close_quietly(client: &mut DictClient) {
    if let Err(e) = client.close().await {
        tracing::debug!("Error closing DICT connection: {}", e);
    }
}

/// Language ranges of an `Accept-Language` header, without quality values
pub fn accept_languages(header: &str) -> Vec<String> {
    header
        .split(',')
        .filter_map(|lang| {
            let lang = lang.split(';').next().unwrap_or("").trim();
            (!lang.is_empty()).then(|| lang.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn params<'a>(db: &'a str, languages: &'a [String]) -> LookupParams<'a> {
        LookupParams {
            server: "dict.example.org",
            kind: LookupKind::Define,
            db,
            strategy: ".",
            query: "word",
            languages,
        }
    }

    #[test]
    fn test_accept_languages() {
        assert_eq!(
            accept_languages("pl-PL,pl;q=0.9, en;q=0.5"),
            vec!["pl-PL", "pl", "en"]
        );
        assert!(accept_languages("").is_empty());
    }

    #[test]
    fn test_cache_key_ignores_languages_for_single_database() {
        let pl = vec!["pl".to_string()];
        let en = vec!["en".to_string()];
        assert_eq!(params("gcide", &pl).cache_key(), params("gcide", &en).cache_key());
        assert_ne!(params("*", &pl).cache_key(), params("*", &en).cache_key());
        assert_eq!(
            params("*", &pl).cache_key(),
            CacheKey::lookup("dict.example.org", 2628, "pl", "define", "*", ".", "word")
        );
    }

    #[tokio::test]
    async fn test_cached_result_skips_server() {
        let settings = Settings::from_toml(
            "[server]\nhost = \"127.0.0.1\"\nport = 0\n[dict]\nservers = [\"127.0.0.1:1\"]\n",
        )
        .unwrap();
        let cache = CacheManager::in_memory(10);
        let p = LookupParams {
            server: "127.0.0.1:1",
            ..params("*", &[])
        };
        let record = LookupRecord {
            result: crate::models::LookupResult::no_match(),
            markup_style: DEFAULT_MARKUP_STYLE.to_string(),
        };
        cache
            .set(&p.cache_key(), &record, Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = lookup(&settings, &cache, &p).await.unwrap();
        assert!(outcome.cached);
        assert_eq!(outcome.record, record);
    }

    /// Fake DICT server advertising `lang`; records every command it receives
    async fn recording_server() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&commands);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    write.write_all(b"220 fake <mime.lang> <1@fake>\r\n").await.unwrap();
                    while let Ok(Some(line)) = lines.next_line().await {
                        seen.lock().unwrap().push(line.clone());
                        let reply: &[u8] = match line.split(' ').next().unwrap_or("") {
                            "QUIT" => b"221 bye\r\n",
                            "DEFINE" | "MATCH" => b"552 no match\r\n",
                            _ => b"250 ok\r\n",
                        };
                        write.write_all(reply).await.unwrap();
                        if line == "QUIT" {
                            break;
                        }
                    }
                });
            }
        });
        (addr.to_string(), commands)
    }

    #[tokio::test]
    async fn test_languages_sent_only_for_all_databases() {
        let (server, commands) = recording_server().await;
        let settings = Settings::from_toml(&format!(
            "[server]\nhost = \"127.0.0.1\"\nport = 0\n[dict]\nservers = [\"{}\"]\n",
            server
        ))
        .unwrap();
        let cache = CacheManager::in_memory(10);
        let languages = vec!["pl".to_string(), "en".to_string()];

        let all = LookupParams {
            server: &server,
            ..params("*", &languages)
        };
        let outcome = lookup(&settings, &cache, &all).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.record.markup_style, DEFAULT_MARKUP_STYLE);
        assert!(commands
            .lock()
            .unwrap()
            .iter()
            .any(|c| c == "OPTION LANG : pl en"));

        commands.lock().unwrap().clear();
        let single = LookupParams {
            server: &server,
            ..params("gcide", &languages)
        };
        lookup(&settings, &cache, &single).await.unwrap();
        let sent = commands.lock().unwrap().clone();
        assert!(sent.iter().any(|c| c.starts_with("DEFINE \"gcide\"")));
        assert!(!sent.iter().any(|c| c.starts_with("OPTION LANG")));
        assert!(!sent.iter().any(|c| c.starts_with("OPTION MARKUP")));
    }
}
