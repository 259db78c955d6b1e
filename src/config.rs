use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub dict: DictSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub onerror: OnErrorSettings,
    #[serde(default)]
    pub site: SiteSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub dictd: DictdSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// DICT servers the web front-end may query
#[derive(Debug, Clone, Deserialize)]
pub struct DictSettings {
    /// `host` or `host:port`; the first one is the default
    pub servers: Vec<String>,
    #[serde(default = "default_dict_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_dict_timeout() -> u64 { 10 }
fn default_client_name() -> String { format!("dicoweb {}", env!("CARGO_PKG_VERSION")) }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Shared L2 cache; the in-process L1 cache is always on
    pub redis_url: Option<String>,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
    #[serde(default = "default_listing_ttl")]
    pub listing_ttl_secs: u64,
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            l1_cache_size: default_l1_cache_size(),
            listing_ttl_secs: default_listing_ttl(),
            result_ttl_secs: default_result_ttl(),
        }
    }
}

fn default_l1_cache_size() -> u64 { 10_000 }
fn default_listing_ttl() -> u64 { 86_400 }
fn default_result_ttl() -> u64 { 3_600 }

/// What to do with a definition whose content type cannot be displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OnErrorAction {
    /// Drop the definition and decrement the result count
    Delete,
    /// Show `message` in place of the definition body
    Replace {
        #[serde(default = "default_unsupported_message")]
        message: String,
        #[serde(default)]
        format_html: bool,
    },
    /// Show the body anyway
    Display {
        #[serde(default)]
        format_html: bool,
    },
}

impl Default for OnErrorAction {
    fn default() -> Self {
        OnErrorAction::Replace {
            message: default_unsupported_message(),
            format_html: false,
        }
    }
}

fn default_unsupported_message() -> String {
    "Article cannot be displayed due to unsupported content type".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnErrorSettings {
    #[serde(default)]
    pub unsupported_content_type: OnErrorAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSettings {
    #[serde(default = "default_media_url")]
    pub media_url: String,
    #[serde(default = "default_site_title")]
    pub title: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            media_url: default_media_url(),
            title: default_site_title(),
        }
    }
}

fn default_media_url() -> String { "/static/".to_string() }
fn default_site_title() -> String { "Dicoweb".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

/// The bundled DICT server
#[derive(Debug, Clone, Deserialize)]
pub struct DictdSettings {
    #[serde(default = "default_dictd_host")]
    pub host: String,
    #[serde(default = "default_dictd_port")]
    pub port: u16,
    /// Name announced in the greeting banner
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_strategy_name")]
    pub default_strategy: String,
    #[serde(default = "default_lev_distance")]
    pub lev_distance: usize,
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    #[serde(default)]
    pub databases: Vec<DatabaseSettings>,
}

impl Default for DictdSettings {
    fn default() -> Self {
        Self {
            host: default_dictd_host(),
            port: default_dictd_port(),
            hostname: default_hostname(),
            default_strategy: default_strategy_name(),
            lev_distance: default_lev_distance(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            databases: Vec::new(),
        }
    }
}

fn default_dictd_host() -> String { "127.0.0.1".to_string() }
fn default_dictd_port() -> u16 { crate::core::protocol::DICT_PORT }
fn default_hostname() -> String { "localhost".to_string() }
fn default_strategy_name() -> String { "lev".to_string() }
fn default_lev_distance() -> usize { crate::core::strategy::DEFAULT_LEV_DISTANCE }
fn default_inactivity_timeout() -> u64 { 300 }

/// One database served by the bundled DICT server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSettings {
    pub name: String,
    /// Overrides the description reported by the module
    pub descr: Option<String>,
    #[serde(flatten)]
    pub handler: HandlerSettings,
}

/// Module backing a database
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "handler", rename_all = "lowercase")]
pub enum HandlerSettings {
    /// Flat `headword definition` text file
    FlatFile { path: String },
    /// Articles fetched from a MediaWiki site
    MediaWiki {
        host: String,
        #[serde(default = "default_wiki_timeout")]
        timeout_secs: u64,
        /// Article language when the host name does not carry one
        #[serde(default)]
        language: Option<String>,
    },
}

fn default_wiki_timeout() -> u64 { 4 }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with DICOWEB__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., DICOWEB__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("DICOWEB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Parse configuration from a TOML string, without consulting the environment
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

/// Apply the conventional unprefixed variables on top of loaded values
///
/// `REDIS_URL` sets the L2 cache; `DICT_SERVERS` is a comma separated server list.
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("cache.redis_url", redis_url)?;
    }

    if let Ok(servers) = env::var("DICT_SERVERS") {
        let servers: Vec<String> = servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !servers.is_empty() {
            builder = builder.set_override("dict.servers", servers)?;
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
host = "0.0.0.0"
port = 8000

[dict]
servers = ["gnu.org.ua", "dict.org:2628"]

[onerror.unsupported_content_type]
action = "delete"

[[dictd.databases]]
name = "sample"
handler = "flatfile"
path = "data/sample.txt"

[[dictd.databases]]
name = "wiktionary"
descr = "English Wiktionary"
handler = "mediawiki"
host = "en.wiktionary.org"
"#;

    #[test]
    fn test_parse_sample() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.dict.servers.len(), 2);
        assert_eq!(settings.dict.timeout_secs, 10);
        assert_eq!(settings.onerror.unsupported_content_type, OnErrorAction::Delete);
        assert_eq!(settings.cache.listing_ttl_secs, 86_400);
        assert_eq!(settings.cache.result_ttl_secs, 3_600);
        assert_eq!(settings.dictd.port, 2628);
        assert_eq!(settings.dictd.databases.len(), 2);
        assert_eq!(
            settings.dictd.databases[0].handler,
            HandlerSettings::FlatFile { path: "data/sample.txt".to_string() }
        );
        assert_eq!(
            settings.dictd.databases[1].handler,
            HandlerSettings::MediaWiki {
                host: "en.wiktionary.org".to_string(),
                timeout_secs: 4,
                language: None,
            }
        );
    }

    #[test]
    fn test_default_onerror_action() {
        match OnErrorAction::default() {
            OnErrorAction::Replace { message, format_html } => {
                assert!(message.contains("unsupported content type"));
                assert!(!format_html);
            }
            other => panic!("unexpected default: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_onerror_action_rejected() {
        let source = SAMPLE.replace("action = \"delete\"", "action = \"explode\"");
        assert!(Settings::from_toml(&source).is_err());
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }
}
