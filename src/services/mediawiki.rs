use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Namespace prefix of `Special:Export` documents; the suffix is the schema version
pub const EXPORT_NAMESPACE_PREFIX: &str = "http://www.mediawiki.org/xml/export-";

const USER_AGENT: &str = "Mozilla/1.0";
const ENDPOINT_MATCH: &str = "/w/api.php?action=opensearch&format=json&search=";
const ENDPOINT_DEFINE: &str = "/wiki/Special:Export/";

/// Errors that can occur when talking to a MediaWiki site
#[derive(Debug, Error)]
pub enum MediaWikiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid XML: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// MediaWiki HTTP client
///
/// Fetches article sources through `Special:Export` and title suggestions
/// through the `opensearch` API.
pub struct MediaWikiClient {
    base_url: String,
    client: Client,
}

impl MediaWikiClient {
    /// Create a client for `host`, which may be a bare host name or a URL
    pub fn new(host: &str, timeout: Duration) -> Result<Self, MediaWikiError> {
        let base_url = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wiki source of the article `title`, or `None` if it does not exist
    pub async fn export_article(&self, title: &str) -> Result<Option<String>, MediaWikiError> {
        let url = format!(
            "{}{}{}",
            self.base_url,
            ENDPOINT_DEFINE,
            urlencoding::encode(title)
        );
        tracing::debug!("Fetching article from: {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(MediaWikiError::ApiError(format!(
                "Failed to export article: {}",
                response.status()
            )));
        }

        let xml = response.text().await?;
        extract_article_text(&xml)
    }

    /// Titles suggested by the `opensearch` API for `query`
    pub async fn opensearch(&self, query: &str) -> Result<Vec<String>, MediaWikiError> {
        let url = format!(
            "{}{}{}",
            self.base_url,
            ENDPOINT_MATCH,
            urlencoding::encode(query)
        );
        tracing::debug!("Searching titles at: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MediaWikiError::ApiError(format!(
                "Failed to search titles: {}",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        parse_opensearch(&json)
    }
}

/// Text of the first `<text>` element in the export namespace
pub fn extract_article_text(xml: &str) -> Result<Option<String>, MediaWikiError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut in_text = false;
    let mut text = String::new();

    loop {
        match reader.read_resolved_event()? {
            (ResolveResult::Bound(ns), Event::Start(e))
                if e.local_name().as_ref() == b"text"
                    && ns.as_ref().starts_with(EXPORT_NAMESPACE_PREFIX.as_bytes()) =>
            {
                in_text = true;
            }
            (_, Event::Text(t)) if in_text => text.push_str(&t.unescape()?),
            (_, Event::CData(c)) if in_text => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            (_, Event::End(e)) if in_text && e.local_name().as_ref() == b"text" => {
                return Ok(if text.is_empty() { None } else { Some(text) });
            }
            (_, Event::Eof) => return Ok(None),
            _ => {}
        }
    }
}

/// Titles from an opensearch reply: `[query, [titles], [descriptions], [urls]]`
pub fn parse_opensearch(json: &Value) -> Result<Vec<String>, MediaWikiError> {
    let titles = json
        .get(1)
        .and_then(|t| t.as_array())
        .ok_or_else(|| MediaWikiError::InvalidResponse("Missing titles array".into()))?;

    Ok(titles
        .iter()
        .filter_map(|t| t.as_str().map(|s| s.to_string()))
        .collect())
}
