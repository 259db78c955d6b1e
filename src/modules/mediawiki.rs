use super::{DictionaryModule, ModuleContext, ModuleError, ModuleResult};
use crate::core::strategy::Strategy;
use crate::core::wiki;
use crate::services::MediaWikiClient;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Articles served live from a MediaWiki site
pub struct MediaWikiModule {
    host: String,
    client: MediaWikiClient,
    dbname: String,
    language: Option<String>,
}

impl MediaWikiModule {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, ModuleError> {
        Ok(Self {
            host: host.to_string(),
            client: MediaWikiClient::new(host, timeout)?,
            dbname: String::new(),
            language: None,
        })
    }

    /// Announce `lang` as the article language instead of guessing it from the host
    pub fn with_language(mut self, lang: &str) -> Self {
        self.language = Some(lang.to_string());
        self
    }

    /// Content type of articles from this wiki
    fn content_type(&self, ctx: &ModuleContext) -> &'static str {
        if !ctx.is_wiki() {
            "text/plain"
        } else if self.host.contains(".wikipedia.org") {
            "text/x-wiki-wikipedia"
        } else if self.host.contains(".wiktionary.org") {
            "text/x-wiki-wiktionary"
        } else {
            "text/x-wiki"
        }
    }

    /// Language subdomain of a `xx.wikipedia.org` style host
    fn language(&self) -> Option<&str> {
        if let Some(lang) = &self.language {
            return Some(lang.as_str());
        }
        let host = self
            .host
            .split_once("://")
            .map_or(self.host.as_str(), |(_, rest)| rest);
        let (lang, rest) = host.split_once('.')?;
        let known = rest.starts_with("wikipedia.org") || rest.starts_with("wiktionary.org");
        let plausible = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase());
        (known && plausible).then_some(lang)
    }
}

#[async_trait]
impl DictionaryModule for MediaWikiModule {
    async fn open(&mut self, dbname: &str) -> Result<(), ModuleError> {
        self.dbname = dbname.to_string();
        tracing::info!("Serving {} from {}", dbname, self.client.base_url());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn descr(&self) -> Option<String> {
        Some(self.host.clone())
    }

    fn info(&self) -> Option<String> {
        None
    }

    async fn define_word(&self, ctx: &ModuleContext, word: &str) -> Option<ModuleResult> {
        let article = match self.client.export_article(word).await {
            Ok(Some(article)) => article,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("{}: export of {:?} failed: {}", self.dbname, word, e);
                return None;
            }
        };

        let body = if ctx.is_wiki() {
            article
        } else {
            wiki::to_text(&html_escape::decode_html_entities(&article))
        };
        Some(ModuleResult::Define(vec![body]))
    }

    async fn match_word(
        &self,
        _ctx: &ModuleContext,
        _strategy: &Strategy,
        word: &str,
    ) -> Option<ModuleResult> {
        match self.client.opensearch(word).await {
            Ok(titles) if !titles.is_empty() => Some(ModuleResult::Match(titles)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("{}: search for {:?} failed: {}", self.dbname, word, e);
                None
            }
        }
    }

    fn output(&self, result: &ModuleResult, n: usize, out: &mut String) -> bool {
        match result.items().get(n) {
            Some(item) => {
                out.push_str(item);
                true
            }
            None => false,
        }
    }

    fn result_count(&self, result: &ModuleResult) -> usize {
        match result {
            ModuleResult::Define(_) => 1,
            ModuleResult::Match(titles) => titles.len(),
        }
    }

    fn compare_count(&self, _result: &ModuleResult) -> usize {
        1
    }

    fn result_headers(
        &self,
        ctx: &ModuleContext,
        _result: &ModuleResult,
        headers: &mut BTreeMap<String, String>,
    ) {
        headers.insert("Content-Type".to_string(), self.content_type(ctx).to_string());
        if ctx.is_wiki() {
            if let Some(lang) = self.language() {
                headers.insert("X-Wiki-Language".to_string(), lang.to_string());
            }
        }
    }

    fn markups(&self) -> &'static [&'static str] {
        &["wiki"]
    }
}
