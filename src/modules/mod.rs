//! Dictionary modules: the handlers that back the databases of `dicod`.
//!
//! A module is opened once per database, then asked to define or match
//! words. Each lookup yields a [`ModuleResult`] that the server walks with
//! [`DictionaryModule::result_count`] and [`DictionaryModule::output`];
//! dropping the result releases it.

pub mod flatfile;
pub mod mediawiki;

use crate::config::HandlerSettings;
use crate::core::strategy::{Strategy, DEFAULT_LEV_DISTANCE};
use crate::services::MediaWikiError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub use flatfile::FlatFileModule;
pub use mediawiki::MediaWikiModule;

/// Markup in effect when no `OPTION MARKUP` was given
pub const DEFAULT_MARKUP: &str = "none";

/// Errors raised while opening or closing a module
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MediaWiki error: {0}")]
    MediaWiki(#[from] MediaWikiError),

    #[error("Invalid module configuration: {0}")]
    InvalidConfig(String),
}

/// Per-session state a module can consult
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContext {
    /// Markup selected by the client
    pub markup: String,
    /// Threshold for the Levenshtein strategies
    pub lev_distance: usize,
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self {
            markup: DEFAULT_MARKUP.to_string(),
            lev_distance: DEFAULT_LEV_DISTANCE,
        }
    }
}

impl ModuleContext {
    pub fn with_markup(markup: &str) -> Self {
        Self {
            markup: markup.to_string(),
            ..Self::default()
        }
    }

    pub fn is_wiki(&self) -> bool {
        self.markup == "wiki"
    }
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleResult {
    /// Definition bodies
    Define(Vec<String>),
    /// Matching headwords
    Match(Vec<String>),
}

impl ModuleResult {
    pub fn items(&self) -> &[String] {
        match self {
            ModuleResult::Define(items) | ModuleResult::Match(items) => items,
        }
    }

    pub fn is_define(&self) -> bool {
        matches!(self, ModuleResult::Define(_))
    }
}

/// Contract between `dicod` and a dictionary handler
#[async_trait]
pub trait DictionaryModule: Send + Sync {
    /// Prepare the module to serve database `dbname`
    async fn open(&mut self, dbname: &str) -> Result<(), ModuleError>;

    async fn close(&mut self) -> Result<(), ModuleError>;

    /// Short description shown by `SHOW DB`
    fn descr(&self) -> Option<String>;

    /// Long description shown by `SHOW INFO`
    fn info(&self) -> Option<String>;

    /// Look up definitions of `word`; `None` means no result
    async fn define_word(&self, ctx: &ModuleContext, word: &str) -> Option<ModuleResult>;

    /// Find headwords matching `word` under `strategy`; `None` means no result
    async fn match_word(
        &self,
        ctx: &ModuleContext,
        strategy: &Strategy,
        word: &str,
    ) -> Option<ModuleResult>;

    /// Append the `n`th element of `result` to `out`
    fn output(&self, result: &ModuleResult, n: usize, out: &mut String) -> bool;

    fn result_count(&self, result: &ModuleResult) -> usize {
        result.items().len()
    }

    /// Number of comparisons made to produce `result`
    fn compare_count(&self, result: &ModuleResult) -> usize {
        self.result_count(result)
    }

    /// Add MIME headers describing `result`
    fn result_headers(
        &self,
        _ctx: &ModuleContext,
        _result: &ModuleResult,
        _headers: &mut BTreeMap<String, String>,
    ) {
    }

    /// Markups this module can produce
    fn markups(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Build the module configured for a database
pub fn create_module(handler: &HandlerSettings) -> Result<Box<dyn DictionaryModule>, ModuleError> {
    match handler {
        HandlerSettings::FlatFile { path } => Ok(Box::new(FlatFileModule::new(path))),
        HandlerSettings::MediaWiki {
            host,
            timeout_secs,
            language,
        } => {
            if host.is_empty() {
                return Err(ModuleError::InvalidConfig(
                    "mediawiki handler needs a host".to_string(),
                ));
            }
            let mut module =
                MediaWikiModule::new(host, std::time::Duration::from_secs(*timeout_secs))?;
            if let Some(lang) = language {
                module = module.with_language(lang);
            }
            Ok(Box::new(module))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = ModuleContext::default();
        assert_eq!(ctx.markup, "none");
        assert!(!ctx.is_wiki());
        assert!(ModuleContext::with_markup("wiki").is_wiki());
    }

    #[test]
    fn test_create_module() {
        let flat = create_module(&HandlerSettings::FlatFile { path: "x.txt".to_string() });
        assert!(flat.is_ok());

        let bad = create_module(&HandlerSettings::MediaWiki {
            host: String::new(),
            timeout_secs: 4,
            language: None,
        });
        assert!(matches!(bad, Err(ModuleError::InvalidConfig(_))));
    }

    #[test]
    fn test_result_items() {
        let r = ModuleResult::Match(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(r.items().len(), 2);
        assert!(!r.is_define());
    }
}
