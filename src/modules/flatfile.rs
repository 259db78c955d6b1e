use super::{DictionaryModule, ModuleContext, ModuleError, ModuleResult};
use crate::core::strategy::{Selector, Strategy};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFINITION_SEPARATOR: &str = "---------";

/// Dictionary read from a flat text file.
///
/// ```text
/// -- comment
/// descr: Short description
/// info: Long description,
/// info: possibly on several lines
/// headword its definition
/// ```
pub struct FlatFileModule {
    path: PathBuf,
    dbname: String,
    descr: Option<String>,
    info: Vec<String>,
    entries: BTreeMap<String, String>,
}

impl FlatFileModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dbname: String::new(),
            descr: None,
            info: Vec::new(),
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn load(&mut self, contents: &str) {
        self.descr = None;
        self.info.clear();
        self.entries.clear();

        for line in contents.lines() {
            if line.starts_with("--") {
                continue;
            }
            if let Some(descr) = line.strip_prefix("descr: ") {
                self.descr = Some(descr.trim().to_string());
                continue;
            }
            if let Some(info) = line.strip_prefix("info: ") {
                self.info.push(info.trim().to_string());
                continue;
            }
            if let Some((key, value)) = line.trim().split_once(' ') {
                self.entries
                    .insert(key.to_lowercase(), value.trim().to_string());
            }
        }
    }
}

#[async_trait]
impl DictionaryModule for FlatFileModule {
    async fn open(&mut self, dbname: &str) -> Result<(), ModuleError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ModuleError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.dbname = dbname.to_string();
        self.load(&contents);
        tracing::info!(
            "Loaded {} entries into {} from {}",
            self.entries.len(),
            dbname,
            self.path.display()
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ModuleError> {
        self.entries.clear();
        Ok(())
    }

    fn descr(&self) -> Option<String> {
        self.descr.clone()
    }

    fn info(&self) -> Option<String> {
        if self.info.is_empty() {
            None
        } else {
            Some(self.info.join("\n"))
        }
    }

    async fn define_word(&self, _ctx: &ModuleContext, word: &str) -> Option<ModuleResult> {
        self.entries
            .get(&word.to_lowercase())
            .map(|definition| ModuleResult::Define(vec![definition.clone()]))
    }

    async fn match_word(
        &self,
        ctx: &ModuleContext,
        strategy: &Strategy,
        word: &str,
    ) -> Option<ModuleResult> {
        let word = word.to_lowercase();
        let found: Vec<String> = match strategy.selector {
            Selector::Exact => self
                .entries
                .contains_key(&word)
                .then(|| vec![word.clone()])
                .unwrap_or_default(),
            Selector::Prefix => self
                .entries
                .range(word.clone()..)
                .take_while(|(k, _)| k.starts_with(&word))
                .map(|(k, _)| k.clone())
                .collect(),
            _ => {
                let selector = strategy.prepare(&word, ctx.lev_distance);
                self.entries
                    .keys()
                    .filter(|k| selector.matches(k))
                    .cloned()
                    .collect()
            }
        };

        if found.is_empty() {
            None
        } else {
            Some(ModuleResult::Match(found))
        }
    }

    fn output(&self, result: &ModuleResult, n: usize, out: &mut String) -> bool {
        let Some(item) = result.items().get(n) else {
            return false;
        };
        match result {
            ModuleResult::Define(_) => {
                out.push_str(&format!("{}. {}\n{}", n + 1, item, DEFINITION_SEPARATOR));
            }
            ModuleResult::Match(_) => out.push_str(item),
        }
        true
    }
}
