use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A database as listed by `SHOW DB`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,
    pub descr: String,
}

/// A strategy as listed by `SHOW STRAT`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub name: String,
    pub descr: String,
}

impl DatabaseEntry {
    pub fn new(name: impl Into<String>, descr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descr: descr.into(),
        }
    }
}

/// How a definition body is put on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    /// Body is HTML and is inserted as is
    Html,
    /// Body is plain text and is escaped
    #[default]
    Text,
    /// Body is already escaped plain text carrying inline markup tags
    Marked,
}

/// One definition returned by `DEFINE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub db: String,
    pub db_fullname: String,
    pub term: String,
    pub desc: String,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    /// MIME headers other than Content-Type, keyed by lowercase name
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub display: DisplayFormat,
}

impl Definition {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }
}

/// Matches found in one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchGroup {
    pub db: String,
    #[serde(default)]
    pub db_fullname: Option<String>,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineResult {
    pub count: usize,
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub count: usize,
    pub matches: Vec<MatchGroup>,
}

impl MatchResult {
    /// Append a match, grouping it under its database
    pub fn push(&mut self, db: &str, word: String) {
        match self.matches.iter_mut().find(|g| g.db == db) {
            Some(group) => group.words.push(word),
            None => self.matches.push(MatchGroup {
                db: db.to_string(),
                db_fullname: None,
                words: vec![word],
            }),
        }
        self.count += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResult {
    pub db: String,
    pub desc: String,
}

/// A non-success reply from the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: u16,
    pub msg: String,
}

/// Outcome of a lookup against a DICT server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LookupResult {
    Define(DefineResult),
    Match(MatchResult),
    Info(InfoResult),
    Error(ErrorReply),
}

impl LookupResult {
    pub fn no_match() -> Self {
        LookupResult::Error(ErrorReply {
            code: 552,
            msg: "No match".to_string(),
        })
    }
}

/// Lookup result as cached by the web front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    pub result: LookupResult,
    pub markup_style: String,
}

/// Kind of lookup requested from the web UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    Define,
    Search,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Define => "define",
            LookupKind::Search => "search",
        }
    }
}
