use crate::core::levenshtein::levenshtein_distance;
use crate::core::soundex::soundex;
use regex::{Regex, RegexBuilder};

/// Name that stands for the server's default strategy
pub const DEFAULT_STRATEGY_NAME: &str = ".";

/// Default Levenshtein threshold used by `lev` and `dlev`
pub const DEFAULT_LEV_DISTANCE: usize = 1;

/// Matching algorithm behind a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Exact,
    Prefix,
    Soundex,
    Levenshtein { damerau: bool },
    Regex,
    All,
}

/// A named word-matching strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: String,
    pub descr: String,
    pub selector: Selector,
}

impl Strategy {
    pub fn new(name: &str, descr: &str, selector: Selector) -> Self {
        Self {
            name: name.to_string(),
            descr: descr.to_string(),
            selector,
        }
    }

    /// Whether modules should use the generic selector for this strategy.
    ///
    /// `exact` and `prefix` are expected to be implemented natively by each
    /// module.
    pub fn has_selector(&self) -> bool {
        !matches!(self.selector, Selector::Exact | Selector::Prefix)
    }

    /// Prepare the selector for a query word
    pub fn prepare(&self, word: &str, lev_distance: usize) -> PreparedSelector {
        let state = match self.selector {
            Selector::Exact => SelectorState::Exact(word.to_lowercase()),
            Selector::Prefix => SelectorState::Prefix(word.to_lowercase()),
            Selector::Soundex => SelectorState::Soundex(soundex(word)),
            Selector::Levenshtein { damerau } => SelectorState::Levenshtein {
                word: word.to_lowercase(),
                damerau,
                max: lev_distance,
            },
            Selector::Regex => SelectorState::Regex(
                RegexBuilder::new(word)
                    .case_insensitive(true)
                    .size_limit(1 << 20)
                    .build()
                    .ok(),
            ),
            Selector::All => SelectorState::All,
        };
        PreparedSelector { state }
    }

    /// One-shot convenience wrapper around [`Strategy::prepare`]
    pub fn select(&self, word: &str, headword: &str, lev_distance: usize) -> bool {
        self.prepare(word, lev_distance).matches(headword)
    }
}

#[derive(Debug)]
enum SelectorState {
    Exact(String),
    Prefix(String),
    Soundex(Option<String>),
    Levenshtein { word: String, damerau: bool, max: usize },
    Regex(Option<Regex>),
    All,
}

/// Selector bound to a query word, ready to test headwords
#[derive(Debug)]
pub struct PreparedSelector {
    state: SelectorState,
}

impl PreparedSelector {
    pub fn matches(&self, headword: &str) -> bool {
        match &self.state {
            SelectorState::Exact(word) => headword.to_lowercase() == *word,
            SelectorState::Prefix(word) => headword.to_lowercase().starts_with(word.as_str()),
            SelectorState::Soundex(code) => match code {
                Some(code) => soundex(headword).as_ref() == Some(code),
                None => false,
            },
            SelectorState::Levenshtein { word, damerau, max } => {
                levenshtein_distance(word, &headword.to_lowercase(), *damerau) <= *max
            }
            SelectorState::Regex(re) => re.as_ref().is_some_and(|re| re.is_match(headword)),
            SelectorState::All => true,
        }
    }
}

/// Set of strategies known to a server, with a default
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
    default: usize,
}

impl StrategyRegistry {
    /// Registry with the built-in strategies; `lev` is the default
    pub fn builtin() -> Self {
        let strategies = vec![
            Strategy::new("exact", "Match words exactly", Selector::Exact),
            Strategy::new("prefix", "Match word prefixes", Selector::Prefix),
            Strategy::new("soundex", "Match using SOUNDEX algorithm", Selector::Soundex),
            Strategy::new("all", "Match everything (experimental)", Selector::All),
            Strategy::new(
                "lev",
                "Match headwords within given Levenshtein distance",
                Selector::Levenshtein { damerau: false },
            ),
            Strategy::new(
                "dlev",
                "Match headwords within given Damerau-Levenshtein distance",
                Selector::Levenshtein { damerau: true },
            ),
            Strategy::new("re", "POSIX 1003.2 (modern) regular expressions", Selector::Regex),
        ];
        let default = strategies.iter().position(|s| s.name == "lev").unwrap_or(0);
        Self { strategies, default }
    }

    /// Change the default strategy. Returns `false` if `name` is unknown or
    /// is the default placeholder itself.
    pub fn set_default(&mut self, name: &str) -> bool {
        if name == DEFAULT_STRATEGY_NAME {
            return false;
        }
        match self.strategies.iter().position(|s| s.name == name) {
            Some(idx) => {
                self.default = idx;
                true
            }
            None => false,
        }
    }

    pub fn default_strategy(&self) -> &Strategy {
        &self.strategies[self.default]
    }

    /// Look a strategy up by name; `.` yields the default
    pub fn find(&self, name: &str) -> Option<&Strategy> {
        if name == DEFAULT_STRATEGY_NAME {
            return Some(self.default_strategy());
        }
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
