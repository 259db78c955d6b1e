// Core algorithm exports
pub mod levenshtein;
pub mod protocol;
pub mod render;
pub mod soundex;
pub mod strategy;
pub mod wiki;

pub use levenshtein::levenshtein_distance;
pub use render::{mark_plain_text, render_definitions, HtmlOptions};
pub use soundex::soundex;
pub use strategy::{PreparedSelector, Selector, Strategy, StrategyRegistry};
