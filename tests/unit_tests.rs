// Unit tests for dicoweb

use dicoweb::config::OnErrorAction;
use dicoweb::core::{
    levenshtein_distance, mark_plain_text, protocol, render_definitions, soundex, wiki,
    HtmlOptions, StrategyRegistry,
};
use dicoweb::models::{DefineResult, Definition, DisplayFormat, LookupResult};
use dicoweb::services::{CacheKey, CacheManager};
use std::collections::BTreeMap;
use std::time::Duration;

fn definition(content_type: Option<&str>, desc: &str) -> Definition {
    Definition {
        db: "db".to_string(),
        db_fullname: "Database".to_string(),
        term: "term".to_string(),
        desc: desc.to_string(),
        content_type: content_type.map(|s| s.to_string()),
        headers: BTreeMap::new(),
        display: DisplayFormat::Text,
    }
}

#[test]
fn test_levenshtein_distance_basics() {
    assert_eq!(levenshtein_distance("kitten", "sitting", false), 3);
    assert_eq!(levenshtein_distance("", "abc", false), 3);
    assert_eq!(levenshtein_distance("same", "same", false), 0);
}

#[test]
fn test_damerau_counts_transposition_once() {
    assert_eq!(levenshtein_distance("teh", "the", false), 2);
    assert_eq!(levenshtein_distance("teh", "the", true), 1);
}

#[test]
fn test_soundex_codes() {
    assert_eq!(soundex("Robert").as_deref(), Some("R163"));
    assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
    assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
    assert_eq!(soundex("").as_deref(), None);
}

#[test]
fn test_default_strategy_is_lev() {
    let strategies = StrategyRegistry::builtin();
    let default = strategies.find(".").unwrap();
    assert_eq!(default.name, "lev");
    assert!(default.select("colour", "color", 1));
    assert!(!default.select("colour", "collar", 1));
}

#[test]
fn test_strategies_with_selector() {
    let strategies = StrategyRegistry::builtin();
    assert!(!strategies.find("exact").unwrap().has_selector());
    assert!(!strategies.find("prefix").unwrap().has_selector());
    assert!(strategies.find("soundex").unwrap().has_selector());

    let soundex = strategies.find("soundex").unwrap();
    assert!(soundex.select("Robert", "rupert", 1));

    let re = strategies.find("re").unwrap().prepare("^b.n", 1);
    assert!(re.matches("banana"));
    assert!(!re.matches("cabin"));

    let all = strategies.find("all").unwrap();
    assert!(all.select("anything", "whatever", 0));
}

#[test]
fn test_protocol_quote_and_tokenize() {
    let line = format!("MATCH * prefix {}", protocol::quote("ice \"cream\""));
    assert_eq!(
        protocol::tokenize(&line),
        vec!["MATCH", "*", "prefix", "ice \"cream\""]
    );
}

#[test]
fn test_wiki_to_html_links() {
    let html = wiki::to_html("See [[ice cream|this]].", "?q=", "en");
    assert!(html.contains("<a href=\"?q=ice%20cream\""));
    assert!(html.contains(">this</a>"));
}

#[test]
fn test_onerror_replace_with_html() {
    let result = LookupResult::Define(DefineResult {
        count: 1,
        definitions: vec![definition(Some("application/octet-stream"), "\u{0}\u{1}")],
    });
    let action = OnErrorAction::Replace {
        message: "<i>unsupported</i>".to_string(),
        format_html: true,
    };
    match render_definitions(result, &action, "?q=") {
        LookupResult::Define(d) => {
            assert_eq!(d.count, 1);
            assert_eq!(d.definitions[0].desc, "<i>unsupported</i>");
            assert_eq!(d.definitions[0].display, DisplayFormat::Html);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_plain_definitions_get_markup() {
    let result = LookupResult::Define(DefineResult {
        count: 1,
        definitions: vec![definition(None, "_Noun_: see {other}")],
    });
    match render_definitions(result, &OnErrorAction::Delete, "?q=") {
        LookupResult::Define(d) => {
            assert_eq!(d.definitions[0].display, DisplayFormat::Marked);
            assert_eq!(
                d.definitions[0].desc,
                mark_plain_text("_Noun_: see {other}", "?q=")
            );
            assert!(d.definitions[0].desc.starts_with("<b>Noun</b>"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_html_options_server_list() {
    let options = HtmlOptions::from_values(vec!["gnu.org.ua", "dict.org"], "dict.org");
    let html = options.html();
    assert!(html.contains("<option value=\"gnu.org.ua\">gnu.org.ua</option>"));
    assert!(html.contains("<option value=\"dict.org\" selected=\"selected\">dict.org</option>"));
}

#[test]
fn test_cache_keys_are_stable() {
    let key = CacheKey::lookup("gnu.org.ua", 2628, "*", "search", "*", ".", "word");
    assert_eq!(
        key,
        CacheKey::lookup("gnu.org.ua", 2628, "*", "search", "*", ".", "word")
    );
    assert_ne!(
        key,
        CacheKey::lookup("gnu.org.ua", 2628, "*", "define", "*", ".", "word")
    );
}

#[test]
fn test_in_memory_cache_roundtrip() {
    let cache = CacheManager::in_memory(16);
    tokio_test::block_on(async {
        cache
            .set("dicoweb/test", &vec![1u32, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<Vec<u32>> = cache.get_opt("dicoweb/test").await;
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(cache.stats().l1_size <= 1);
    });
}
