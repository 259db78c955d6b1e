use crate::config::OnErrorAction;
use crate::core::wiki;
use crate::models::{DisplayFormat, LookupResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static UNDERSCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(.*?)_").unwrap());
static XREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{+(.*?)\}+").unwrap());
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

/// Language assumed for wiki articles without an `X-Wiki-Language` header
const DEFAULT_WIKI_LANGUAGE: &str = "en";

/// Prepare definitions for display.
///
/// Each definition is dispatched on its content type: wiki markup is
/// rendered to HTML, HTML passes through, other `text/*` types are shown as
/// text, and anything else is handled by `unsupported`. Definitions without
/// a content type get dictd-style `_emphasis_` and `{cross references}`.
/// A define result left with no definitions turns into `552 No match`.
pub fn render_definitions(
    result: LookupResult,
    unsupported: &OnErrorAction,
    link_base: &str,
) -> LookupResult {
    let LookupResult::Define(mut define) = result else {
        return result;
    };

    let mut kept = Vec::with_capacity(define.definitions.len());
    for mut df in define.definitions.drain(..) {
        let Some(content_type) = df.content_type.as_deref().map(str::to_ascii_lowercase) else {
            df.desc = mark_plain_text(&df.desc, link_base);
            df.display = DisplayFormat::Marked;
            kept.push(df);
            continue;
        };

        if content_type.starts_with("text/x-wiki") {
            let lang = df
                .header("x-wiki-language")
                .unwrap_or(DEFAULT_WIKI_LANGUAGE)
                .to_string();
            let source = html_escape::decode_html_entities(&df.desc).into_owned();
            df.desc = wiki::to_html(&source, link_base, &lang);
            df.display = DisplayFormat::Html;
        } else if content_type.starts_with("text/html") {
            df.display = DisplayFormat::Html;
        } else if content_type.starts_with("text/") {
            df.display = DisplayFormat::Text;
        } else {
            match unsupported {
                OnErrorAction::Delete => {
                    tracing::debug!("Dropping {} definition of {:?} from {}", content_type, df.term, df.db);
                    define.count = define.count.saturating_sub(1);
                    continue;
                }
                OnErrorAction::Replace { message, format_html } => {
                    df.desc = message.clone();
                    df.display = html_or_text(*format_html);
                }
                OnErrorAction::Display { format_html } => {
                    df.display = html_or_text(*format_html);
                }
            }
        }
        kept.push(df);
    }
    define.definitions = kept;

    if define.count == 0 {
        return LookupResult::no_match();
    }
    LookupResult::Define(define)
}

fn html_or_text(format_html: bool) -> DisplayFormat {
    if format_html {
        DisplayFormat::Html
    } else {
        DisplayFormat::Text
    }
}

/// Escape plain dictionary text and turn its conventions into markup:
/// `_word_` becomes bold, `{word}` becomes a search link.
pub fn mark_plain_text(text: &str, link_base: &str) -> String {
    let escaped = html_escape::encode_text(text);
    let bolded = UNDERSCORE_RE.replace_all(&escaped, "<b>$1</b>");
    XREF_RE
        .replace_all(&bolded, |caps: &Captures| {
            let shown = SPACES_RE.replace_all(&caps[1], " ").into_owned();
            let flat = shown.replace('\n', "");
            let target = html_escape::decode_html_entities(&flat);
            format!(
                "<a href=\"{}{}\" title=\"Search for {}\">{}</a>",
                link_base,
                urlencoding::encode(&target),
                html_escape::encode_double_quoted_attribute(&flat),
                shown
            )
        })
        .into_owned()
}

/// `<option>` list for a select box
#[derive(Debug, Clone)]
pub struct HtmlOptions {
    options: Vec<(String, String)>,
    selected: String,
}

impl HtmlOptions {
    /// Options given as `(value, label)` pairs; an empty label shows the value
    pub fn new<I, V, L>(options: I, selected: &str) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<String>,
        L: Into<String>,
    {
        Self {
            options: options
                .into_iter()
                .map(|(v, l)| (v.into(), l.into()))
                .collect(),
            selected: selected.to_string(),
        }
    }

    /// Options whose label is their value
    pub fn from_values<I, V>(values: I, selected: &str) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::new(values.into_iter().map(|v| (v, String::new())), selected)
    }

    pub fn html(&self) -> String {
        self.options
            .iter()
            .map(|(value, label)| {
                let label = if label.is_empty() { value } else { label };
                let selected = if *value == self.selected {
                    " selected=\"selected\""
                } else {
                    ""
                };
                format!(
                    "<option value=\"{}\"{}>{}</option>",
                    html_escape::encode_double_quoted_attribute(value),
                    selected,
                    html_escape::encode_text(label)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DefineResult, Definition};
    use std::collections::BTreeMap;

    fn definition(content_type: Option<&str>, desc: &str) -> Definition {
        Definition {
            db: "db".to_string(),
            db_fullname: "Test database".to_string(),
            term: "word".to_string(),
            desc: desc.to_string(),
            content_type: content_type.map(|s| s.to_string()),
            headers: BTreeMap::new(),
            display: DisplayFormat::Text,
        }
    }

    fn define(defs: Vec<Definition>) -> LookupResult {
        LookupResult::Define(DefineResult {
            count: defs.len(),
            definitions: defs,
        })
    }

    fn unwrap_define(result: LookupResult) -> DefineResult {
        match result {
            LookupResult::Define(d) => d,
            other => panic!("expected define result, got {:?}", other),
        }
    }

    #[test]
    fn test_replace_keeps_count() {
        let action = OnErrorAction::Replace {
            message: "cannot show".to_string(),
            format_html: false,
        };
        let result = render_definitions(
            define(vec![definition(Some("text/x-foo"), "x"), definition(Some("application/pdf"), "%PDF")]),
            &action,
            "?q=",
        );
        let d = unwrap_define(result);
        assert_eq!(d.count, 2);
        assert_eq!(d.definitions[1].desc, "cannot show");
        assert_eq!(d.definitions[1].display, DisplayFormat::Text);
        // text/x-foo is still text/*
        assert_eq!(d.definitions[0].desc, "x");
    }

    #[test]
    fn test_delete_decrements_count() {
        let result = render_definitions(
            define(vec![definition(Some("image/png"), "..."), definition(Some("text/plain"), "ok")]),
            &OnErrorAction::Delete,
            "?q=",
        );
        let d = unwrap_define(result);
        assert_eq!(d.count, 1);
        assert_eq!(d.definitions.len(), 1);
        assert_eq!(d.definitions[0].desc, "ok");
    }

    #[test]
    fn test_delete_all_becomes_no_match() {
        let result = render_definitions(
            define(vec![definition(Some("image/png"), "...")]),
            &OnErrorAction::Delete,
            "?q=",
        );
        assert_eq!(result, LookupResult::no_match());
    }

    #[test]
    fn test_display_keeps_body() {
        let result = render_definitions(
            define(vec![definition(Some("application/xml"), "<a/>")]),
            &OnErrorAction::Display { format_html: true },
            "?q=",
        );
        let d = unwrap_define(result);
        assert_eq!(d.definitions[0].desc, "<a/>");
        assert_eq!(d.definitions[0].display, DisplayFormat::Html);
    }

    #[test]
    fn test_wiki_uses_language_header() {
        let mut df = definition(Some("text/x-wiki-wiktionary"), "'''word'''");
        df.headers.insert("x-wiki-language".to_string(), "pl".to_string());
        let d = unwrap_define(render_definitions(define(vec![df]), &OnErrorAction::Delete, "?q="));
        assert_eq!(d.definitions[0].display, DisplayFormat::Html);
        assert!(d.definitions[0].desc.contains("lang=\"pl\""));
        assert!(d.definitions[0].desc.contains("<b>word</b>"));
    }

    #[test]
    fn test_wiki_entities_are_decoded() {
        let df = definition(Some("text/x-wiki-wiktionary"), "caf&eacute;&nbsp;au lait &amp; <b>");
        let d = unwrap_define(render_definitions(define(vec![df]), &OnErrorAction::Delete, "?q="));
        let html = &d.definitions[0].desc;
        assert!(html.contains("café\u{a0}au lait"));
        assert!(!html.contains("&amp;eacute;"));
        // decoded markup is escaped again, not passed through
        assert!(html.contains("&amp; &lt;b&gt;"));
    }

    #[test]
    fn test_html_passes_through() {
        let d = unwrap_define(render_definitions(
            define(vec![definition(Some("text/html; charset=utf-8"), "<p>x</p>")]),
            &OnErrorAction::Delete,
            "?q=",
        ));
        assert_eq!(d.definitions[0].desc, "<p>x</p>");
        assert_eq!(d.definitions[0].display, DisplayFormat::Html);
    }

    #[test]
    fn test_plain_text_markup() {
        let marked = mark_plain_text("A _bold_ word, see {other  word} & <more>.", "?q=");
        assert_eq!(
            marked,
            "A <b>bold</b> word, see <a href=\"?q=other%20word\" title=\"Search for other word\">other word</a> &amp; &lt;more&gt;."
        );
        let nested = mark_plain_text("see {{double}}", "?q=");
        assert!(nested.contains("<a href=\"?q=double\""));
    }

    #[test]
    fn test_non_define_results_untouched() {
        let err = LookupResult::no_match();
        assert_eq!(render_definitions(err.clone(), &OnErrorAction::Delete, "?q="), err);
    }

    #[test]
    fn test_html_options() {
        let opts = HtmlOptions::new(vec![("*", "All"), ("gcide", "")], "gcide");
        assert_eq!(
            opts.html(),
            "<option value=\"*\">All</option>\n<option value=\"gcide\" selected=\"selected\">gcide</option>"
        );
        let servers = HtmlOptions::from_values(vec!["a&b"], "x");
        assert_eq!(servers.html(), "<option value=\"a&amp;b\">a&amp;b</option>");
    }
}
