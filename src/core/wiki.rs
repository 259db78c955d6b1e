//! MediaWiki markup conversion.
//!
//! Covers the subset of wikitext that shows up in dictionary articles:
//! headings, emphasis, internal and external links, lists, rules and
//! paragraphs. Templates, comments and category/interwiki links are dropped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(={1,6})\s*(.+?)\s*={1,6}\s*$").unwrap());
static INTERNAL_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]|]+)(?:\|([^\[\]]*))?\]\]").unwrap());
static EXTERNAL_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[((?:https?|ftp)://[^\s\]]+)(?:\s+([^\]]*))?\]").unwrap());
static BOLD_ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'''''(.+?)'''''").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'''(.+?)'''").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"''(.+?)''").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());

const LIST_MARKERS: [char; 4] = ['*', '#', ':', ';'];

/// Remove comments and (possibly nested) `{{templates}}`
fn prepare(markup: &str) -> String {
    let text = COMMENT_RE.replace_all(markup, "");
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                depth += 1;
            }
            '}' if depth > 0 && chars.peek() == Some(&'}') => {
                chars.next();
                depth -= 1;
            }
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Category, file and interwiki links carry no visible text
fn is_hidden_link(target: &str) -> bool {
    let Some((prefix, _)) = target.split_once(':') else {
        return false;
    };
    let lower = prefix.trim().to_lowercase();
    matches!(lower.as_str(), "category" | "file" | "image" | "media")
        || (!prefix.is_empty()
            && prefix.len() <= 3
            && prefix.chars().all(|c| c.is_ascii_lowercase()))
}

/// Split a link into the page it points to and the label it displays
fn link_parts<'a>(target: &'a str, label: Option<&'a str>) -> (&'a str, &'a str) {
    let target = target.trim().trim_start_matches(':');
    let page = target.split('#').next().unwrap_or(target).trim();
    let label = match label {
        Some(l) if !l.trim().is_empty() => l.trim(),
        _ => target,
    };
    (page, label)
}

fn list_prefix(line: &str) -> &str {
    let end = line
        .find(|c: char| !LIST_MARKERS.contains(&c))
        .unwrap_or(line.len());
    &line[..end]
}

fn emphasis_html(text: &str) -> String {
    let text = BOLD_ITALIC_RE.replace_all(text, "<b><i>$1</i></b>");
    let text = BOLD_RE.replace_all(&text, "<b>$1</b>");
    ITALIC_RE.replace_all(&text, "<i>$1</i>").into_owned()
}

/// Convert one escaped line of wikitext to inline HTML
fn inline_html(line: &str, link_base: &str) -> String {
    let linked = INTERNAL_LINK_RE.replace_all(line, |caps: &Captures| {
        let target = &caps[1];
        if is_hidden_link(target) && !target.starts_with(':') {
            return String::new();
        }
        let (page, label) = link_parts(target, caps.get(2).map(|m| m.as_str()));
        let page = html_escape::decode_html_entities(page);
        format!(
            "<a href=\"{}{}\">{}</a>",
            link_base,
            urlencoding::encode(&page),
            label
        )
    });
    let linked = EXTERNAL_LINK_RE.replace_all(&linked, |caps: &Captures| {
        let url = &caps[1];
        let label = caps.get(2).map(|m| m.as_str().trim()).filter(|l| !l.is_empty());
        // the line is already text-escaped; quotes still need escaping inside the attribute
        let href = html_escape::decode_html_entities(url);
        format!(
            "<a href=\"{}\">{}</a>",
            html_escape::encode_double_quoted_attribute(&href),
            label.unwrap_or(url)
        )
    });
    emphasis_html(&linked)
}

/// Convert one line of wikitext to plain text
fn inline_text(line: &str) -> String {
    let linked = INTERNAL_LINK_RE.replace_all(line, |caps: &Captures| {
        let target = &caps[1];
        if is_hidden_link(target) && !target.starts_with(':') {
            return String::new();
        }
        link_parts(target, caps.get(2).map(|m| m.as_str())).1.to_string()
    });
    let linked = EXTERNAL_LINK_RE.replace_all(&linked, |caps: &Captures| {
        caps.get(2)
            .map(|m| m.as_str().trim())
            .filter(|l| !l.is_empty())
            .unwrap_or(&caps[1])
            .to_string()
    });
    let plain = linked.replace("'''", "").replace("''", "");
    TAG_RE.replace_all(&plain, "").trim_end().to_string()
}

fn list_tags(marker: char) -> (&'static str, &'static str) {
    match marker {
        '*' => ("ul", "li"),
        '#' => ("ol", "li"),
        ';' => ("dl", "dt"),
        _ => ("dl", "dd"),
    }
}

fn same_list(a: char, b: char) -> bool {
    a == b || (matches!(a, ':' | ';') && matches!(b, ':' | ';'))
}

struct HtmlBuilder<'a> {
    out: String,
    paragraph: Vec<String>,
    lists: Vec<char>,
    link_base: &'a str,
}

impl<'a> HtmlBuilder<'a> {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            self.out.push_str("<p>");
            self.out.push_str(&self.paragraph.join("\n"));
            self.out.push_str("</p>\n");
            self.paragraph.clear();
        }
    }

    fn close_lists(&mut self, keep: usize) {
        while self.lists.len() > keep {
            if let Some(marker) = self.lists.pop() {
                self.out.push_str(&format!("</{}>\n", list_tags(marker).0));
            }
        }
    }

    fn list_item(&mut self, prefix: &str, body: &str) {
        self.flush_paragraph();
        let markers: Vec<char> = prefix.chars().collect();
        let common = self
            .lists
            .iter()
            .zip(markers.iter())
            .take_while(|(a, b)| same_list(**a, **b))
            .count();
        self.close_lists(common);
        for &marker in &markers[common..] {
            self.out.push_str(&format!("<{}>\n", list_tags(marker).0));
            self.lists.push(marker);
        }
        if let Some(&last) = markers.last() {
            let item = list_tags(last).1;
            self.out.push_str(&format!(
                "<{}>{}</{}>\n",
                item,
                inline_html(body.trim(), self.link_base),
                item
            ));
        }
    }

    fn block(&mut self, html: String) {
        self.flush_paragraph();
        self.close_lists(0);
        self.out.push_str(&html);
        self.out.push('\n');
    }
}

/// Render wikitext as HTML. Internal links point at `link_base` followed by
/// the URL-encoded page name.
pub fn to_html(markup: &str, link_base: &str, lang: &str) -> String {
    let escaped = html_escape::encode_text(&prepare(markup)).into_owned();
    let mut builder = HtmlBuilder {
        out: String::new(),
        paragraph: Vec::new(),
        lists: Vec::new(),
        link_base,
    };

    for line in escaped.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            builder.flush_paragraph();
            builder.close_lists(0);
        } else if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps[1].len();
            let html = format!(
                "<h{}>{}</h{}>",
                level,
                inline_html(&caps[2], link_base),
                level
            );
            builder.block(html);
        } else if line.starts_with("----") {
            builder.block("<hr/>".to_string());
        } else if line.starts_with(LIST_MARKERS) {
            let prefix = list_prefix(line);
            builder.list_item(prefix, &line[prefix.len()..]);
        } else {
            builder.close_lists(0);
            builder.paragraph.push(inline_html(line.trim(), link_base));
        }
    }
    builder.flush_paragraph();
    builder.close_lists(0);

    format!(
        "<div class=\"wiki\" lang=\"{}\">\n{}</div>",
        html_escape::encode_double_quoted_attribute(lang),
        builder.out
    )
}

/// Render wikitext as plain text
pub fn to_text(markup: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut counters: Vec<usize> = Vec::new();

    for line in prepare(markup).lines() {
        let line = line.trim_end();
        if let Some(caps) = HEADING_RE.captures(line) {
            counters.clear();
            if lines.last().is_some_and(|l| !l.is_empty()) {
                lines.push(String::new());
            }
            lines.push(inline_text(&caps[2]));
        } else if line.starts_with(LIST_MARKERS) {
            let prefix = list_prefix(line);
            let depth = prefix.chars().count();
            let body = inline_text(line[prefix.len()..].trim());
            if body.is_empty() {
                continue;
            }
            counters.resize(depth, 0);
            let indent = "  ".repeat(depth.saturating_sub(1));
            let bullet = match prefix.chars().last() {
                Some('#') => {
                    counters[depth - 1] += 1;
                    format!("{}. ", counters[depth - 1])
                }
                Some('*') => "* ".to_string(),
                _ => "  ".to_string(),
            };
            lines.push(format!("{}{}{}", indent, bullet, body));
        } else if line.starts_with("----") {
            counters.clear();
        } else {
            counters.clear();
            let text = inline_text(line.trim());
            if text.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
                continue;
            }
            lines.push(text);
        }
    }

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "{{also|Word}}\n==English==\n<!-- hidden -->\n===Noun===\n'''word''' (''plural'' [[words]])\n# A unit of [[language#English|language]].\n# A [[promise]].\n#* Example with [http://example.org link].\n\n[[Category:Nouns]]\n[[pl:word]]";

    #[test]
    fn test_templates_are_dropped_with_nesting() {
        assert_eq!(prepare("a {{outer|{{inner}}}} b"), "a  b");
        assert_eq!(prepare("keep }} this"), "keep }} this");
    }

    #[test]
    fn test_to_text() {
        let text = to_text(ARTICLE);
        assert!(text.starts_with("English"));
        assert!(text.contains("word (plural words)"));
        assert!(text.contains("1. A unit of language."));
        assert!(text.contains("2. A promise."));
        assert!(text.contains("Example with link."));
        assert!(!text.contains("Category"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("pl:"));
    }

    #[test]
    fn test_to_html() {
        let html = to_html(ARTICLE, "?q=", "en");
        assert!(html.starts_with("<div class=\"wiki\" lang=\"en\">"));
        assert!(html.contains("<h2>English</h2>"));
        assert!(html.contains("<h3>Noun</h3>"));
        assert!(html.contains("<b>word</b>"));
        assert!(html.contains("<i>plural</i>"));
        assert!(html.contains("<a href=\"?q=words\">words</a>"));
        assert!(html.contains("<a href=\"?q=language\">language</a>"));
        assert!(html.contains("<ol>"));
        assert!(html.contains("<a href=\"http://example.org\">link</a>"));
        assert!(!html.contains("Category"));
    }

    #[test]
    fn test_to_html_escapes_raw_markup() {
        let html = to_html("<script>alert(1)</script> [[a b]]", "?q=", "en");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("<a href=\"?q=a%20b\">a b</a>"));
    }

    #[test]
    fn test_external_link_cannot_break_out_of_href() {
        let html = to_html("[http://x.example/\"onmouseover=\"alert(1) click]", "?q=", "en");
        assert!(!html.contains("\"onmouseover"));
        assert!(html.contains(
            "<a href=\"http://x.example/&quot;onmouseover=&quot;alert(1)\">click</a>"
        ));

        let query = to_html("[http://a.example/?x=1&y=2 both]", "?q=", "en");
        assert!(query.contains("<a href=\"http://a.example/?x=1&amp;y=2\">both</a>"));
    }
}
