//! HTML for the index page and the OpenSearch descriptor.

use crate::config::SiteSettings;
use crate::core::HtmlOptions;
use crate::models::{Definition, DisplayFormat, LookupResult, MatchResult};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write as _;

/// Select boxes of the search form; absent ones are not shown
#[derive(Debug, Clone, Default)]
pub struct Selects {
    pub sv: Option<HtmlOptions>,
    pub db: Option<HtmlOptions>,
    pub st: Option<HtmlOptions>,
}

/// Everything the index page shows
#[derive(Debug, Clone)]
pub struct IndexPage<'a> {
    pub site: &'a SiteSettings,
    pub title: Option<String>,
    pub robots: &'static str,
    pub q: &'a str,
    pub selects: Selects,
    pub result: Option<&'a LookupResult>,
    /// Last match list of the session, shown beside definitions
    pub mtc: Option<&'a MatchResult>,
    pub markup_style: &'a str,
}

impl<'a> IndexPage<'a> {
    /// Page with the form only
    pub fn fallback(site: &'a SiteSettings, selects: Selects) -> Self {
        Self {
            site,
            title: None,
            robots: "index",
            q: "",
            selects,
            result: None,
            mtc: None,
            markup_style: "default",
        }
    }

    pub fn render(&self) -> String {
        let mut html = String::with_capacity(4096);
        let media = attr(&self.site.media_url);

        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
             <meta name=\"robots\" content=\"{robots}\"/>\n\
             <title>{title}{site}</title>\n\
             <link rel=\"stylesheet\" href=\"{media}dicoweb.css\" type=\"text/css\"/>\n\
             <link rel=\"search\" type=\"application/opensearchdescription+xml\" href=\"opensearch.xml\" title=\"{site_attr}\"/>\n\
             </head>\n<body class=\"markup-{markup}\">\n",
            robots = self.robots,
            title = text(self.title.as_deref().unwrap_or("")),
            site = text(&self.site.title),
            media = media,
            site_attr = attr(&self.site.title),
            markup = attr(self.markup_style),
        );

        self.render_form(&mut html);

        if let Some(mtc) = self.mtc {
            html.push_str("<div id=\"matches\">\n");
            render_matches(&mut html, mtc);
            html.push_str("</div>\n");
        }

        if let Some(result) = self.result {
            html.push_str("<div id=\"result\">\n");
            match result {
                LookupResult::Define(define) => {
                    for df in &define.definitions {
                        render_definition(&mut html, df);
                    }
                }
                // shown in the match column already
                LookupResult::Match(_) if self.mtc.is_some() => {}
                LookupResult::Match(m) => render_matches(&mut html, m),
                LookupResult::Info(info) => {
                    let _ = write!(
                        html,
                        "<h2>{}</h2>\n<pre class=\"info\">{}</pre>\n",
                        text(&info.db),
                        text(&info.desc)
                    );
                }
                LookupResult::Error(err) => {
                    let _ = write!(
                        html,
                        "<p class=\"error\">{}</p>\n",
                        text(&err.msg)
                    );
                }
            }
            html.push_str("</div>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    fn render_form(&self, html: &mut String) {
        let _ = write!(
            html,
            "<form id=\"search\" method=\"get\" action=\"\">\n\
             <input type=\"text\" name=\"q\" value=\"{}\" size=\"30\"/>\n",
            attr(self.q)
        );
        if let Some(db) = &self.selects.db {
            let _ = write!(html, "<select name=\"db\">\n{}\n</select>\n", db.html());
        }
        if let Some(st) = &self.selects.st {
            let _ = write!(html, "<select name=\"strategy\">\n{}\n</select>\n", st.html());
        }
        if let Some(sv) = &self.selects.sv {
            let _ = write!(html, "<select name=\"server\">\n{}\n</select>\n", sv.html());
        }
        html.push_str(
            "<input type=\"submit\" name=\"define\" value=\"Define\"/>\n\
             <input type=\"submit\" name=\"search\" value=\"Search\"/>\n</form>\n",
        );
    }
}

fn render_definition(html: &mut String, df: &Definition) {
    let _ = write!(
        html,
        "<div class=\"definition\">\n<h3 title=\"{}\">{}</h3>\n",
        attr(&df.db),
        text(&df.db_fullname)
    );
    match df.display {
        DisplayFormat::Html => {
            html.push_str(&df.desc);
            html.push('\n');
        }
        DisplayFormat::Marked => {
            let _ = write!(html, "<pre>{}</pre>\n", df.desc);
        }
        DisplayFormat::Text => {
            let _ = write!(html, "<pre>{}</pre>\n", text(&df.desc));
        }
    }
    html.push_str("</div>\n");
}

fn render_matches(html: &mut String, mtc: &MatchResult) {
    for group in &mtc.matches {
        let name = group.db_fullname.as_deref().unwrap_or(&group.db);
        let _ = write!(
            html,
            "<h3 title=\"{}\">{}</h3>\n<ul>\n",
            attr(&group.db),
            text(name)
        );
        for word in &group.words {
            let href = format!(
                "?q={}&db={}&define=1",
                urlencoding::encode(word),
                urlencoding::encode(&group.db)
            );
            let _ = write!(
                html,
                "<li><a href=\"{}\">{}</a></li>\n",
                attr(&href),
                text(word)
            );
        }
        html.push_str("</ul>\n");
    }
}

/// OpenSearch description document
pub fn opensearch_xml(site: &SiteSettings, url_query: &str, url_media: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <OpenSearchDescription xmlns=\"http://a9.com/-/spec/opensearch/1.1/\">\n\
         <ShortName>{title}</ShortName>\n\
         <Description>{title} dictionary search</Description>\n\
         <InputEncoding>UTF-8</InputEncoding>\n\
         <Image width=\"16\" height=\"16\" type=\"image/x-icon\">{media}favicon.ico</Image>\n\
         <Url type=\"text/html\" method=\"get\" template=\"{query}?q={{searchTerms}}\"/>\n\
         </OpenSearchDescription>\n",
        title = text(&site.title),
        media = text(url_media),
        query = attr(url_query),
    )
}
