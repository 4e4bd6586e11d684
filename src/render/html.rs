// src/render/html.rs

//! Post-processing of mandoc HTML fragments

use crate::db::models::Heading;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

static XREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<(?P<open>b|i|strong|em|mark)>(?P<name>[A-Za-z0-9@._+\-:\[\]]+)</(?P<close>b|i|strong|em|mark)>\((?P<section>\d[a-z]{0,3})\)",
    )
    .unwrap()
});

static EMPTY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?P<open>[^ >]+)[^>]*>(?:\s|&nbsp;)*</(?P<close>[^ >]+)>\n?").unwrap()
});

static PRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pre>(?P<body>.+?)</pre>").unwrap());

static BR_AFTER_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<block></(?:pre|div)>)\n?<br/>").unwrap());

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<(?P<open>h[1-6])(?P<attrs>[^>]*)>[^<>]*<a class=["']permalink["'][^>]*>(?P<title>.+?)</a>[^<>]*</(?P<close>h[1-6])>"#,
    )
    .unwrap()
});

static H1_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<h1[^>]*>[^<>]*<a class=["']permalink["'] href=["']#(?P<id>[^"'\s]+)["']>(?P<title>.+?)</a>[^<>]*</h1>"#,
    )
    .unwrap()
});

/// Regions where URLs must not be linkified, plus any other tag
static OPAQUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pre\b.*?</pre>|<a\b.*?</a>|<[^>]*>").unwrap());

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']*[^\s<>"'.,;:)]"#).unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Run the full post-processing chain over a mandoc fragment
pub fn postprocess(html: &str, locale: &str) -> String {
    let html = link_cross_references(html, locale);
    let html = remove_empty_tags(&html);
    let html = dedent_pre_blocks(&html);
    let html = BR_AFTER_BLOCK_RE.replace_all(&html, "$block").into_owned();
    let html = linkify_urls(&html);
    rewrite_heading_ids(&html)
}

/// `<b>ls</b>(1)` becomes a link to `/man/ls.1.{locale}`
pub fn link_cross_references(html: &str, locale: &str) -> String {
    XREF_RE
        .replace_all(html, |caps: &Captures| {
            if caps["open"] != caps["close"] {
                return caps[0].to_string();
            }
            format!(
                "<a href='/man/{name}.{section}.{locale}'>{name}({section})</a>",
                name = &caps["name"],
                section = &caps["section"],
                locale = locale
            )
        })
        .into_owned()
}

pub fn remove_empty_tags(html: &str) -> String {
    EMPTY_TAG_RE
        .replace_all(html, |caps: &Captures| {
            if caps["open"] == caps["close"] {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Trim surrounding newlines and common indentation inside `<pre>`
pub fn dedent_pre_blocks(html: &str) -> String {
    PRE_RE
        .replace_all(html, |caps: &Captures| {
            format!("<pre>{}</pre>", dedent(caps["body"].trim_matches('\n')))
        })
        .into_owned()
}

/// Remove the longest common leading whitespace of all non-blank lines.
/// Whitespace-only lines become empty.
pub fn dedent(text: &str) -> String {
    let margin = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
            &line[..indent]
        })
        .reduce(|common, indent| {
            let shared = common
                .bytes()
                .zip(indent.bytes())
                .take_while(|(a, b)| a == b)
                .count();
            &common[..shared]
        })
        .unwrap_or("");

    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn bare URLs in text into links, leaving `<pre>`, `<a>` and tag
/// attributes alone
pub fn linkify_urls(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for m in OPAQUE_RE.find_iter(html) {
        out.push_str(&linkify_text(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&linkify_text(&html[last..]));
    out
}

fn linkify_text(text: &str) -> String {
    URL_RE
        .replace_all(text, |caps: &Captures| {
            format!("<a href=\"{url}\">{url}</a>", url = &caps[0])
        })
        .into_owned()
}

/// Wiki-style anchor ID: underscores and whitespace runs become single
/// underscores, leading colons dropped
pub fn anchorencode_id(title: &str) -> String {
    let spaced = title.replace('_', " ");
    let trimmed = spaced.trim().trim_start_matches(':');
    let mut id = String::with_capacity(trimmed.len());
    let mut prev_space = false;
    for c in trimmed.chars() {
        if c == ' ' {
            if !prev_space {
                id.push('_');
            }
            prev_space = true;
        } else {
            id.push(if c.is_whitespace() { '_' } else { c });
            prev_space = false;
        }
    }
    id
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Give every heading a readable, unique ID and a self-link
pub fn rewrite_heading_ids(html: &str) -> String {
    let mut ids: HashSet<String> = HashSet::new();

    HEADING_RE
        .replace_all(html, |caps: &Captures| {
            if caps["open"] != caps["close"] {
                return caps[0].to_string();
            }

            let tag = &caps["open"];
            let attrs = caps["attrs"]
                .split_whitespace()
                .filter(|a| !a.starts_with("id="))
                .collect::<Vec<_>>()
                .join(" ");
            let title = caps["title"].replace('\n', " ");

            let base = anchorencode_id(&title);
            let mut id = base.clone();
            let mut n = 2;
            while ids.contains(&id) {
                id = format!("{}_{}", base, n);
                n += 1;
            }
            ids.insert(id.clone());

            let id = escape_attribute(&id);
            let open = if attrs.is_empty() {
                format!("<{}", tag)
            } else {
                format!("<{} {}", tag, attrs)
            };
            format!(
                "{} id='{id}'><a class='permalink' href='#{id}'>{title}</a></{}>",
                open,
                tag,
                id = id,
                title = title
            )
        })
        .into_owned()
}

/// Decode the handful of entities mandoc and `escape_attribute` emit
fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Top-level section headings with their anchor IDs
pub fn extract_headings(html: &str) -> Vec<Heading> {
    H1_RE
        .captures_iter(html)
        .map(|caps| Heading {
            id: unescape_entities(&caps["id"]),
            title: unescape_entities(&WHITESPACE_RE.replace_all(&caps["title"], " ")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_references_become_links() {
        let html = "See <b>ls</b>(1) and <i>printf</i>(3p), not <b>x</b>(y).";
        assert_eq!(
            link_cross_references(html, "de"),
            "See <a href='/man/ls.1.de'>ls(1)</a> and <a href='/man/printf.3p.de'>printf(3p)</a>, not <b>x</b>(y)."
        );
    }

    #[test]
    fn test_mismatched_xref_tags_untouched() {
        let html = "<b>ls</i>(1)";
        assert_eq!(link_cross_references(html, "en"), html);
    }

    #[test]
    fn test_remove_empty_tags() {
        assert_eq!(remove_empty_tags("<p>a</p><b> </b>\n<i>&nbsp;</i>x"), "<p>a</p>x");
        assert_eq!(remove_empty_tags("<b> </i>"), "<b> </i>");
    }

    #[test]
    fn test_dedent_pre_blocks() {
        let html = "<pre>\n    one\n      two\n\n    three\n</pre>";
        assert_eq!(dedent_pre_blocks(html), "<pre>one\n  two\n\nthree</pre>");
    }

    #[test]
    fn test_dedent_mixed_indentation() {
        assert_eq!(dedent("\tfoo\n  bar"), "\tfoo\n  bar");
        assert_eq!(dedent("  foo\n  \n  bar"), "foo\n\nbar");
    }

    #[test]
    fn test_br_after_block_removed() {
        let html = postprocess("<div>x</div>\n<br/>y</pre><br/>", "en");
        assert_eq!(html, "<div>x</div>y</pre>");
    }

    #[test]
    fn test_linkify_skips_pre_and_anchors() {
        let html = "Visit https://example.org/docs. <a href=\"https://a.example\">https://a.example</a> <pre>https://pre.example</pre>";
        assert_eq!(
            linkify_urls(html),
            "Visit <a href=\"https://example.org/docs\">https://example.org/docs</a>. <a href=\"https://a.example\">https://a.example</a> <pre>https://pre.example</pre>"
        );
    }

    #[test]
    fn test_anchorencode_id() {
        assert_eq!(anchorencode_id("SEE ALSO"), "SEE_ALSO");
        assert_eq!(anchorencode_id("  :EXIT__STATUS "), "EXIT_STATUS");
        assert_eq!(anchorencode_id("a\tb"), "a_b");
    }

    #[test]
    fn test_heading_ids_are_deduplicated() {
        let html = "<h1 class=\"Sh\" id=\"x\"><a class=\"permalink\" href=\"#x\">OPTIONS</a></h1>\n\
                    <h1 class=\"Sh\" id=\"y\"><a class=\"permalink\" href=\"#y\">OPTIONS</a></h1>";
        let out = rewrite_heading_ids(html);
        assert_eq!(
            out,
            "<h1 class=\"Sh\" id='OPTIONS'><a class='permalink' href='#OPTIONS'>OPTIONS</a></h1>\n\
             <h1 class=\"Sh\" id='OPTIONS_2'><a class='permalink' href='#OPTIONS_2'>OPTIONS</a></h1>"
        );

        let headings = extract_headings(&out);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[1].id, "OPTIONS_2");
        assert_eq!(headings[1].title, "OPTIONS");
    }

    #[test]
    fn test_extract_headings_ignores_subsections() {
        let html = "<h1 id='NAME'><a class='permalink' href='#NAME'>NAME</a></h1>\
                    <h2 id='Sub'><a class='permalink' href='#Sub'>Sub</a></h2>\
                    <h1 id='SEE_ALSO'><a class='permalink' href='#SEE_ALSO'>SEE\n  ALSO</a></h1>";
        let headings = extract_headings(html);
        assert_eq!(
            headings,
            vec![
                Heading { id: "NAME".to_string(), title: "NAME".to_string() },
                Heading { id: "SEE_ALSO".to_string(), title: "SEE ALSO".to_string() },
            ]
        );
    }
}
