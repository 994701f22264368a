use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use similar::{Algorithm, DiffOp, capture_diff_slices};
use url::Url;

/// Containers matched by class/id must carry this much text to count as
/// main content.
const MIN_CONTAINER_TEXT_CHARS: usize = 100;

const LANDMARK_SELECTORS: &[&str] = &["main", "article", "[role=\"main\"]"];
const CONTAINER_SELECTORS: &[&str] = &[
    ".content",
    "#content",
    "#main",
    ".main-content",
    "#primary",
    ".post-content",
    ".page-content",
];

const NOISE_TAGS: &[&str] = &[
    "script", "style", "iframe", "noscript", "nav", "header", "footer",
];
const NOISE_ROLES: &[&str] = &["navigation", "banner", "contentinfo", "complementary"];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const EMPTY_PLACEHOLDER: &str = "<p>No content available for comparison.</p>";

/// Loaded after the site's own stylesheets so diff markers always win over
/// conflicting original styles.
const DIFF_STYLES: &str = "\
ins { background-color: #d4f7d4; color: #1a4d1a; text-decoration: none; }\n\
del { background-color: #fbd4d4; color: #6b1a1a; text-decoration: line-through; }\n\
ins img, del img { outline: 3px solid currentColor; }\n";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Stylesheet {
    External { href: String },
    Inline { css: String },
}

/// Inline merged-HTML diff of two scans' main content.
///
/// `additions`/`deletions` count `<ins>`/`<del>` elements, not characters;
/// a single-sided diff reports exactly one block regardless of fragment
/// size, so the counts are a coarse badge, not a magnitude.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralDiff {
    pub merged_html: String,
    pub additions: usize,
    pub deletions: usize,
    pub stylesheets: Vec<Stylesheet>,
    /// Standalone HTML page embedding `merged_html` for visual rendering.
    pub document: String,
}

/// Produces the visual diff between two raw HTML documents.
///
/// Stylesheets are taken from the current document only, since the merged
/// fragment is re-rendered under the current site's styling.
pub fn structural_diff(
    prev_html: Option<&str>,
    curr_html: Option<&str>,
    base_url: Option<&Url>,
) -> StructuralDiff {
    let stylesheets = curr_html
        .map(|html| extract_stylesheets(html, base_url))
        .unwrap_or_default();

    let prev_fragment = prev_html
        .map(|html| extract_main_content(html, base_url))
        .filter(|fragment| !fragment.is_empty());
    let curr_fragment = curr_html
        .map(|html| extract_main_content(html, base_url))
        .filter(|fragment| !fragment.is_empty());

    let (merged_html, additions, deletions) = match (prev_fragment, curr_fragment) {
        (None, None) => (EMPTY_PLACEHOLDER.to_owned(), 0, 0),
        // One-block convention: a missing side counts as exactly one
        // addition or deletion.
        (None, Some(curr)) => (format!("<ins>{curr}</ins>"), 1, 0),
        (Some(prev), None) => (format!("<del>{prev}</del>"), 0, 1),
        (Some(prev), Some(curr)) => merge_fragments(&prev, &curr),
    };

    let document = render_document(&merged_html, &stylesheets);

    StructuralDiff {
        merged_html,
        additions,
        deletions,
        stylesheets,
        document,
    }
}

/// External stylesheet links (resolved against the base URL) and inline
/// style blocks, in document order.
pub fn extract_stylesheets(html: &str, base_url: Option<&Url>) -> Vec<Stylesheet> {
    let document = Html::parse_document(html);
    let link_selector =
        Selector::parse("link[rel=\"stylesheet\"]").expect("stylesheet link selector");
    let style_selector = Selector::parse("style").expect("style selector");

    let mut sheets = Vec::new();

    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let resolved = resolve_url(href, base_url);
        if !resolved.is_empty() {
            sheets.push(Stylesheet::External { href: resolved });
        }
    }

    for style in document.select(&style_selector) {
        let css = style.text().collect::<String>();
        if !css.trim().is_empty() {
            sheets.push(Stylesheet::Inline { css });
        }
    }

    sheets
}

/// Serializes the document's main content with noise removed and relative
/// image/CSS references rewritten to absolute URLs.
fn extract_main_content(html: &str, base_url: Option<&Url>) -> String {
    let document = Html::parse_document(html);

    let mut out = String::new();
    match select_content_root(&document) {
        Some(root) => serialize_clean(&root, &mut out),
        None => {
            let body_selector = Selector::parse("body").expect("body selector");
            if let Some(body) = document.select(&body_selector).next() {
                serialize_children(&body, &mut out);
            }
        }
    }

    let out = rewrite_src_attributes(&out, base_url);
    let out = rewrite_css_urls(&out, base_url);
    out.trim().to_owned()
}

/// Priority search: semantic landmarks first, then common content
/// containers (which must carry real text), then the whole body.
fn select_content_root(document: &Html) -> Option<ElementRef<'_>> {
    for raw in LANDMARK_SELECTORS {
        let selector = Selector::parse(raw).expect("landmark selector");
        if let Some(element) = document.select(&selector).next() {
            return Some(element);
        }
    }

    for raw in CONTAINER_SELECTORS {
        let selector = Selector::parse(raw).expect("container selector");
        if let Some(element) = document.select(&selector).next() {
            let text_chars: usize = element.text().map(|t| t.chars().count()).sum();
            if text_chars > MIN_CONTAINER_TEXT_CHARS {
                return Some(element);
            }
        }
    }

    None
}

fn is_noise_element(element: &scraper::node::Element) -> bool {
    if NOISE_TAGS.contains(&element.name()) {
        return true;
    }
    element
        .attr("role")
        .is_some_and(|role| NOISE_ROLES.contains(&role.to_ascii_lowercase().as_str()))
}

fn serialize_clean(element: &ElementRef<'_>, out: &mut String) {
    if is_noise_element(element.value()) {
        return;
    }

    let name = element.value().name();
    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        push_escaped(value, true, out);
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }

    serialize_children(element, out);

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn serialize_children(element: &ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_escaped(text, false, out),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    serialize_clean(&child_element, out);
                }
            }
            // Comments, doctypes and processing instructions carry no
            // content.
            _ => {}
        }
    }
}

fn push_escaped(text: &str, in_attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn resolve_url(value: &str, base_url: Option<&Url>) -> String {
    let trimmed = value.trim();
    if !is_relative_reference(trimmed) {
        return trimmed.to_owned();
    }
    match base_url {
        Some(base) => base
            .join(trimmed)
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| trimmed.to_owned()),
        None => trimmed.to_owned(),
    }
}

fn is_relative_reference(value: &str) -> bool {
    !(value.is_empty()
        || value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("//")
        || value.starts_with("data:")
        || value.starts_with('#')
        || value.starts_with("mailto:"))
}

/// Rewrites relative `src="..."` attribute values in serialized HTML.
fn rewrite_src_attributes(html: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return html.to_owned();
    };

    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find("src=\"") {
        let value_start = pos + "src=\"".len();
        let Some(value_len) = rest[value_start..].find('"') else {
            break;
        };
        let value = &rest[value_start..value_start + value_len];
        out.push_str(&rest[..value_start]);
        out.push_str(&resolve_url(value, Some(base)));
        rest = &rest[value_start + value_len..];
    }
    out.push_str(rest);
    out
}

/// Rewrites relative `url(...)` references inside inline CSS.
fn rewrite_css_urls(html: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return html.to_owned();
    };

    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find("url(") {
        let value_start = pos + "url(".len();
        let Some(value_len) = rest[value_start..].find(')') else {
            break;
        };
        let raw = &rest[value_start..value_start + value_len];
        let unquoted = raw.trim().trim_matches(|c| c == '\'' || c == '"');

        out.push_str(&rest[..value_start]);
        out.push_str(&resolve_url(unquoted, Some(base)));
        rest = &rest[value_start + value_len..];
    }
    out.push_str(rest);
    out
}

/// Token-level merge of two serialized fragments. Changed word runs are
/// wrapped in `<ins>`/`<del>`; tags inside changed runs are emitted
/// unwrapped so the markup stays well-formed.
fn merge_fragments(prev: &str, curr: &str) -> (String, usize, usize) {
    let prev_tokens = tokenize(prev);
    let curr_tokens = tokenize(curr);

    let ops = capture_diff_slices(Algorithm::Myers, &prev_tokens, &curr_tokens);

    let mut out = String::with_capacity(curr.len());
    let mut additions = 0usize;
    let mut deletions = 0usize;

    for op in ops {
        match op {
            DiffOp::Equal {
                new_index, len, ..
            } => {
                for token in &curr_tokens[new_index..new_index + len] {
                    out.push_str(token);
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                emit_changed_run(
                    &prev_tokens[old_index..old_index + old_len],
                    "del",
                    &mut out,
                    &mut deletions,
                );
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                emit_changed_run(
                    &curr_tokens[new_index..new_index + new_len],
                    "ins",
                    &mut out,
                    &mut additions,
                );
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                emit_changed_run(
                    &prev_tokens[old_index..old_index + old_len],
                    "del",
                    &mut out,
                    &mut deletions,
                );
                emit_changed_run(
                    &curr_tokens[new_index..new_index + new_len],
                    "ins",
                    &mut out,
                    &mut additions,
                );
            }
        }
    }

    (out, additions, deletions)
}

fn emit_changed_run(tokens: &[String], tag: &str, out: &mut String, count: &mut usize) {
    let mut buffered = String::new();

    for token in tokens {
        if token.starts_with('<') {
            flush_wrapped(&mut buffered, tag, out, count);
            out.push_str(token);
        } else {
            buffered.push_str(token);
        }
    }
    flush_wrapped(&mut buffered, tag, out, count);
}

fn flush_wrapped(buffered: &mut String, tag: &str, out: &mut String, count: &mut usize) {
    if buffered.is_empty() {
        return;
    }
    let text = std::mem::take(buffered);
    if text.trim().is_empty() {
        out.push_str(&text);
        return;
    }
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    *count += 1;
}

/// Splits serialized HTML into tag, whitespace and word tokens.
fn tokenize(html: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = html;

    while !rest.is_empty() {
        let token_len = if rest.starts_with('<') {
            match rest.find('>') {
                Some(end) => end + 1,
                None => rest.len(),
            }
        } else if rest.starts_with(char::is_whitespace) {
            rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len())
        } else {
            rest.find(|c: char| c.is_whitespace() || c == '<')
                .unwrap_or(rest.len())
        };

        tokens.push(rest[..token_len].to_owned());
        rest = &rest[token_len..];
    }

    tokens
}

/// Standalone page: site stylesheets first, diff highlight styles second.
fn render_document(merged_html: &str, stylesheets: &[Stylesheet]) -> String {
    let mut head = String::new();
    for sheet in stylesheets {
        match sheet {
            Stylesheet::External { href } => {
                head.push_str("  <link rel=\"stylesheet\" href=\"");
                push_escaped(href, true, &mut head);
                head.push_str("\">\n");
            }
            Stylesheet::Inline { css } => {
                head.push_str("  <style>\n");
                head.push_str(css);
                head.push_str("\n  </style>\n");
            }
        }
    }

    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{head}  <style>\n{DIFF_STYLES}  </style>\n</head>\n<body>\n<div class=\"content-diff\">\n{merged_html}\n</div>\n</body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><head><title>T</title></head><body>{body}</body></html>")
    }

    #[test]
    fn self_diff_has_no_changes() {
        let html = page("<main><h1>Title</h1><p>Some stable paragraph.</p></main>");
        let base = Url::parse("https://example.com/").unwrap();

        let diff = structural_diff(Some(&html), Some(&html), Some(&base));
        assert_eq!(diff.additions, 0);
        assert_eq!(diff.deletions, 0);
        assert!(!diff.merged_html.contains("<ins>"));
        assert!(!diff.merged_html.contains("<del>"));
    }

    #[test]
    fn missing_previous_wraps_whole_fragment_as_one_addition() {
        let html = page("<main><h1>Launch</h1><p>Many words in a long new fragment.</p></main>");

        let diff = structural_diff(None, Some(&html), None);
        assert_eq!(diff.additions, 1);
        assert_eq!(diff.deletions, 0);
        assert!(diff.merged_html.starts_with("<ins>"));
        assert!(diff.merged_html.ends_with("</ins>"));
    }

    #[test]
    fn missing_current_wraps_whole_fragment_as_one_deletion() {
        let html = page("<main><p>Gone now.</p></main>");

        let diff = structural_diff(Some(&html), None, None);
        assert_eq!(diff.additions, 0);
        assert_eq!(diff.deletions, 1);
        assert!(diff.merged_html.starts_with("<del>"));
    }

    #[test]
    fn both_missing_renders_placeholder() {
        let diff = structural_diff(None, None, None);
        assert_eq!(diff.additions, 0);
        assert_eq!(diff.deletions, 0);
        assert_eq!(diff.merged_html, EMPTY_PLACEHOLDER);
        assert!(diff.document.contains(EMPTY_PLACEHOLDER));
    }

    #[test]
    fn word_change_produces_ins_and_del() {
        let prev = page("<main><p>Our plans start at ten dollars.</p></main>");
        let curr = page("<main><p>Our plans start at twenty dollars.</p></main>");

        let diff = structural_diff(Some(&prev), Some(&curr), None);
        assert_eq!(diff.additions, 1);
        assert_eq!(diff.deletions, 1);
        assert!(diff.merged_html.contains("<del>ten</del>"));
        assert!(diff.merged_html.contains("<ins>twenty</ins>"));
        // Surrounding markup stays intact.
        assert!(diff.merged_html.contains("<p>"));
        assert!(diff.merged_html.contains("</p>"));
    }

    #[test]
    fn nav_and_script_noise_is_removed_before_diffing() {
        let prev = page(
            "<nav><a href=\"/old\">Old nav</a></nav><main><p>Stable copy.</p></main><script>a()</script>",
        );
        let curr = page(
            "<nav><a href=\"/new\">New nav</a></nav><main><p>Stable copy.</p></main><script>b()</script>",
        );

        let diff = structural_diff(Some(&prev), Some(&curr), None);
        assert_eq!(diff.additions, 0);
        assert_eq!(diff.deletions, 0);
    }

    #[test]
    fn landmark_roles_are_removed() {
        let html = page(
            "<main><div role=\"banner\">Banner</div><p>Content.</p><div role=\"contentinfo\">Footer</div></main>",
        );
        let diff = structural_diff(Some(&html), Some(&html), None);
        assert!(!diff.merged_html.contains("Banner"));
        assert!(!diff.merged_html.contains("Footer"));
        assert!(diff.merged_html.contains("Content."));
    }

    #[test]
    fn container_selector_requires_minimum_text() {
        let thin = page("<div class=\"content\">tiny</div><p>Elsewhere there is body text.</p>");
        let diff = structural_diff(Some(&thin), Some(&thin), None);
        // Falls through to body, so the outside paragraph is included.
        assert!(diff.merged_html.contains("Elsewhere"));

        let filler = "word ".repeat(40);
        let thick = page(&format!("<div class=\"content\"><p>{filler}</p></div><p>Outside.</p>"));
        let diff = structural_diff(Some(&thick), Some(&thick), None);
        assert!(!diff.merged_html.contains("Outside."));
    }

    #[test]
    fn stylesheets_come_from_current_document_only() {
        let prev = "<html><head><link rel=\"stylesheet\" href=\"/old.css\"></head><body><main><p>x</p></main></body></html>";
        let curr = "<html><head><link rel=\"stylesheet\" href=\"/site.css\"><style>p { color: red; }</style></head><body><main><p>x</p></main></body></html>";
        let base = Url::parse("https://example.com/page").unwrap();

        let diff = structural_diff(Some(prev), Some(curr), Some(&base));
        assert_eq!(
            diff.stylesheets,
            vec![
                Stylesheet::External {
                    href: "https://example.com/site.css".to_owned()
                },
                Stylesheet::Inline {
                    css: "p { color: red; }".to_owned()
                },
            ]
        );
    }

    #[test]
    fn relative_image_sources_are_rewritten() {
        let html = page("<main><p>Logo</p><img src=\"/images/logo.png\"></main>");
        let base = Url::parse("https://example.com/about").unwrap();

        let diff = structural_diff(Some(&html), Some(&html), Some(&base));
        assert!(
            diff.merged_html
                .contains("src=\"https://example.com/images/logo.png\"")
        );
    }

    #[test]
    fn absolute_and_data_sources_are_untouched() {
        let html = page(
            "<main><img src=\"https://cdn.example.net/a.png\"><img src=\"data:image/png;base64,AAAA\"><p>padding text</p></main>",
        );
        let base = Url::parse("https://example.com/").unwrap();

        let diff = structural_diff(Some(&html), Some(&html), Some(&base));
        assert!(
            diff.merged_html
                .contains("src=\"https://cdn.example.net/a.png\"")
        );
        assert!(
            diff.merged_html
                .contains("src=\"data:image/png;base64,AAAA\"")
        );
    }

    #[test]
    fn css_url_references_are_rewritten() {
        let html = page(
            "<main><div style=\"background: url('/bg/hero.jpg')\">Hero section text</div></main>",
        );
        let base = Url::parse("https://example.com/").unwrap();

        let diff = structural_diff(Some(&html), Some(&html), Some(&base));
        assert!(
            diff.merged_html
                .contains("url(https://example.com/bg/hero.jpg)")
        );
    }

    #[test]
    fn document_loads_diff_styles_after_site_styles() {
        let curr = "<html><head><link rel=\"stylesheet\" href=\"https://example.com/site.css\"></head><body><main><p>x</p></main></body></html>";
        let diff = structural_diff(None, Some(curr), None);

        let site_pos = diff.document.find("site.css").unwrap();
        let diff_pos = diff.document.find("ins { background-color").unwrap();
        assert!(site_pos < diff_pos);
    }

    #[test]
    fn structure_change_keeps_tags_unwrapped() {
        let prev = page("<main><p>Alpha beta.</p></main>");
        let curr = page("<main><p>Alpha beta.</p><h2>New section</h2></main>");

        let diff = structural_diff(Some(&prev), Some(&curr), None);
        assert_eq!(diff.deletions, 0);
        assert!(diff.additions >= 1);
        // The inserted heading tag itself must not appear inside <ins>.
        assert!(!diff.merged_html.contains("<ins><h2>"));
        assert!(diff.merged_html.contains("<h2><ins>New section</ins></h2>"));
    }
}
