use similar::TextDiff;

const CONTEXT_LINES: usize = 3;
const PREVIOUS_HEADER: &str = "Previous Version";
const CURRENT_HEADER: &str = "Current Version";

/// Unified diff of raw HTML with navigation/script/style/svg noise removed.
///
/// Returns `None` when either input is empty (a missing baseline is not a
/// diff) or when the inputs are equal after stripping.
pub fn diff_raw_html(prev_html: Option<&str>, curr_html: Option<&str>) -> Option<String> {
    let prev = prev_html?;
    let curr = curr_html?;
    if prev.is_empty() || curr.is_empty() {
        return None;
    }

    let prev_stripped = strip_noise(prev);
    let curr_stripped = strip_noise(curr);
    if prev_stripped == curr_stripped {
        return None;
    }

    let diff = TextDiff::from_lines(prev_stripped.as_str(), curr_stripped.as_str());
    Some(
        diff.unified_diff()
            .context_radius(CONTEXT_LINES)
            .header(PREVIOUS_HEADER, CURRENT_HEADER)
            .to_string(),
    )
}

/// Removes blocks that are pure noise for content comparison. Stripped
/// blocks leave a sentinel so surrounding line structure stays stable.
fn strip_noise(html: &str) -> String {
    let mut out = strip_block(html, "script", "<!-- script -->");
    out = strip_block(&out, "style", "<!-- style -->");
    out = strip_block(&out, "nav", "<!-- nav -->");
    out = strip_block(&out, "footer", "<!-- footer -->");
    strip_block(&out, "svg", "[svg]")
}

/// Replaces every `<tag ...>...</tag>` region with `marker`,
/// case-insensitively. An unterminated block strips to end of input.
fn strip_block(html: &str, tag: &str, marker: &str) -> String {
    // ASCII lowercasing preserves byte offsets, so the shadow string can be
    // searched while slicing the original.
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        let after_open = start + open.len();

        let is_tag_boundary = lower[after_open..]
            .chars()
            .next()
            .is_none_or(|c| c.is_whitespace() || c == '>' || c == '/');
        if !is_tag_boundary {
            out.push_str(&html[pos..after_open]);
            pos = after_open;
            continue;
        }

        out.push_str(&html[pos..start]);
        out.push_str(marker);

        match lower[after_open..].find(&close) {
            Some(close_rel) => {
                let close_start = after_open + close_rel;
                pos = match lower[close_start..].find('>') {
                    Some(gt) => close_start + gt + 1,
                    None => html.len(),
                };
            }
            None => {
                pos = html.len();
            }
        }
    }

    out.push_str(&html[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_no_patch() {
        let html = "<html><body><p>Hello</p></body></html>";
        assert_eq!(diff_raw_html(Some(html), Some(html)), None);
    }

    #[test]
    fn empty_inputs_produce_no_patch() {
        assert_eq!(diff_raw_html(None, Some("<p>x</p>")), None);
        assert_eq!(diff_raw_html(Some("<p>x</p>"), None), None);
        assert_eq!(diff_raw_html(Some(""), Some("<p>x</p>")), None);
        assert_eq!(diff_raw_html(Some("<p>x</p>"), Some("")), None);
    }

    #[test]
    fn changes_only_inside_stripped_regions_produce_no_patch() {
        let prev = "<html><script>var a = 1;</script><p>Same</p></html>";
        let curr = "<html><script>var a = 2;</script><p>Same</p></html>";
        assert_eq!(diff_raw_html(Some(prev), Some(curr)), None);

        let prev = "<html><nav><a href=\"/\">Home</a></nav><p>Same</p></html>";
        let curr = "<html><nav><a href=\"/\">Start</a></nav><p>Same</p></html>";
        assert_eq!(diff_raw_html(Some(prev), Some(curr)), None);
    }

    #[test]
    fn svg_blocks_collapse_to_marker() {
        let prev = "<p>Logo</p>\n<svg viewBox=\"0 0 10 10\"><path d=\"M0 0\"/></svg>\n";
        let curr = "<p>Logo</p>\n<svg viewBox=\"0 0 10 10\"><path d=\"M5 5\"/></svg>\n";
        assert_eq!(diff_raw_html(Some(prev), Some(curr)), None);
    }

    #[test]
    fn real_change_yields_unified_diff_with_fixed_headers() {
        let prev = "<html>\n<h1>Old headline</h1>\n<p>Body</p>\n</html>\n";
        let curr = "<html>\n<h1>New headline</h1>\n<p>Body</p>\n</html>\n";

        let patch = diff_raw_html(Some(prev), Some(curr)).unwrap();
        assert!(patch.contains("--- Previous Version"));
        assert!(patch.contains("+++ Current Version"));
        assert!(patch.contains("-<h1>Old headline</h1>"));
        assert!(patch.contains("+<h1>New headline</h1>"));
    }

    #[test]
    fn unterminated_noise_block_strips_to_end() {
        let prev = "<p>Intro</p><script>var x = 1;";
        let curr = "<p>Intro</p><script>var x = 2;";
        assert_eq!(diff_raw_html(Some(prev), Some(curr)), None);
    }

    #[test]
    fn uppercase_tags_are_stripped_too() {
        let prev = "<P>Same</P><SCRIPT>old()</SCRIPT>";
        let curr = "<P>Same</P><SCRIPT>new()</SCRIPT>";
        assert_eq!(diff_raw_html(Some(prev), Some(curr)), None);
    }
}
