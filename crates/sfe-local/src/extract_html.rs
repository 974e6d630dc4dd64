//! HTML_STRUCTURAL primitives: HTML → readable plain text.
//!
//! This is intentionally "good enough" and deterministic, not a full readability engine.
//! Callers apply their own output bounds.

use std::io::Cursor;

fn strip_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open_pat = format!("<{tag}");
    let close_pat = format!("</{tag}");
    let mut out = String::with_capacity(html.len());
    let mut i = 0usize;
    while i < html.len() {
        let Some(start_rel) = lower[i..].find(&open_pat) else {
            out.push_str(&html[i..]);
            break;
        };
        let start = i + start_rel;
        out.push_str(&html[i..start]);

        let Some(close_rel) = lower[start..].find(&close_pat) else {
            break;
        };
        let close_start = start + close_rel;
        let Some(gt_rel) = lower[close_start..].find('>') else {
            break;
        };
        i = close_start + gt_rel + 1;
    }
    out
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Collapse whitespace runs to a single space and runs of 3+ newlines to two, per spec.
pub fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut newline_run = 0usize;
    let mut pending_space = false;
    for ch in s.chars() {
        if ch == '\n' {
            newline_run += 1;
            pending_space = false;
            continue;
        }
        if newline_run > 0 {
            let n = newline_run.min(2);
            for _ in 0..n {
                out.push('\n');
            }
            newline_run = 0;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    if newline_run > 0 {
        for _ in 0..newline_run.min(2) {
            out.push('\n');
        }
    }
    out.trim().to_string()
}

pub fn html_to_text(html: &str, width: usize) -> String {
    let s = strip_block(html, "script");
    let s = strip_block(&s, "style");

    let out = html2text::from_read(Cursor::new(s.as_bytes()), width).unwrap_or(s);
    let out = normalize_whitespace(&out);
    if !has_any_text(&out) {
        String::new()
    } else {
        out
    }
}

/// Try to pull a `<title>` for extraction metadata; best-effort, never panics.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = html_scraper::Html::parse_document(html);
    let sel = html_scraper::Selector::parse("title").ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize_whitespace("a   b\tc"), "a b c");
    }

    #[test]
    fn caps_blank_lines_at_two() {
        assert_eq!(normalize_whitespace("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn strips_script_and_style_blocks() {
        let html = "<html><head><style>.x{color:red}</style></head><body><script>evil()</script><p>Hello world</p></body></html>";
        let text = html_to_text(html, 80);
        assert!(text.contains("Hello world"));
        assert!(!text.contains("evil"));
        assert!(!text.contains("color:red"));
    }

    #[test]
    fn empty_body_yields_empty_text() {
        let html = "<html><body>   \n\n </body></html>";
        assert_eq!(html_to_text(html, 80), "");
    }

    #[test]
    fn extracts_title() {
        let html = "<html><head><title>  Example Page </title></head><body></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Example Page"));
    }
}
