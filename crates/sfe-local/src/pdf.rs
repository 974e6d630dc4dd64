//! PDF_PARSER extraction strategy.
//!
//! Downloads the PDF to a temporary file (bounding memory and giving the caller a path to
//! inspect on failure), extracts text, applies the page/token budget, and reports best-effort
//! metadata.

use std::io::Write;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use sfe_core::{Error, Result};

pub const DEFAULT_MAX_PAGES: usize = 100;
const MIN_USABLE_CHARS: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub page_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PdfExtraction {
    pub text: String,
    pub metadata: PdfMetadata,
    pub elapsed_ms: u128,
}

/// Extract text from in-memory PDF bytes.
///
/// `pdf-extract` has had panics on malformed PDFs; a panic hook wraps the call so one bad
/// document can't take down a batch of concurrent extractions.
pub fn pdf_to_text(bytes: &[u8]) -> std::result::Result<String, String> {
    use std::cell::Cell;
    use std::sync::OnceLock;

    thread_local! {
        static SUPPRESS_PDF_PANIC_HOOK: Cell<bool> = const { Cell::new(false) };
    }
    static HOOK_INSTALLED: OnceLock<()> = OnceLock::new();
    HOOK_INSTALLED.get_or_init(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let suppressed = SUPPRESS_PDF_PANIC_HOOK.with(|c| c.get());
            if suppressed {
                return;
            }
            prev(info);
        }));
    });

    struct SuppressGuard;
    impl Drop for SuppressGuard {
        fn drop(&mut self) {
            SUPPRESS_PDF_PANIC_HOOK.with(|c| c.set(false));
        }
    }

    let r = std::panic::catch_unwind(|| {
        SUPPRESS_PDF_PANIC_HOOK.with(|c| c.set(true));
        let _g = SuppressGuard;

        #[cfg(test)]
        {
            if bytes.starts_with(b"SFE_TEST_PDF_EXTRACT_PANIC") {
                panic!("simulated pdf-extract panic");
            }
        }
        pdf_extract::extract_text_from_mem(bytes)
    });
    match r {
        Ok(inner) => inner.map_err(|e| e.to_string()),
        Err(_) => Err("pdf_extract_panicked".to_string()),
    }
}

fn truncate_to_pages(text: &str, max_pages: usize) -> String {
    // pdf-extract joins pages with form-feed (`\x0c`); cap on that boundary when present.
    let pages: Vec<&str> = text.split('\x0c').collect();
    if pages.len() <= max_pages {
        return text.to_string();
    }
    pages[..max_pages].join("\x0c")
}

fn extract_best_effort_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| l.len() >= 4 && l.len() <= 200)
        .map(str::to_string)
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let send_fut = client.get(url).timeout(timeout).send();
    let resp = tokio::select! {
        r = send_fut => r.map_err(|e| Error::Network(e.to_string()))?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };
    if !resp.status().is_success() {
        return Err(Error::Http(format!("pdf fetch HTTP {}", resp.status())));
    }
    let bytes_fut = resp.bytes();
    let bytes = tokio::select! {
        b = bytes_fut => b.map_err(|e| Error::Network(e.to_string()))?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };
    Ok(bytes.to_vec())
}

fn estimate_tokens(s: &str) -> usize {
    s.chars().count() / 4
}

/// Scan backward from `cut` (exclusive) to `window_start`, returning the index right after the
/// nearest paragraph break (`"\n\n"`) or sentence-ending punctuation followed by whitespace —
/// whichever is closer to `cut`.
fn find_boundary(chars: &[char], window_start: usize, cut: usize) -> Option<usize> {
    let mut i = cut;
    while i > window_start {
        i -= 1;
        let c = chars[i];
        if c == '\n' && i > 0 && chars[i - 1] == '\n' {
            return Some(i + 1);
        }
        if matches!(c, '.' | '!' | '?') {
            let followed_by_space = chars.get(i + 1).map(|n| n.is_whitespace()).unwrap_or(true);
            if followed_by_space {
                return Some(i + 1);
            }
        }
    }
    None
}

/// PDF_PARSER's token-cap algorithm: binary-search the largest prefix whose estimated token
/// count (best-effort char/4 approximation) fits `max_tokens` — reserving room for the trailing
/// `[content truncated]` marker — then back up to the nearest sentence/paragraph boundary within
/// the last 20% of that prefix, so the cut doesn't land mid-sentence. Distinct from the generic
/// blind-cut truncation `content_extractor::post_process` applies to the other strategies.
pub fn truncate_to_token_cap(text: &str, max_tokens: usize) -> (String, bool) {
    if estimate_tokens(text) <= max_tokens {
        return (text.to_string(), false);
    }

    let marker = crate::content_extractor::TRUNCATION_MARKER;
    let reserve_tokens = estimate_tokens(marker) + 1;
    let effective_cap = max_tokens.saturating_sub(reserve_tokens);

    let chars: Vec<char> = text.chars().collect();
    let (mut lo, mut hi) = (0usize, chars.len());
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let prefix_tokens = estimate_tokens(&chars[..mid].iter().collect::<String>());
        if prefix_tokens <= effective_cap {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let cut = lo;

    let window_start = cut.saturating_sub(cut / 5);
    let final_cut = find_boundary(&chars, window_start, cut).unwrap_or(cut);

    let mut out: String = chars[..final_cut].iter().collect();
    out.push(' ');
    out.push_str(marker);
    (out, true)
}

/// Fetch and parse a PDF at `url`, applying the page budget. Token-cap truncation is applied by
/// the caller (`content_extractor::try_pdf_parser`, via [`truncate_to_token_cap`]) since it needs
/// `ExtractOptions`, which this module doesn't otherwise depend on.
pub async fn fetch_and_extract(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_pages: usize,
    cancel: &CancellationToken,
) -> Result<PdfExtraction> {
    let t0 = Instant::now();
    let bytes = download(client, url, timeout, cancel).await?;

    // Spill to a temp file so a future shellout/OCR fallback has a path to hand off, even
    // though the primary path extracts straight from memory.
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Error::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(&bytes)
        .map_err(|e| Error::Internal(format!("tempfile write: {e}")))?;

    let text = pdf_to_text(&bytes).map_err(|e| {
        Error::Decode(format!("pdf extraction failed: {e}"))
    })?;

    if text.trim().chars().count() < MIN_USABLE_CHARS {
        return Err(Error::Decode(
            "pdf extraction yielded insufficient text".to_string(),
        ));
    }

    let page_count = text.split('\x0c').count();
    let text = truncate_to_pages(&text, max_pages);
    let title = extract_best_effort_title(&text);

    Ok(PdfExtraction {
        text,
        metadata: PdfMetadata {
            title,
            author: None,
            date: None,
            page_count: Some(page_count),
        },
        elapsed_ms: t0.elapsed().as_millis(),
    })
}
