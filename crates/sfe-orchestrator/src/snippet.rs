/// The canonical textual form substituted for page content whenever `is_serp_fallback` is
/// true. Deterministic so repeated calls with the same `SerpResult` are byte-identical.
pub fn format_snippet_view(title: &str, snippet: &str, url: &str) -> String {
    format!("{title}\n\n{snippet}\n\n{url}")
}
