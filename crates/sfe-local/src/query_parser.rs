//! Splits `raw_query` into one or more parallel queries.
//!
//! Grammar (see spec grammar in the orchestrator crate docs):
//!   tagged := "<search>" query ("|" query)* "</search>"
//!   bare   := any text, interpreted as a single query
//!
//! A bare query containing `|` is NOT split (only `<search>...</search>` content is split
//! on pipes) — this keeps plain queries like "cats | dogs" literal unless explicitly tagged.

use sfe_core::{Error, ParsedQueries, Result};

const OPEN: &str = "<search>";
const CLOSE: &str = "</search>";

pub fn parse(raw_query: &str) -> Result<ParsedQueries> {
    let mut queries = Vec::new();
    let mut rest = raw_query;
    let mut any_tag = false;

    while let Some(open_rel) = rest.find(OPEN) {
        let after_open = &rest[open_rel + OPEN.len()..];
        let Some(close_rel) = after_open.find(CLOSE) else {
            break;
        };
        any_tag = true;
        let inner = &after_open[..close_rel];
        for q in inner.split('|') {
            let q = q.trim();
            if !q.is_empty() {
                queries.push(q.to_string());
            }
        }
        rest = &after_open[close_rel + CLOSE.len()..];
    }

    if !any_tag {
        let bare = raw_query.trim();
        if !bare.is_empty() {
            queries.push(bare.to_string());
        }
    }

    if queries.is_empty() {
        return Err(Error::InvalidRequest(
            "raw_query parsed to zero non-empty queries".to_string(),
        ));
    }

    Ok(ParsedQueries { queries })
}

/// Inverse of `parse`, used by idempotence tests: a single query round-trips as bare text,
/// two or more round-trip through the tagged/piped form.
pub fn format(queries: &[String]) -> String {
    if queries.len() == 1 {
        return queries[0].clone();
    }
    format!("{OPEN}{}{CLOSE}", queries.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_query_is_one_query() {
        let p = parse("Tesla stock price 2024").unwrap();
        assert_eq!(p.queries, vec!["Tesla stock price 2024"]);
        assert!(!p.is_parallel());
    }

    #[test]
    fn single_tagged_query() {
        let p = parse("<search>OpenAI GPT-4</search>").unwrap();
        assert_eq!(p.queries, vec!["OpenAI GPT-4"]);
    }

    #[test]
    fn tagged_pipe_splits_into_parallel_queries() {
        let p = parse("<search>Tesla|Apple|Microsoft</search>").unwrap();
        assert_eq!(p.queries, vec!["Tesla", "Apple", "Microsoft"]);
        assert!(p.is_parallel());
    }

    #[test]
    fn bare_pipe_is_not_split() {
        let p = parse("cats | dogs").unwrap();
        assert_eq!(p.queries, vec!["cats | dogs"]);
    }

    #[test]
    fn empty_segments_between_pipes_are_dropped() {
        let p = parse("<search>Tesla||Apple</search>").unwrap();
        assert_eq!(p.queries, vec!["Tesla", "Apple"]);
    }

    #[test]
    fn whitespace_only_query_is_invalid() {
        assert!(parse("   ").is_err());
        assert!(parse("<search>   </search>").is_err());
    }

    #[test]
    fn round_trips_through_format() {
        for queries in [
            vec!["Tesla".to_string()],
            vec!["Tesla".to_string(), "Apple".to_string(), "Microsoft".to_string()],
        ] {
            let formatted = format(&queries);
            let parsed = parse(&formatted).unwrap();
            assert_eq!(parsed.queries, queries);
        }
    }
}
