//! Page-range parsing for submission parameters.
//!
//! Syntax: comma-separated tokens, each a single page number or an inclusive
//! `start-end` range. The result is the sorted, deduplicated union of every
//! referenced page.

use crate::{Error, Result};
use std::collections::BTreeSet;

/// Parse a page-range expression such as `"1-3,5"` into `[1, 2, 3, 5]`.
///
/// Duplicates collapse and the output is always sorted: `"2,2,1"` → `[1, 2]`.
pub fn parse_page_ranges(spec: &str) -> Result<Vec<u32>> {
    let mut pages = BTreeSet::new();

    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidInput(format!("empty page token in {spec:?}")));
        }

        match token.split_once('-') {
            Some((start, end)) => {
                let start: u32 = parse_page(start, spec)?;
                let end: u32 = parse_page(end, spec)?;
                if start > end {
                    return Err(Error::InvalidInput(format!(
                        "descending page range {token:?} in {spec:?}"
                    )));
                }
                pages.extend(start..=end);
            }
            None => {
                pages.insert(parse_page(token, spec)?);
            }
        }
    }

    Ok(pages.into_iter().collect())
}

fn parse_page(token: &str, spec: &str) -> Result<u32> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad page number {token:?} in {spec:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_singles() {
        assert_eq!(parse_page_ranges("1-3,5").unwrap(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn sorts_and_deduplicates() {
        assert_eq!(parse_page_ranges("2,2,1").unwrap(), vec![1, 2]);
        assert_eq!(parse_page_ranges("3,1-4").unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn single_page() {
        assert_eq!(parse_page_ranges("7").unwrap(), vec![7]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_page_ranges("").is_err());
        assert!(parse_page_ranges("a-b").is_err());
        assert!(parse_page_ranges("3-1").is_err());
        assert!(parse_page_ranges("1,,2").is_err());
    }
}
