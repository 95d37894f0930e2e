//! Table of contents: heading extraction and hierarchical numbering.
//!
//! # Numbering
//!
//! Headings are numbered in document order by [`NumberingState`]:
//!
//! ```text
//! nominal level   h2    h3    h2    h4    h3    h2
//! effective depth  1     2     1     2     2     1
//! label           1.    1.1.  2.    2.1.  2.2.  3.
//! ```
//!
//! - The first heading's level becomes the top level (depth 1).
//! - Depth may only grow by one per step; skipped levels are clamped.
//! - Headings shallower than the first one clamp to depth 1.
//! - Visiting depth `D` resets every counter below `D` and increments `D`.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Deepest heading level HTML has.
pub const MAX_HEADING_LEVEL: usize = 6;

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h([1-6])\b([^>]*)>(.*?)</h[1-6]\s*>").expect("valid heading regex")
});

static ID_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|\s)id\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("valid id regex")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid entity regex")
});

/// A heading found in rendered HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingInfo {
    /// Nominal level, `1` for `<h1>`.
    pub level: u8,
    /// Anchor id, entity-decoded.
    pub id: String,
    /// Plain text, markup stripped and entities decoded.
    pub text: String,
}

/// A numbered TOC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Effective depth, `>= 1`.
    pub depth: usize,
    /// Label such as `"1.2."`.
    pub number: String,
    pub text: String,
    pub id: String,
}

/// Find headings with an id whose level is within `min_depth..=max_depth`.
///
/// Headings without an id cannot be linked and are skipped.
///
/// # Example
///
/// ```rust
/// use md2pdf::toc::extract_headings;
///
/// let html = r#"<h1 id="a">Intro &amp; <em>Scope</em></h1><h2>No id</h2><h4 id="b">Deep</h4>"#;
/// let headings = extract_headings(html, 1, 3);
///
/// assert_eq!(headings.len(), 1);
/// assert_eq!(headings[0].text, "Intro & Scope");
/// ```
pub fn extract_headings(html: &str, min_depth: u8, max_depth: u8) -> Vec<HeadingInfo> {
    HEADING
        .captures_iter(html)
        .filter_map(|caps| {
            let level: u8 = caps[1].parse().ok()?;
            if level < min_depth || level > max_depth {
                return None;
            }
            let id_caps = ID_ATTR.captures(&caps[2])?;
            let raw_id = id_caps
                .get(1)
                .or_else(|| id_caps.get(2))
                .or_else(|| id_caps.get(3))?
                .as_str();
            if raw_id.is_empty() {
                return None;
            }

            let stripped = TAG.replace_all(&caps[3], "");
            let text = decode_entities(&stripped)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");

            Some(HeadingInfo {
                level,
                id: decode_entities(raw_id).into_owned(),
                text,
            })
        })
        .collect()
}

/// Decode HTML character references.
///
/// Handles numeric references and the named entities that appear in
/// rendered Markdown. Unknown names are left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let decoded = if let Some(hex) = name
            .strip_prefix("#x")
            .or_else(|| name.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = name.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(name)
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "laquo" => '«',
        "raquo" => '»',
        "middot" => '·',
        "times" => '×',
        "deg" => '°',
        _ => return None,
    })
}

/// Hierarchical numbering state machine.
///
/// # Example
///
/// ```rust
/// use md2pdf::toc::NumberingState;
///
/// let mut state = NumberingState::new();
/// let depths: Vec<usize> = [2, 3, 2, 4].iter().map(|l| state.next(*l).0).collect();
/// assert_eq!(depths, vec![1, 2, 1, 2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NumberingState {
    counters: [u32; MAX_HEADING_LEVEL],
    top_level: Option<u8>,
    last_depth: usize,
}

impl NumberingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next heading at nominal `level`.
    ///
    /// Returns the effective depth and its label.
    pub fn next(&mut self, level: u8) -> (usize, String) {
        let top = *self.top_level.get_or_insert(level);

        let normalized = (i32::from(level) - i32::from(top) + 1).max(1) as usize;
        let depth = normalized
            .min(self.last_depth + 1)
            .clamp(1, MAX_HEADING_LEVEL);

        for counter in &mut self.counters[depth..] {
            *counter = 0;
        }
        self.counters[depth - 1] += 1;
        self.last_depth = depth;

        let label = self.counters[..depth]
            .iter()
            .map(|c| format!("{c}."))
            .collect::<String>();
        (depth, label)
    }
}

/// Number a list of headings.
pub fn number_headings(headings: &[HeadingInfo]) -> Vec<TocEntry> {
    let mut state = NumberingState::new();
    headings
        .iter()
        .map(|h| {
            let (depth, number) = state.next(h.level);
            TocEntry {
                depth,
                number,
                text: h.text.clone(),
                id: h.id.clone(),
            }
        })
        .collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn depths(levels: &[u8]) -> Vec<usize> {
        let mut state = NumberingState::new();
        levels.iter().map(|l| state.next(*l).0).collect()
    }

    fn labels(levels: &[u8]) -> Vec<String> {
        let mut state = NumberingState::new();
        levels.iter().map(|l| state.next(*l).1).collect()
    }

    /// Verifies normalization to the first heading and the 2→4 clamp.
    #[test]
    fn test_normalization_and_gap_clamp() {
        assert_eq!(depths(&[2, 3, 2, 4]), vec![1, 2, 1, 2]);
        assert_eq!(labels(&[2, 3, 2, 4]), vec!["1.", "1.1.", "2.", "2.1."]);
    }

    /// Verifies an h1 followed directly by an h3 only deepens by one.
    #[test]
    fn test_skipped_level() {
        assert_eq!(
            labels(&[1, 3, 3, 2, 3]),
            vec!["1.", "1.1.", "1.1.1.", "1.2.", "1.2.1."]
        );
    }

    /// Verifies deeper counters reset when a shallower heading appears.
    #[test]
    fn test_counter_reset() {
        assert_eq!(
            labels(&[1, 2, 3, 1, 2]),
            vec!["1.", "1.1.", "1.1.1.", "2.", "2.1."]
        );
    }

    /// Verifies headings above the first heading's level clamp to depth 1.
    #[test]
    fn test_shallower_than_top() {
        assert_eq!(depths(&[3, 1, 2]), vec![1, 1, 1]);
        assert_eq!(labels(&[3, 4, 1]), vec!["1.", "1.1.", "2."]);
    }

    /// Verifies the invariants over many irregular sequences.
    #[test]
    fn test_numbering_invariants() {
        let sequences: &[&[u8]] = &[
            &[1, 6, 6, 1, 5, 2],
            &[6, 1, 6, 3, 4, 5, 6, 6],
            &[2, 2, 5, 3, 1, 4],
            &[4, 4, 4],
            &[1, 2, 3, 4, 5, 6, 1, 6],
        ];
        for seq in sequences {
            let mut state = NumberingState::new();
            let mut previous = 0usize;
            for level in seq.iter() {
                let (depth, label) = state.next(*level);
                assert!(depth >= 1, "depth must be >= 1 for {seq:?}");
                assert!(
                    depth <= previous + 1,
                    "depth jumped from {previous} to {depth} in {seq:?}"
                );
                assert_eq!(label.matches('.').count(), depth);
                previous = depth;
            }
        }
    }

    /// Verifies extraction honors the depth window and the id requirement.
    #[test]
    fn test_extract_window() {
        let html = r#"
            <h1 id="title">Title</h1>
            <h2 id='s1'>Section</h2>
            <h3 id=s2>Sub</h3>
            <h4 id="deep">Too deep</h4>
            <h2>No anchor</h2>
        "#;
        let headings = extract_headings(html, 2, 3);
        let ids: Vec<&str> = headings.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(headings[0].level, 2);
    }

    /// Verifies markup is stripped and entities decoded exactly once.
    #[test]
    fn test_extract_decodes_text() {
        let html = r#"<h2 id="q">Use <code>&lt;b&gt;</code> &amp;amp; &#39;quotes&#39; &#x2014; ok</h2>"#;
        let headings = extract_headings(html, 1, 6);
        assert_eq!(headings[0].text, "Use <b> &amp; 'quotes' — ok");
    }

    /// Verifies unknown entities survive untouched.
    #[test]
    fn test_decode_unknown_entity() {
        assert_eq!(decode_entities("a &bogus; b"), "a &bogus; b");
        assert_eq!(decode_entities("&#xD800;"), "&#xD800;");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed(_)));
    }

    /// Verifies number_headings carries ids and text through.
    #[test]
    fn test_number_headings() {
        let headings = vec![
            HeadingInfo { level: 1, id: "a".into(), text: "A".into() },
            HeadingInfo { level: 2, id: "b".into(), text: "B".into() },
        ];
        let entries = number_headings(&headings);
        assert_eq!(entries[1].number, "1.1.");
        assert_eq!(entries[1].id, "b");
        assert_eq!(entries[1].depth, 2);
    }
}
