//! Candidate extraction from raw backend output
//!
//! The backend prints numbered menus such as
//!
//! ```text
//! 1: Alien (1979) [Movie - tmdb-348]
//! 2: Alien 3 (1992) [Movie - tmdb-9279]
//! ```
//!
//! possibly prefixed by a log level tag. Extraction always runs over the whole
//! raw buffer and keeps only the most recent menu.

use crate::models::{Candidate, MediaKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// One candidate line: optional log tag, ordinal, title, optional year,
/// then `[<kind label> - ]<source>-<id>` in brackets.
static CANDIDATE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:\[?(?:DEBUG|INFO|WARNING|WARN|ERROR|CRITICAL)\]?[ \t]*(?:[:\-][ \t]*)?)?(\d+):[ \t]+(.+?)(?:[ \t]+\((\d{4})\))?[ \t]+\[(?:([A-Za-z][A-Za-z ]*?)[ \t]+-[ \t]+)?([A-Za-z]+)-([A-Za-z0-9]+)\][ \t]*\r?$",
    )
    .expect("candidate line regex should compile")
});

/// Result of one extraction pass
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// No candidate lines in the buffer
    NoCandidates,
    /// The latest menu was already answered (echoed, or printed before the
    /// consumption point)
    Consumed,
    /// Candidates of the latest menu, ordinals 1..=n
    Found(Vec<Candidate>),
}

/// Most recent consecutive candidate run
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBlock {
    /// Byte offset of the ordinal-1 line in the buffer
    pub start: usize,
    pub candidates: Vec<Candidate>,
}

/// Parse the buffer and apply echo detection for `last_token`
///
/// # Arguments
///
/// * `buffer` - Full raw session buffer
/// * `last_token` - Last selection token sent to the backend, if any
/// * `consumed_before` - Menus starting before this offset count as answered
pub fn extract_candidates(
    buffer: &str,
    last_token: Option<&str>,
    consumed_before: usize,
) -> Extraction {
    let Some(block) = latest_block(buffer) else {
        return Extraction::NoCandidates;
    };

    if block.start < consumed_before {
        return Extraction::Consumed;
    }

    if let Some(token) = last_token {
        if let Some(echo) = last_echo_offset(buffer, token) {
            if echo > block.start {
                return Extraction::Consumed;
            }
        }
    }

    Extraction::Found(block.candidates)
}

/// Find the last ordinal-1 line and the consecutive run that follows it
///
/// Ordinals after the first gap are discarded.
pub fn latest_block(buffer: &str) -> Option<ExtractedBlock> {
    let mut block: Option<ExtractedBlock> = None;
    let mut open = false;

    for caps in CANDIDATE_LINE.captures_iter(buffer) {
        let Some(ordinal) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };

        if ordinal == 1 {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            block = Some(ExtractedBlock {
                start,
                candidates: vec![candidate_from(&caps, ordinal)],
            });
            open = true;
            continue;
        }

        if !open {
            continue;
        }
        if let Some(current) = block.as_mut() {
            let expected = current.candidates.len() as u32 + 1;
            if ordinal == expected {
                current.candidates.push(candidate_from(&caps, ordinal));
            } else {
                open = false;
            }
        }
    }

    block
}

/// Byte offset of the last `> <token>` echo line, if present
pub fn last_echo_offset(buffer: &str, token: &str) -> Option<usize> {
    let token = token.trim();
    let mut offset = 0;
    let mut found = None;

    for line in buffer.split_inclusive('\n') {
        let content = line.trim_end_matches(['\r', '\n']).trim();
        if let Some(echoed) = content.strip_prefix('>') {
            if echoed.trim() == token {
                found = Some(offset);
            }
        }
        offset += line.len();
    }

    found
}

fn candidate_from(caps: &regex::Captures<'_>, ordinal: u32) -> Candidate {
    let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    let year = caps.get(3).map(|m| m.as_str().to_string());
    let media_kind = caps
        .get(4)
        .map(|m| MediaKind::from_label(m.as_str()))
        .unwrap_or_default();
    let id_source = caps
        .get(5)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let external_id = caps.get(6).map(|m| m.as_str()).unwrap_or_default();

    Candidate::stub(ordinal, title, year, media_kind, id_source, external_id)
}
