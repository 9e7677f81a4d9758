//! Page range validation
//!
//! Ranges are 1-based and inclusive. Two policies exist:
//! - [`RangePolicy::Strict`]: the ranges must partition the document exactly
//!   (no gaps, no page used twice) and match the declared split count.
//! - [`RangePolicy::Permissive`]: only per-range bounds are checked.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("At least one page range is required")]
    Empty,

    #[error("Expected {expected} range(s), got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Ranges cannot overlap or repeat pages (page {page} is used twice)")]
    Overlap { page: u32 },

    #[error("Ranges must cover all pages of the PDF (page {first_missing} is not covered)")]
    IncompleteCoverage { first_missing: u32 },
}

/// An inclusive, 1-based page interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Build a range from a client JSON value like `{"start": 1, "end": 5}`.
    ///
    /// Anything that is not a pair of non-negative integers is rejected with
    /// the offending JSON echoed back.
    pub fn from_json(value: &Value) -> Result<Self, RangeError> {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };

        match (field("start"), field("end")) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(RangeError::InvalidRange(value.to_string())),
        }
    }

    /// Parse a compact range list like `"1-3, 5, 8-10"`.
    ///
    /// Each comma-separated part becomes one range; a single page `5` becomes
    /// `5-5`. Bounds against a document are checked later by
    /// [`validate_ranges`].
    pub fn parse_list(input: &str) -> Result<Vec<Self>, RangeError> {
        let mut ranges = Vec::new();

        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let invalid = || RangeError::InvalidRange(part.to_string());

            let range = if let Some((start, end)) = part.split_once('-') {
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                Self { start, end }
            } else {
                let page: u32 = part.parse().map_err(|_| invalid())?;
                Self {
                    start: page,
                    end: page,
                }
            };
            ranges.push(range);
        }

        Ok(ranges)
    }

    pub fn page_count(&self) -> u32 {
        self.end - self.start + 1
    }

    /// 0-based page indices covered by this range, ascending
    pub fn page_indices(&self) -> Vec<u32> {
        (self.start - 1..self.end).collect()
    }

    fn is_within(&self, total_pages: u32) -> bool {
        self.start >= 1 && self.start <= self.end && self.end <= total_pages
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#"{{"start":{},"end":{}}}"#, self.start, self.end)
    }
}

/// How split ranges are checked against the source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Ranges must partition the document and match the declared count
    #[default]
    Strict,
    /// Ranges may overlap, leave gaps, and appear in any order
    Permissive,
}

impl FromStr for RangePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(RangePolicy::Strict),
            "permissive" => Ok(RangePolicy::Permissive),
            other => Err(format!(
                "Unknown range policy '{}'. Must be 'strict' or 'permissive'",
                other
            )),
        }
    }
}

impl fmt::Display for RangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangePolicy::Strict => write!(f, "strict"),
            RangePolicy::Permissive => write!(f, "permissive"),
        }
    }
}

/// Validate requested ranges against a document of `total_pages` pages.
///
/// Returns the ranges unchanged (and in request order) when they pass.
pub fn validate_ranges(
    total_pages: u32,
    ranges: &[PageRange],
    policy: RangePolicy,
    declared_count: Option<usize>,
) -> Result<Vec<PageRange>, RangeError> {
    if ranges.is_empty() {
        return Err(RangeError::Empty);
    }

    if policy == RangePolicy::Strict {
        if let Some(expected) = declared_count {
            if expected != ranges.len() {
                return Err(RangeError::CountMismatch {
                    expected,
                    got: ranges.len(),
                });
            }
        }
    }

    let mut covered = BTreeSet::new();

    for range in ranges {
        if !range.is_within(total_pages) {
            return Err(RangeError::InvalidRange(range.to_string()));
        }

        if policy == RangePolicy::Strict {
            for page in range.start..=range.end {
                if !covered.insert(page) {
                    return Err(RangeError::Overlap { page });
                }
            }
        }
    }

    if policy == RangePolicy::Strict && covered.len() as u32 != total_pages {
        let first_missing = (1..=total_pages)
            .find(|page| !covered.contains(page))
            .unwrap_or(total_pages);
        return Err(RangeError::IncompleteCoverage { first_missing });
    }

    Ok(ranges.to_vec())
}

/// Turn bookmark start pages into ranges that partition the document.
///
/// Pages before the first bookmark become their own leading range. Start
/// pages outside the document are ignored; an empty result means there is
/// nothing to split on.
pub fn ranges_from_outline(total_pages: u32, starts: &[u32]) -> Vec<PageRange> {
    let starts: BTreeSet<u32> = starts
        .iter()
        .copied()
        .filter(|&p| p >= 1 && p <= total_pages)
        .collect();

    let Some(&first) = starts.iter().next() else {
        return Vec::new();
    };

    let mut boundaries: Vec<u32> = Vec::with_capacity(starts.len() + 1);
    if first > 1 {
        boundaries.push(1);
    }
    boundaries.extend(starts);

    boundaries
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = boundaries
                .get(i + 1)
                .map(|next| next - 1)
                .unwrap_or(total_pages);
            PageRange::new(start, end)
        })
        .collect()
}
