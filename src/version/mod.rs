// src/version/mod.rs

//! Package version ordering for Arch-style version strings
//!
//! Versions have the shape `[epoch:]version[-release]`. Each component is
//! compared segment by segment: runs of digits numerically, runs of letters
//! lexicographically, with separators only counting by their length. This is
//! the ordering pacman uses, so "is the index newer than what we stored" is
//! answered the same way the distribution answers it.

use std::cmp::Ordering;
use std::fmt;

/// A version string split into its epoch, version and release components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub epoch: String,
    pub version: String,
    pub release: Option<String>,
}

impl PackageVersion {
    /// Split a version string into components
    ///
    /// Examples:
    /// - "1.2.3" → epoch="0", version="1.2.3", release=None
    /// - "2:1.2.3-1" → epoch="2", version="1.2.3", release=Some("1")
    /// - "1.0-rc1-2" → epoch="0", version="1.0-rc1", release=Some("2")
    ///
    /// Never fails: a prefix before ':' that is not all digits is kept as part
    /// of the version.
    pub fn parse(s: &str) -> Self {
        let digits = s.bytes().take_while(u8::is_ascii_digit).count();
        let (epoch, rest) = if s[digits..].starts_with(':') {
            let epoch = if digits == 0 { "0" } else { &s[..digits] };
            (epoch, &s[digits + 1..])
        } else {
            ("0", s)
        };

        let (version, release) = match rest.rfind('-') {
            Some(pos) => (&rest[..pos], Some(rest[pos + 1..].to_string())),
            None => (rest, None),
        };

        Self {
            epoch: epoch.to_string(),
            version: version.to_string(),
            release,
        }
    }

    /// Compare two parsed versions
    pub fn compare(&self, other: &PackageVersion) -> Ordering {
        compare_segments(&self.epoch, &other.epoch)
            .then_with(|| compare_segments(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => compare_segments(a, b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != "0" {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two raw version strings
pub fn compare(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    PackageVersion::parse(a).compare(&PackageVersion::parse(b))
}

/// Returns true when `candidate` is strictly newer than `current`
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Segment-wise comparison of a single component
///
/// Components containing non-ASCII characters cannot be split reliably and
/// fall back to plain lexicographic ordering.
fn compare_segments(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if !a.is_ascii() || !b.is_ascii() {
        return a.cmp(b);
    }

    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (start_a, start_b) = (i, j);
        while i < a.len() && !a[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() {
            j += 1;
        }

        if i >= a.len() || j >= b.len() {
            break;
        }

        // A longer separator run sorts higher ("1..0" > "1.0")
        if i - start_a != j - start_b {
            return (i - start_a).cmp(&(j - start_b));
        }

        let numeric = a[i].is_ascii_digit();
        let end_a = run_end(a, i, numeric);
        let end_b = run_end(b, j, numeric);
        let (seg_a, seg_b) = (&a[i..end_a], &b[j..end_b]);

        // Segment types differ: numbers are newer than letters
        if seg_b.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            compare_numeric(seg_a, seg_b)
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        i = end_a;
        j = end_b;
    }

    let rest_a = &a[i..];
    let rest_b = &b[j..];
    if rest_a.is_empty() && rest_b.is_empty() {
        return Ordering::Equal;
    }

    // A trailing letter run is a pre-release and loses to the bare version;
    // anything else left over makes that side newer.
    let a_alpha = rest_a.first().is_some_and(u8::is_ascii_alphabetic);
    let b_alpha = rest_b.first().is_some_and(u8::is_ascii_alphabetic);
    if (rest_a.is_empty() && !b_alpha) || a_alpha {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn run_end(s: &[u8], start: usize, numeric: bool) -> usize {
    let mut end = start;
    while end < s.len()
        && if numeric {
            s[end].is_ascii_digit()
        } else {
            s[end].is_ascii_alphabetic()
        }
    {
        end += 1;
    }
    end
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let zeros = s.iter().take_while(|&&c| c == b'0').count();
    &s[zeros..]
}
