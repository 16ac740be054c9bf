//! Debian version parsing, ordering, and distance
//!
//! Versions are parsed into `(epoch, upstream, revision)` and ordered with
//! the dpkg precedence rules (`~` sorts before everything, digit runs compare
//! numerically). On top of the ordering, [`DebianVersion::distance`] computes
//! a weighted, symmetric scalar used by the matchers to pick the closest
//! Debian counterpart of an alien version:
//!
//! - epoch change          → 1000 per step
//! - upstream major        → 100 per step
//! - upstream minor        → 10 per step (only when majors are equal)
//! - upstream third level  → 1 per step (only when major+minor are equal)
//! - Debian revision       → 1 per step (only when upstream numerics agree)
//! - packaging/pre-release markers (`dfsg`, `~`, `+suffix`, `rcN`,
//!   non-numeric revision) → +5 whenever presence differs between the sides
//!
//! Distance is 0 iff the two versions compare equal after normalization, and
//! `a.distance(b) == b.distance(a)` for all inputs.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Distance beyond which two versions are considered unrelated.
pub const MAX_DISTANCE: u64 = 10_000_000;

/// Matcher cutoff: candidates farther away than this are rejected.
pub const ACCEPTABLE_DISTANCE: u64 = 300;

static RC_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[.\-+~_])rc\d*").expect("static regex"));

/// A Debian-style version string split into its comparable parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebianVersion {
    /// The string as given.
    pub original: String,
    pub epoch: u64,
    pub upstream: String,
    /// Debian revision, `None` when the string carries no `-`.
    pub revision: Option<String>,
}

impl DebianVersion {
    /// Parse a version string. Parsing is total: strings that are not valid
    /// Debian versions still produce a value that compares textually, they
    /// just carry no numeric components.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let (epoch, rest) = match s.find(':') {
            Some(idx) if s[..idx].chars().all(|c| c.is_ascii_digit()) && idx > 0 => {
                (s[..idx].parse::<u64>().unwrap_or(0), &s[idx + 1..])
            }
            _ => (0, s),
        };
        let (upstream, revision) = match rest.rfind('-') {
            Some(idx) => (rest[..idx].to_string(), Some(rest[idx + 1..].to_string())),
            None => (rest.to_string(), None),
        };
        DebianVersion {
            original: s.to_string(),
            epoch,
            upstream,
            revision,
        }
    }

    /// Leading numeric components of the upstream part, e.g.
    /// `1.2.11.dfsg` → `[1, 2, 11]`. Extraction stops at the first
    /// non-numeric token.
    pub fn numeric_components(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for token in self.upstream.split(|c: char| !c.is_ascii_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            match token.parse::<u64>() {
                Ok(n) => out.push(n),
                Err(_) => {
                    // mixed tokens like "11a" contribute their digit prefix
                    let digits: String =
                        token.chars().take_while(|c| c.is_ascii_digit()).collect();
                    if let Ok(n) = digits.parse::<u64>() {
                        out.push(n);
                    }
                    break;
                }
            }
        }
        out
    }

    /// Normalized revision counter. Debian numeric revisions are 1-based
    /// (`-1` is the first packaging), Yocto `rN` revisions are 0-based;
    /// both are mapped to a 0-based step count.
    fn revision_steps(&self) -> u64 {
        match &self.revision {
            None => 0,
            Some(rev) => {
                if rev.chars().all(|c| c.is_ascii_digit()) {
                    rev.parse::<u64>().unwrap_or(1).saturating_sub(1)
                } else {
                    let digits: String = rev
                        .chars()
                        .skip_while(|c| !c.is_ascii_digit())
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    digits.parse::<u64>().unwrap_or(0)
                }
            }
        }
    }

    fn markers(&self) -> [bool; 5] {
        let up = self.upstream.to_ascii_lowercase();
        [
            up.contains("dfsg"),
            self.original.contains('~'),
            up.contains('+'),
            RC_MARKER.is_match(&self.original.to_ascii_lowercase()),
            self.revision
                .as_deref()
                .map(|r| r.chars().any(|c| !c.is_ascii_digit()))
                .unwrap_or(false),
        ]
    }

    /// Whether the version carries a pre-release marker (`~` or `rcN`).
    /// Used as a tie-breaker when two candidates are equally distant.
    pub fn is_prerelease(&self) -> bool {
        let m = self.markers();
        m[1] || m[3]
    }

    /// Weighted distance to another version. Symmetric; 0 iff equal.
    pub fn distance(&self, other: &DebianVersion) -> u64 {
        if self.cmp(other) == Ordering::Equal {
            return 0;
        }

        let mut dist = 0u64;
        dist += self.epoch.abs_diff(other.epoch) * 1000;

        let a = self.numeric_components();
        let b = other.numeric_components();
        let level = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);

        let d_major = level(&a, 0).abs_diff(level(&b, 0));
        let d_minor = level(&a, 1).abs_diff(level(&b, 1));
        // fold all deeper numeric levels into the third step count
        let depth = a.len().max(b.len()).max(3);
        let d_third: u64 = (2..depth)
            .map(|i| level(&a, i).abs_diff(level(&b, i)))
            .sum();

        dist += d_major * 100;
        if d_major == 0 {
            dist += d_minor * 10;
            if d_minor == 0 {
                dist += d_third;
                if d_third == 0 {
                    dist += self.revision_steps().abs_diff(other.revision_steps());
                }
            }
        }

        let ma = self.markers();
        let mb = other.markers();
        for i in 0..ma.len() {
            if ma[i] != mb[i] {
                dist += 5;
            }
        }

        // two differently-spelled but equal-ranking versions never collapse
        // to zero here because the cmp() check above already returned
        dist.max(1)
    }
}

impl PartialOrd for DebianVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DebianVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| {
                verrevcmp(
                    self.revision.as_deref().unwrap_or("0"),
                    other.revision.as_deref().unwrap_or("0"),
                )
            })
    }
}

impl std::fmt::Display for DebianVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// dpkg character weight: `~` before end-of-string, letters before
/// everything else.
fn char_order(c: Option<char>) -> i32 {
    match c {
        Some('~') => -1,
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

/// The dpkg `verrevcmp` string comparison: alternate non-digit and digit
/// spans, compare non-digit spans with [`char_order`] and digit spans
/// numerically.
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (mut i, mut j) = (0usize, 0usize);

    while i < a.len() || j < b.len() {
        // non-digit span
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = char_order(a.get(i).copied().filter(|c| !c.is_ascii_digit()));
            let bc = char_order(b.get(j).copied().filter(|c| !c.is_ascii_digit()));
            if ac != bc {
                return ac.cmp(&bc);
            }
            if i < a.len() && !a[i].is_ascii_digit() {
                i += 1;
            }
            if j < b.len() && !b[j].is_ascii_digit() {
                j += 1;
            }
        }
        // digit span
        while i < a.len() && a[i] == '0' {
            i += 1;
        }
        while j < b.len() && b[j] == '0' {
            j += 1;
        }
        let mut first_diff = Ordering::Equal;
        while i < a.len() && j < b.len() && a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> DebianVersion {
        DebianVersion::parse(s)
    }

    #[test]
    fn parses_epoch_upstream_revision() {
        let ver = v("1:1.2.11.dfsg-2");
        assert_eq!(ver.epoch, 1);
        assert_eq!(ver.upstream, "1.2.11.dfsg");
        assert_eq!(ver.revision.as_deref(), Some("2"));
    }

    #[test]
    fn ordering_follows_dpkg_rules() {
        assert!(v("1.2.11") < v("1.2.12"));
        assert!(v("1.2.11") > v("1.2.9"));
        assert!(v("2.0~rc1") < v("2.0"));
        assert!(v("1.0-1") < v("1.0-2"));
        assert!(v("1:0.9") > v("2.0"));
        assert!(v("1.2.11.dfsg-1") < v("1.2.11.dfsg-2"));
        assert_eq!(v("1.0").cmp(&v("1.0")), Ordering::Equal);
    }

    #[test]
    fn distance_is_zero_on_self() {
        for s in ["1.2.11-r0", "1:2.0~rc1-3", "20200601", "1.10.100.4"] {
            assert_eq!(v(s).distance(&v(s)), 0, "distance({s}, {s})");
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            ("1.2.11-r0", "1.2.11.dfsg-1"),
            ("1.2.8.dfsg-5", "1.2.11-r0"),
            ("2.0~rc2", "2.0"),
            ("1:1.0", "1.0"),
        ];
        for (a, b) in pairs {
            assert_eq!(v(a).distance(&v(b)), v(b).distance(&v(a)), "{a} vs {b}");
        }
    }

    #[test]
    fn zlib_match_distances() {
        let alien = v("1.2.11-r0");
        // dfsg marker (+5) and non-numeric revision marker (+5)
        assert_eq!(alien.distance(&v("1.2.11.dfsg-1")), 10);
        // one more Debian revision step
        assert_eq!(alien.distance(&v("1.2.11.dfsg-2")), 11);
        // 3 third-level steps on top of both markers; revision steps are
        // gated away because the upstream numerics already differ
        assert_eq!(alien.distance(&v("1.2.8.dfsg-5")), 13);
    }

    #[test]
    fn epoch_dominates_distance() {
        assert!(v("1:1.0").distance(&v("1.0")) >= 1000);
    }

    #[test]
    fn major_and_minor_weights() {
        assert_eq!(v("2.0.0").distance(&v("3.0.0")), 100);
        assert_eq!(v("2.1.0").distance(&v("2.4.0")), 30);
        assert_eq!(v("2.1.3").distance(&v("2.1.9")), 6);
    }

    #[test]
    fn prerelease_markers_detected() {
        assert!(v("2.0~rc1").is_prerelease());
        assert!(v("2.0-rc3").is_prerelease());
        assert!(!v("1.2.11.dfsg-1").is_prerelease());
        // "rc" embedded inside a word is not a marker
        assert!(!v("force.1").is_prerelease());
    }

    #[test]
    fn different_spellings_never_collapse_to_zero() {
        // equal rank would be distance 0; unequal strings with equal
        // numerics keep at least distance 1
        assert!(v("1.0a").distance(&v("1.0b")) >= 1);
    }
}
