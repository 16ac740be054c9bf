//! Package-name fuzzy scoring and match score aggregation
//!
//! Yocto recipe names and Debian source package names follow different
//! conventions (`xz` vs `xz-utils`, `python3-iniparse` vs `python-iniparse`,
//! `glib-2.0` vs `glib2.0`). [`fuzzy_package_score`] encodes the known
//! convention ladder as a symmetric integer score in `[0, 100]`; the alias
//! table handles the cases no rule can express.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::version::{DebianVersion, ACCEPTABLE_DISTANCE};

/// Hard-coded name aliases between build recipes and Debian source packages.
/// If a matcher sees the key side, it is treated as the value side.
pub static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("gtk+3", "gtk+3.0"),
        ("gmmlib", "intel-gmmlib"),
        ("libpcre2", "pcre2"),
        ("libusb1", "libusb-1.0"),
        ("libva-intel", "libva"),
        ("libxfont2", "libxfont"),
        ("linux-firmware", "firmware-nonfree"),
        ("linux-intel", "linux"),
        ("linux-seco-fslc", "linux"),
        ("linux-stm32mp", "linux"),
        ("linux-yocto", "linux"),
        ("python3", "python3.9"),
        ("systemd-boot", "systemd"),
        ("tcl", "tcl8.6"),
        ("xz", "xz-utils"),
        ("wpa-supplicant", "wpa"),
        ("zlib-intel", "zlib"),
    ])
});

/// Names that are known to have no Debian counterpart; matchers skip them
/// instead of burning API calls.
pub const EXCLUSIONS: &[&str] = &[
    "freertos-demo",
    "zephyr-philosophers",
    "ltp",
    "libpcre",
    "xserver-xorg",
    "which",
];

/// Weight of the name score in the overall match score. The version
/// distance carries the other half: identical names are not enough
/// (gnutls matches both gnutls and gnutls28).
const PACKAGE_WEIGHT: f64 = 0.5;

fn clean_name(name: &str) -> String {
    name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '~' || c == '+')
        .replace("-v", "")
        .replace('-', "")
}

fn alias_of(name: &str) -> &str {
    ALIASES.get(name).copied().unwrap_or(name)
}

/// Asymmetric rule ladder; [`fuzzy_package_score`] applies it both ways and
/// keeps the better score so that the public function is symmetric.
fn directed_score(given: &str, new: &str) -> u32 {
    if given == new {
        return 100;
    }

    // known alias pairs match perfectly
    let given = alias_of(given);
    if given == new {
        return 100;
    }

    // glib-2.0 => glib2.0
    if given.replace('-', "") == new {
        return 95;
    }

    let g = clean_name(given);
    let n = clean_name(new);

    if g == n {
        return 90;
    }

    // Internet Software Consortium prefix: dhcp => isc-dhcp
    if n.starts_with(&format!("isc{g}")) {
        return 90;
    }

    // some libraries lack the lib prefix on one side
    if (g.starts_with("lib") || n.starts_with("lib"))
        && g.replacen("lib", "", 1) == n.replacen("lib", "", 1)
    {
        return 85;
    }

    // python3-iniparse vs python-iniparse, with and without prefix
    if n.starts_with("python3") || g.starts_with("python3") {
        let nn = n.replacen("python3", "python", 1);
        let gg = g.replacen("python3", "python", 1);
        if nn == gg {
            return 80;
        }
        if nn.replacen("python", "", 1) == gg.replacen("python", "", 1) {
            return 70;
        }
    }

    // fonts may carry a fonts- prefix in Debian
    if g.replace("fonts", "") == n.replace("fonts", "") {
        return 70;
    }

    // library/API version folded into the Debian name: tcl => tcl8.6
    if n.starts_with(&g) && !g.is_empty() {
        return 60;
    }

    0
}

/// Fuzzy similarity between an alien package name and a Debian source
/// package name. Symmetric, in `[0, 100]`; 0 means no plausible relation.
pub fn fuzzy_package_score(a: &str, b: &str) -> u32 {
    directed_score(a, b).max(directed_score(b, a))
}

/// Best score across the alien's primary and alternative names.
pub fn best_name_score(names: &[String], candidate: &str) -> u32 {
    names
        .iter()
        .map(|n| fuzzy_package_score(n, candidate))
        .max()
        .unwrap_or(0)
}

/// Version score from a distance: exact hit scores 100, anything within
/// distance 10 still scores 99, beyond that the score decays linearly.
pub fn version_score(distance: u64) -> u32 {
    if distance == 0 {
        100
    } else if distance <= 10 {
        99
    } else {
        100u64.saturating_sub(distance) as u32
    }
}

/// Overall match score: equal-weight blend of name and version scores,
/// rounded to one decimal.
pub fn overall_score(package_score: u32, version_score: u32) -> f64 {
    let raw = package_score as f64 * PACKAGE_WEIGHT + version_score as f64 * (1.0 - PACKAGE_WEIGHT);
    (raw * 10.0).round() / 10.0
}

/// Pick the best version among candidates: smallest distance within the
/// acceptance window, ties broken by non-prerelease first, then by the most
/// recent version. Returns the winning index.
pub fn select_version_candidate(candidates: &[(DebianVersion, u64)]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, (ver, dist)) in candidates.iter().enumerate() {
        if *dist > ACCEPTABLE_DISTANCE {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(j) => {
                let (bver, bdist) = &candidates[j];
                let better = if dist != bdist {
                    dist < bdist
                } else if ver.is_prerelease() != bver.is_prerelease() {
                    !ver.is_prerelease()
                } else {
                    ver > bver
                };
                if better {
                    Some(i)
                } else {
                    Some(j)
                }
            }
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_100() {
        assert_eq!(fuzzy_package_score("zlib", "zlib"), 100);
    }

    #[test]
    fn alias_table_scores_100() {
        assert_eq!(fuzzy_package_score("xz", "xz-utils"), 100);
        assert_eq!(fuzzy_package_score("linux-yocto", "linux"), 100);
    }

    #[test]
    fn convention_ladder() {
        assert_eq!(fuzzy_package_score("glib-2.0", "glib2.0"), 95);
        assert_eq!(fuzzy_package_score("dhcp", "isc-dhcp-client"), 90);
        assert_eq!(fuzzy_package_score("libcap-ng", "cap-ng"), 85);
        assert_eq!(fuzzy_package_score("python3-iniparse", "python-iniparse"), 80);
        assert_eq!(fuzzy_package_score("tcl", "tcl8.6"), 100); // via alias
        assert_eq!(fuzzy_package_score("expat", "libexpat"), 85);
        assert_eq!(fuzzy_package_score("zlib", "grub"), 0);
    }

    #[test]
    fn score_is_symmetric() {
        let pairs = [
            ("zlib", "zlib"),
            ("xz", "xz-utils"),
            ("glib-2.0", "glib2.0"),
            ("python3-iniparse", "python-iniparse"),
            ("libcap-ng", "cap-ng"),
            ("acl", "bash"),
        ];
        for (a, b) in pairs {
            assert_eq!(
                fuzzy_package_score(a, b),
                fuzzy_package_score(b, a),
                "{a} vs {b}"
            );
            assert!(fuzzy_package_score(a, b) <= 100);
        }
    }

    #[test]
    fn version_score_floor() {
        assert_eq!(version_score(0), 100);
        assert_eq!(version_score(10), 99);
        assert_eq!(version_score(11), 89);
        assert_eq!(version_score(300), 0);
        assert_eq!(version_score(100_000), 0);
    }

    #[test]
    fn overall_score_blend() {
        assert_eq!(overall_score(100, 99), 99.5);
        assert_eq!(overall_score(100, 100), 100.0);
        assert_eq!(overall_score(0, 0), 0.0);
    }

    #[test]
    fn candidate_selection_prefers_small_distance_then_recency() {
        let mk = |s: &str, d: u64| (DebianVersion::parse(s), d);
        // zlib scenario: dfsg-1 at 10 wins over dfsg-2 at 11 and dfsg-5 at 13
        let cands = vec![
            mk("1.2.11.dfsg-1", 10),
            mk("1.2.11.dfsg-2", 11),
            mk("1.2.8.dfsg-5", 13),
        ];
        assert_eq!(select_version_candidate(&cands), Some(0));

        // equal distance: non-prerelease beats prerelease
        let cands = vec![mk("2.0~rc1", 5), mk("1.9", 5)];
        assert_eq!(select_version_candidate(&cands), Some(1));

        // everything out of range
        let cands = vec![mk("9.9", 400)];
        assert_eq!(select_version_candidate(&cands), None);
    }
}
