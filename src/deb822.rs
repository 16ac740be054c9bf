//! RFC822-style stanza parsing for Debian control data
//!
//! Shared by the DEP-5 copyright parser and the `.dsc` handling in the
//! matchers. Parsing is tolerant: unknown fields ride along, comments are
//! skipped, continuation lines fold into the previous field with the DEP-5
//! `.` convention for blank lines.

use std::collections::BTreeMap;

/// One stanza: field name -> (possibly folded) value.
pub type Stanza = BTreeMap<String, String>;

/// Split a deb822 document into stanzas separated by blank lines.
pub fn parse_deb822(text: &str) -> Vec<Stanza> {
    let mut stanzas = Vec::new();
    let mut current = Stanza::new();
    let mut last_field: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
                last_field = None;
            }
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(field) = &last_field {
                let folded = line.trim();
                let entry = current.entry(field.clone()).or_default();
                entry.push('\n');
                entry.push_str(if folded == "." { "" } else { folded });
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if let Some((field, value)) = line.split_once(':') {
            let field = field.trim().to_string();
            current.insert(field.clone(), value.trim().to_string());
            last_field = Some(field);
        }
    }
    if !current.is_empty() {
        stanzas.push(current);
    }
    stanzas
}

/// Case-insensitive field lookup.
pub fn field<'a>(stanza: &'a Stanza, name: &str) -> Option<&'a str> {
    stanza
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a `Checksums-Sha1` or `Files` folded field into
/// `(checksum, size, filename)` triples.
pub fn parse_checksum_lines(folded: &str) -> Vec<(String, String, String)> {
    folded
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [checksum, size, filename] => Some((
                    checksum.to_string(),
                    size.to_string(),
                    filename.to_string(),
                )),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stanzas_and_continuations() {
        let stanzas = parse_deb822("A: one\nB: first\n second\n .\n third\n\nA: two\n");
        assert_eq!(stanzas.len(), 2);
        assert_eq!(stanzas[0]["B"], "first\nsecond\n\nthird");
        assert_eq!(stanzas[1]["A"], "two");
    }

    #[test]
    fn checksum_triples() {
        let parsed = parse_checksum_lines(
            "\nabc123 1024 zlib_1.2.11.dfsg.orig.tar.xz\ndef456 2048 zlib_1.2.11.dfsg-1.debian.tar.xz",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].2, "zlib_1.2.11.dfsg.orig.tar.xz");
    }

    #[test]
    fn case_insensitive_field_lookup() {
        let stanzas = parse_deb822("Format: 3.0 (quilt)\n");
        assert_eq!(field(&stanzas[0], "format"), Some("3.0 (quilt)"));
    }
}
