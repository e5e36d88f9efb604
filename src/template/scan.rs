use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

/// Names a template refers to, read from its tags and output blocks.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Scan {
    /// Files pulled in with `{% include '...' %}`, in order of appearance.
    pub includes: Vec<String>,
    /// First segment of every variable path (`user` for `user.name`).
    pub roots: BTreeSet<String>,
}

pub fn scan(source: &str) -> Scan {
    lazy_static! {
        static ref MARKUP: Regex = Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}").unwrap();
        static ref INCLUDE: Regex =
            Regex::new(r#"^-?\s*include\s+(?:'([^']+)'|"([^"]+)")"#).unwrap();
        static ref QUOTED: Regex = Regex::new(r#"'[^']*'|"[^"]*""#).unwrap();
        static ref IDENT: Regex = Regex::new(r"[A-Za-z_][\w-]*").unwrap();
    }

    let mut scan = Scan::default();

    for markup in MARKUP.captures_iter(source) {
        let Some(inner) = markup.get(1).or_else(|| markup.get(2)) else {
            continue;
        };
        let inner = inner.as_str();

        if let Some(include) = INCLUDE.captures(inner) {
            if let Some(name) = include.get(1).or_else(|| include.get(2)) {
                scan.includes.push(name.as_str().to_string());
            }
        }

        let unquoted = QUOTED.replace_all(inner, " ");
        let bytes = unquoted.as_bytes();
        for ident in IDENT.find_iter(&unquoted) {
            // Path segments after the root and number suffixes are not roots.
            let prev = ident.start().checked_sub(1).map(|i| bytes[i]);
            if matches!(prev, Some(b'.' | b'0'..=b'9')) {
                continue;
            }
            let name = ident.as_str().trim_end_matches('-');
            if !name.is_empty() {
                scan.roots.insert(name.to_string());
            }
        }
    }

    scan
}
