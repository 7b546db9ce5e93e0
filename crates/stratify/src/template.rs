//! Path-pattern template expansion.
//!
//! A pattern contains required placeholders `{name}`, optional bracketed
//! segments `[...]`, inline alternation constraints `{name<alt1|alt2>}` and
//! default fallbacks `{name|default}`. Used by the write-side path builder
//! and by directory-template resolution.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)(?:<([^>]+)>)?(?:\|([^{}<>]*))?\}").unwrap())
}

fn optional_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(.*?)\]").unwrap())
}

/// Substitute every placeholder in `text` from `entities`.
///
/// Returns `None` if any placeholder has no value and no default, or if a
/// value violates its alternation constraint.
fn replace_entities(text: &str, entities: &BTreeMap<String, String>) -> Option<String> {
    let mut ok = true;
    let out = placeholder_re().replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let alternatives: Option<Vec<&str>> =
            caps.get(2).map(|m| m.as_str().split('|').collect());
        match entities.get(name) {
            Some(value) => {
                if let Some(alts) = alternatives {
                    if !alts.iter().any(|a| a == value) {
                        ok = false;
                        return String::new();
                    }
                }
                value.clone()
            }
            None => match caps.get(3) {
                Some(default) => default.as_str().to_string(),
                None => {
                    ok = false;
                    String::new()
                }
            },
        }
    });
    if ok {
        Some(out.into_owned())
    } else {
        None
    }
}

/// Placeholder names referenced anywhere in a pattern, brackets included.
fn referenced_names(pattern: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(pattern)
        .map(|c| c[1].to_string())
        .collect()
}

/// Expand the first pattern that fully resolves against `entities`.
///
/// Optional `[...]` segments resolve independently first and drop silently
/// when their placeholders cannot all be satisfied. A required placeholder
/// without a value or default fails the pattern, and the next one is tried.
/// `strict` additionally rejects patterns that do not reference every key in
/// `entities`. Exhausting all patterns is a soft outcome (`None`).
pub fn build_path(
    entities: &BTreeMap<String, String>,
    patterns: &[String],
    strict: bool,
) -> Option<String> {
    for pattern in patterns {
        if strict {
            let referenced = referenced_names(pattern);
            if entities.keys().any(|k| !referenced.contains(k)) {
                continue;
            }
        }

        // Resolve optional segments first; each drops on failure.
        let mut resolved = String::new();
        let mut last = 0;
        for caps in optional_re().captures_iter(pattern) {
            let whole = caps.get(0).unwrap();
            resolved.push_str(&pattern[last..whole.start()]);
            if let Some(chunk) = replace_entities(&caps[1], entities) {
                resolved.push_str(&chunk);
            }
            last = whole.end();
        }
        resolved.push_str(&pattern[last..]);

        // Remaining placeholders are required.
        if let Some(path) = replace_entities(&resolved, entities) {
            return Some(path);
        }
    }
    None
}
