//! Expansion of ValueTrack-style conditional macros in landing page URLs.
//!
//! A URL such as `https://x.test/?d={ifmobile:m}{ifnotmobile:d}` resolves
//! differently per click context, so covering all execution branches requires
//! probing one concrete URL per branch. Two mutually exclusive pairs are
//! expanded: (ifmobile, ifnotmobile) and (ifsearch, ifcontent). Every other
//! bracketed token is stripped with no substitution.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

fn if_macro_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\{(if\w+):([^}]+)\}").expect("valid regex"))
}

fn leftover_macro_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"))
}

/// One recognized conditional macro occurrence.
#[derive(Debug, Clone)]
struct Modifier {
    /// The full `{ifKEY:value}` text to substitute away.
    substitute: String,
    /// The value that replaces the macro when its branch is taken.
    replacement: String,
}

/// Expand a raw URL into the minimal set of concrete URLs covering all
/// branches of its conditional macros.
///
/// The result is a set: non-empty, free of `{`/`}` characters, at most four
/// entries (mobile x network), deterministic for a given input. A macro-free
/// URL expands to itself.
pub fn expand_url_modifiers(url: &str) -> HashSet<String> {
    let mut modifiers: HashMap<String, Modifier> = HashMap::new();
    for caps in if_macro_regex().captures_iter(url) {
        // Keys are case-insensitive, e.g. IfMobile is valid.
        modifiers.insert(
            caps[1].to_lowercase(),
            Modifier {
                substitute: caps[0].to_string(),
                replacement: caps[2].to_string(),
            },
        );
    }

    let expanded: HashSet<String> = if modifiers.is_empty() {
        std::iter::once(url.to_string()).collect()
    } else {
        let mobile = expand_pair(&modifiers, "ifmobile", "ifnotmobile", url);
        let mut combinations = HashSet::new();
        for candidate in &mobile {
            for network in expand_pair(&modifiers, "ifsearch", "ifcontent", candidate) {
                combinations.insert(network);
            }
        }
        combinations
    };

    // Strip custom parameters and anything else still bracketed.
    expanded
        .into_iter()
        .map(|u| leftover_macro_regex().replace_all(&u, "").into_owned())
        .collect()
}

/// Expand one mutually exclusive macro pair. When neither member is present
/// the URL passes through unbranched; otherwise both branch variants are
/// produced.
fn expand_pair(
    modifiers: &HashMap<String, Modifier>,
    first: &str,
    second: &str,
    url: &str,
) -> Vec<String> {
    if !modifiers.contains_key(first) && !modifiers.contains_key(second) {
        return vec![url.to_string()];
    }
    vec![
        replace_pair(modifiers, first, second, url),
        replace_pair(modifiers, second, first, url),
    ]
}

/// Produce a URL where the `keep` macro is substituted with its value and the
/// `drop` macro is removed entirely.
fn replace_pair(
    modifiers: &HashMap<String, Modifier>,
    keep: &str,
    drop: &str,
    url: &str,
) -> String {
    let kept = match modifiers.get(keep) {
        Some(m) => url.replacen(m.substitute.as_str(), m.replacement.as_str(), 1),
        None => url.to_string(),
    };
    match modifiers.get(drop) {
        Some(m) => kept.replacen(m.substitute.as_str(), "", 1),
        None => kept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(urls: &[&str]) -> HashSet<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_url_passes_through() {
        let out = expand_url_modifiers("https://x.test/a?b=1");
        assert_eq!(out, set(&["https://x.test/a?b=1"]));
    }

    #[test]
    fn test_expansion_is_idempotent_on_macro_free_output() {
        let first = expand_url_modifiers("https://x.test/a?b={ifmobile:m}{ifnotmobile:n}");
        for url in &first {
            let again = expand_url_modifiers(url);
            assert_eq!(again, set(&[url.as_str()]));
        }
    }

    #[test]
    fn test_mobile_pair_expansion() {
        let out = expand_url_modifiers("https://x.test/a?b={ifmobile:m}{ifnotmobile:n}");
        assert_eq!(out, set(&["https://x.test/a?bm", "https://x.test/a?bn"]));
    }

    #[test]
    fn test_single_pair_member_still_branches() {
        let out = expand_url_modifiers("https://x.test/?d={ifmobile:mob}");
        assert_eq!(out, set(&["https://x.test/?dmob", "https://x.test/?d"]));
    }

    #[test]
    fn test_both_pairs_cartesian_product() {
        let out = expand_url_modifiers(
            "https://x.test/?d={ifmobile:m}{ifnotmobile:d}&n={ifsearch:s}{ifcontent:c}",
        );
        assert_eq!(out.len(), 4);
        for url in &out {
            assert!(!url.contains('{') && !url.contains('}'), "brackets left in {url}");
        }
        assert!(out.contains("https://x.test/?dm&n=s"));
        assert!(out.contains("https://x.test/?dd&n=c"));
    }

    #[test]
    fn test_case_insensitive_keys() {
        let out = expand_url_modifiers("https://x.test/?d={IfMobile:m}{IFNOTMOBILE:n}");
        assert_eq!(out, set(&["https://x.test/?dm", "https://x.test/?dn"]));
    }

    #[test]
    fn test_custom_parameters_stripped() {
        let out = expand_url_modifiers("https://x.test/?kw={keyword}&c={_custom}");
        assert_eq!(out, set(&["https://x.test/?kw=&c="]));
    }

    #[test]
    fn test_duplicate_variants_collapse() {
        // Identical replacement on both branches dedupes to one URL.
        let out = expand_url_modifiers("https://x.test/?d={ifmobile:x}{ifnotmobile:x}");
        assert_eq!(out, set(&["https://x.test/?dx"]));
        let out = expand_url_modifiers("https://x.test/?{ifsearch:n=1}{ifcontent:n=1}");
        assert_eq!(out, set(&["https://x.test/?n=1"]));
    }
}
