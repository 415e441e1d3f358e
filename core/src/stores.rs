//! Store identifiers.
//!
//! Price rows arrive with a clean key, a free-text display name, or a user
//! alias. Everything is folded onto one key from [`SUPPORTED_STORES`] before
//! grouping. Unknown stores keep their normalized text so they still form a
//! group of their own.

/// Supported stores in match-priority order.
pub const SUPPORTED_STORES: [&str; 10] = [
    "walmart",
    "target",
    "kroger",
    "meijer",
    "99ranch",
    "traderjoes",
    "aldi",
    "andronicos",
    "wholefoods",
    "safeway",
];

const STORE_ALIASES: [(&str, &str); 2] = [("ranch99", "99ranch"), ("whole_foods", "wholefoods")];

/// Reverse containment only applies to fragments at least this long.
const MIN_FRAGMENT_LEN: usize = 3;

fn resolve_alias(key: &str) -> &str {
    STORE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(key, |(_, canonical)| *canonical)
}

fn strip_to_alphanumeric(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Canonical key for a price row or user-supplied store reference.
///
/// A non-empty `key` wins over `name`. Free-text names match, in order: an
/// exact supported key, the first supported key contained in the text, then
/// the first supported key containing the text. Returns `None` only when both
/// inputs are blank.
#[must_use]
pub fn canonical_store_key(key: Option<&str>, name: Option<&str>) -> Option<String> {
    if let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) {
        let lowered = key.to_lowercase();
        return Some(resolve_alias(&lowered).to_string());
    }

    let normalized = strip_to_alphanumeric(name?);
    if normalized.is_empty() {
        return None;
    }
    let normalized = resolve_alias(&normalized).to_string();

    if SUPPORTED_STORES.contains(&normalized.as_str()) {
        return Some(normalized);
    }
    if let Some(store) = SUPPORTED_STORES
        .iter()
        .find(|store| normalized.contains(**store))
    {
        return Some((*store).to_string());
    }
    if normalized.len() >= MIN_FRAGMENT_LEN {
        if let Some(store) = SUPPORTED_STORES
            .iter()
            .find(|store| store.contains(normalized.as_str()))
        {
            return Some((*store).to_string());
        }
    }
    Some(normalized)
}

/// Convenience for callers holding a single user-typed string.
#[must_use]
pub fn canonicalize(text: &str) -> Option<String> {
    let lowered = text.trim().to_lowercase();
    if let Some((_, canonical)) = STORE_ALIASES.iter().find(|(alias, _)| *alias == lowered) {
        return Some((*canonical).to_string());
    }
    canonical_store_key(None, Some(text))
}

#[must_use]
pub fn is_supported(key: &str) -> bool {
    SUPPORTED_STORES.contains(&key)
}

#[must_use]
pub fn store_display_name(key: &str) -> String {
    let label = match key {
        "walmart" => "Walmart",
        "target" => "Target",
        "kroger" => "Kroger",
        "meijer" => "Meijer",
        "99ranch" => "99 Ranch",
        "traderjoes" => "Trader Joe's",
        "aldi" => "Aldi",
        "andronicos" => "Andronico's",
        "wholefoods" => "Whole Foods",
        "safeway" => "Safeway",
        other => other,
    };
    label.to_string()
}

/// Parse a comma-separated store list.
///
/// Aliases resolve, unknown entries and duplicates are dropped, and an empty
/// or fully unmatched list falls back to every supported store.
#[must_use]
pub fn parse_store_filter(raw: Option<&str>) -> Vec<&'static str> {
    let mut selected: Vec<&'static str> = Vec::new();
    for entry in raw.unwrap_or("").split(',') {
        let lowered = entry.trim().to_lowercase();
        if lowered.is_empty() {
            continue;
        }
        let resolved = resolve_alias(&lowered);
        if let Some(store) = SUPPORTED_STORES.iter().find(|s| **s == resolved) {
            if !selected.contains(store) {
                selected.push(*store);
            }
        }
    }
    if selected.is_empty() {
        SUPPORTED_STORES.to_vec()
    } else {
        selected
    }
}

/// Five-digit ZIP from user input, dropping any `+4` suffix.
#[must_use]
pub fn normalize_zip(raw: &str) -> Option<String> {
    let base = raw.split('-').next().unwrap_or("").trim();
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_key_is_lowercased() {
        assert_eq!(
            canonical_store_key(Some("Walmart"), Some("ignored")).as_deref(),
            Some("walmart")
        );
    }

    #[test]
    fn test_direct_key_alias() {
        assert_eq!(
            canonical_store_key(Some("whole_foods"), None).as_deref(),
            Some("wholefoods")
        );
        assert_eq!(
            canonical_store_key(Some("ranch99"), None).as_deref(),
            Some("99ranch")
        );
    }

    #[test]
    fn test_whole_foods_variants_agree() {
        let a = canonicalize("Whole Foods");
        let b = canonicalize("wholefoods");
        let c = canonicalize("whole_foods");
        assert_eq!(a.as_deref(), Some("wholefoods"));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_name_containing_store() {
        assert_eq!(
            canonical_store_key(None, Some("Walmart Supercenter #1234")).as_deref(),
            Some("walmart")
        );
        assert_eq!(
            canonical_store_key(None, Some("Trader Joe's")).as_deref(),
            Some("traderjoes")
        );
        assert_eq!(
            canonical_store_key(None, Some("99 Ranch Market")).as_deref(),
            Some("99ranch")
        );
    }

    #[test]
    fn test_name_fragment_of_store() {
        assert_eq!(
            canonical_store_key(None, Some("Kro")).as_deref(),
            Some("kroger")
        );
    }

    #[test]
    fn test_short_fragment_not_expanded() {
        assert_eq!(canonical_store_key(None, Some("Al")).as_deref(), Some("al"));
    }

    #[test]
    fn test_unknown_store_keeps_normalized_text() {
        assert_eq!(
            canonical_store_key(None, Some("Corner Market!")).as_deref(),
            Some("cornermarket")
        );
    }

    #[test]
    fn test_blank_inputs() {
        assert_eq!(canonical_store_key(None, None), None);
        assert_eq!(canonical_store_key(Some("  "), Some("--")), None);
    }

    #[test]
    fn test_blank_key_falls_back_to_name() {
        assert_eq!(
            canonical_store_key(Some(""), Some("Safeway")).as_deref(),
            Some("safeway")
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(store_display_name("traderjoes"), "Trader Joe's");
        assert_eq!(store_display_name("99ranch"), "99 Ranch");
        assert_eq!(store_display_name("cornermarket"), "cornermarket");
    }

    #[test]
    fn test_parse_store_filter() {
        assert_eq!(
            parse_store_filter(Some("Target, ranch99,bogus,target")),
            vec!["target", "99ranch"]
        );
    }

    #[test]
    fn test_parse_store_filter_falls_back_to_all() {
        assert_eq!(parse_store_filter(None).len(), SUPPORTED_STORES.len());
        assert_eq!(parse_store_filter(Some("nope, ,")), SUPPORTED_STORES.to_vec());
    }

    #[test]
    fn test_normalize_zip() {
        assert_eq!(normalize_zip("47906-1234").as_deref(), Some("47906"));
        assert_eq!(normalize_zip(" 94110 ").as_deref(), Some("94110"));
        assert_eq!(normalize_zip(""), None);
    }
}
