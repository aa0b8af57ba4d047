//! Text cleaning shared by indexing and querying.

/// Lowercase, replace anything outside `[a-z0-9]`, whitespace and `'` with a
/// space, then collapse whitespace runs. Characters outside ASCII are dropped
/// (after lowercasing, so `É` becomes a space rather than `é`).
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '\'';
        if keep {
            if pending_space && !out.is_empty() { out.push(' '); }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

/// `None` normalizes to the empty string.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Whitespace tokens of an already normalized string.
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_and_collapses() {
        assert_eq!(normalize("  Women's  LAWN-Suit (3pc)!! "), "women's lawn suit 3pc");
        assert_eq!(normalize("Café\tNoir\n\nÜber"), "caf noir ber");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("***"), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn is_a_projection() {
        for s in ["Embroidered Lawn Suit", "  a--b  'c' ", "ǅ ß ﬁ 42", "\u{0130}stanbul", "x\u{00A0}y"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {s:?}");
        }
    }
}
