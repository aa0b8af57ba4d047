//! Query expansion for informal fashion vocabulary.
//!
//! Triggers are matched as substrings of the lowercased query, so `"red"`
//! also fires inside `"embroidered"`. That looseness is intentional.

const STYLE: &[(&str, &[&str])] = &[
    ("aesthetic", &["trendy", "stylish", "fashionable", "modern", "chic"]),
    ("cute", &["pretty", "beautiful", "lovely", "adorable", "elegant"]),
    ("korean", &["kpop", "asian", "trendy", "oversized", "modern"]),
    ("casual", &["everyday", "comfortable", "relaxed", "informal"]),
    ("formal", &["professional", "office", "business", "elegant", "sophisticated"]),
    ("vintage", &["retro", "classic", "traditional", "old"]),
    ("boho", &["bohemian", "hippie", "flowy", "ethnic"]),
    ("minimal", &["minimalist", "simple", "basic", "plain", "clean"]),
    ("luxury", &["premium", "designer", "high-end", "expensive", "exclusive"]),
];

const OCCASION: &[(&str, &[&str])] = &[
    ("interview", &["formal", "professional", "office", "business", "corporate"]),
    ("wedding", &["bridal", "party", "formal", "festive", "celebration"]),
    ("party", &["evening", "festive", "celebration", "occasion", "special"]),
    ("casual", &["everyday", "daily", "comfort", "relaxed"]),
    ("beach", &["summer", "vacation", "resort", "light", "breezy"]),
    ("eid", &["festive", "celebration", "traditional", "special"]),
];

const COLOR: &[(&str, &[&str])] = &[
    ("black", &["dark", "charcoal", "noir"]),
    ("white", &["cream", "ivory", "off-white", "pearl"]),
    ("red", &["maroon", "crimson", "scarlet", "ruby"]),
    ("blue", &["navy", "indigo", "azure", "cobalt"]),
    ("green", &["olive", "emerald", "mint", "sage"]),
    ("pink", &["rose", "blush", "coral", "salmon"]),
];

const PATTERN: &[(&str, &[&str])] = &[
    ("floral", &["flower", "botanical", "garden", "bloom", "printed"]),
    ("striped", &["stripe", "lines", "linear"]),
    ("polka", &["dots", "dotted", "spotted"]),
    ("embroidered", &["embroidery", "threadwork", "hand-work", "detailed"]),
];

/// Synonyms appended per matched trigger.
pub const SYNONYMS_PER_TRIGGER: usize = 3;

pub struct QueryExpander {
    table: Vec<(&'static str, &'static [&'static str])>,
}

impl Default for QueryExpander {
    fn default() -> Self { Self::new() }
}

impl QueryExpander {
    /// Tables are combined style, occasion, color, pattern. A trigger listed in
    /// more than one table keeps its first slot and takes the last synonyms.
    pub fn new() -> Self {
        let mut table: Vec<(&'static str, &'static [&'static str])> = Vec::new();
        for (trigger, synonyms) in STYLE.iter().chain(OCCASION).chain(COLOR).chain(PATTERN) {
            match table.iter_mut().find(|(t, _)| t == trigger) {
                Some(slot) => slot.1 = *synonyms,
                None => table.push((*trigger, *synonyms)),
            }
        }
        Self { table }
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.iter().map(|(t, _)| *t)
    }

    pub fn expand(&self, query: &str) -> String {
        let lowered = query.to_lowercase();
        let mut terms = vec![query];
        for (trigger, synonyms) in &self.table {
            if lowered.contains(trigger) {
                terms.extend(synonyms.iter().copied().take(SYNONYMS_PER_TRIGGER));
            }
        }
        terms.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_first_three_synonyms_per_trigger() {
        let e = QueryExpander::new();
        assert_eq!(e.expand("Black Dress"), "Black Dress dark charcoal noir");
        assert_eq!(e.expand("plain kurta"), "plain kurta");
    }

    #[test]
    fn substring_triggers_fire() {
        let e = QueryExpander::new();
        // "embroidered" contains "red"; red comes first in table order
        assert_eq!(
            e.expand("embroidered lawn"),
            "embroidered lawn maroon crimson scarlet embroidery threadwork hand-work"
        );
    }

    #[test]
    fn duplicate_trigger_takes_later_table() {
        let e = QueryExpander::new();
        assert_eq!(e.triggers().filter(|t| *t == "casual").count(), 1);
        assert_eq!(e.triggers().position(|t| t == "casual"), Some(3));
        assert_eq!(e.expand("casual"), "casual everyday daily comfort");
    }
}
