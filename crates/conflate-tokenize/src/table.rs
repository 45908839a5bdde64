use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TokenizeError, TokenizeResult};
use crate::tokenizer::tokenize;

/// Longest entry, in tokens, that an equivalence group may hold.
pub const MAX_PHRASE_TOKENS: usize = 4;

/// Street types equated in every run, after any per-run table.
const GLOBAL: &[&[&str]] = &[
    &["st", "street"],
    &["ave", "avenue"],
    &["rd", "road"],
    &["blvd", "boulevard"],
    &["dr", "drive"],
    &["ln", "lane"],
    &["ct", "court"],
    &["pl", "place"],
    &["cir", "circle"],
    &["ter", "terrace"],
    &["pkwy", "parkway"],
    &["hwy", "highway"],
    &["sq", "square"],
    &["trl", "trail"],
];

/// Equivalence groups shipped with the tokenizer. The first entry of each
/// group is the canonical form.
const EN: &[&[&str]] = &[
    &["st", "street", "str"],
    &["ave", "avenue", "av"],
    &["rd", "road"],
    &["blvd", "boulevard"],
    &["dr", "drive"],
    &["ln", "lane"],
    &["ct", "court"],
    &["pl", "place"],
    &["cir", "circle"],
    &["ter", "terrace"],
    &["pkwy", "parkway"],
    &["hwy", "highway"],
    &["sq", "square"],
    &["trl", "trail"],
    &["n", "north"],
    &["s", "south"],
    &["e", "east"],
    &["w", "west"],
    &["ne", "northeast"],
    &["nw", "northwest"],
    &["se", "southeast"],
    &["sw", "southwest"],
];

const ES: &[&[&str]] = &[
    &["c", "calle", "cl"],
    &["av", "avenida", "avda"],
    &["cra", "carrera", "kr"],
    &["pza", "plaza"],
    &["ctra", "carretera"],
    &["psje", "pasaje"],
];

const FR: &[&[&str]] = &[
    &["r", "rue"],
    &["av", "avenue"],
    &["bd", "boulevard", "boul"],
    &["ch", "chemin"],
    &["pl", "place"],
    &["imp", "impasse"],
    &["all", "allée"],
];

const DE: &[&[&str]] = &[
    &["str", "straße", "strasse"],
    &["pl", "platz"],
    &["weg", "wg"],
    &["allee", "al"],
];

/// Token replacement table: maps a variant phrase to its canonical form.
///
/// Keys and values are token sequences joined by single spaces, at most
/// [`MAX_PHRASE_TOKENS`] long. Per-run tables are passed explicitly to every
/// component that tokenizes; [`TokenTable::global`] always applies after them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenTable {
    replacements: BTreeMap<String, String>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from equivalence groups; the first entry of each group
    /// is canonical.
    ///
    /// Every entry must tokenize to between one and [`MAX_PHRASE_TOKENS`]
    /// tokens. When a variant already has a canonical form from an earlier
    /// group, the earlier one wins.
    pub fn from_groups<G, S>(groups: impl IntoIterator<Item = G>) -> TokenizeResult<Self>
    where
        G: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for group in groups {
            let mut entries = Vec::new();
            for raw in group {
                entries.push(phrase(raw.as_ref())?);
            }
            table.insert_group(&entries);
        }
        Ok(table)
    }

    /// The fixed street-type table applied after any per-run table.
    pub fn global() -> &'static TokenTable {
        static TABLE: OnceLock<TokenTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut table = Self::new();
            for group in GLOBAL {
                let entries: Vec<String> = group.iter().map(|raw| tokenize(raw).join(" ")).collect();
                table.insert_group(&entries);
            }
            table
        })
    }

    /// Combine the built-in tables for the given language codes, in order.
    pub fn for_languages<S: AsRef<str>>(codes: &[S]) -> TokenizeResult<Self> {
        let mut table = Self::new();
        for code in codes {
            let code = code.as_ref().trim().to_lowercase();
            let groups = match code.as_str() {
                "en" => EN,
                "es" => ES,
                "fr" => FR,
                "de" => DE,
                _ => return Err(TokenizeError::UnknownLanguage(code)),
            };
            table.merge(Self::from_groups(groups.iter().map(|g| g.iter()))?);
        }
        Ok(table)
    }

    /// Load equivalence groups from a JSON file holding `[["st","street"],..]`.
    pub fn from_json_file(path: &Path) -> TokenizeResult<Self> {
        let data = fs::read_to_string(path)?;
        let groups: Vec<Vec<String>> = serde_json::from_str(&data)
            .map_err(|e| TokenizeError::InvalidTable(format!("{}: {e}", path.display())))?;
        Self::from_groups(groups)
    }

    /// Add every entry of `other` that is not already mapped.
    pub fn merge(&mut self, other: TokenTable) {
        for (variant, canonical) in other.replacements {
            self.insert(&variant, &canonical);
        }
    }

    /// Canonical form of `token`, or the token itself when unmapped.
    pub fn replace<'a>(&'a self, token: &'a str) -> &'a str {
        self.replacements.get(token).map_or(token, String::as_str)
    }

    /// Replace variants in a token sequence.
    ///
    /// At each position the longest matching phrase wins. Replacements are
    /// not rescanned.
    pub fn apply(&self, tokens: Vec<String>) -> Vec<String> {
        if self.is_empty() {
            return tokens;
        }
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let longest = MAX_PHRASE_TOKENS.min(tokens.len() - i);
            let hit = (1..=longest).rev().find_map(|n| {
                let key = tokens[i..i + n].join(" ");
                self.replacements.get(&key).map(|canonical| (n, canonical))
            });
            match hit {
                Some((n, canonical)) => {
                    out.extend(canonical.split(' ').filter(|t| !t.is_empty()).map(str::to_string));
                    i += n;
                }
                None => {
                    out.push(tokens[i].clone());
                    i += 1;
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    fn insert_group(&mut self, entries: &[String]) {
        let Some((canonical, variants)) = entries.split_first() else {
            return;
        };
        for variant in variants {
            self.insert(variant, canonical);
        }
    }

    fn insert(&mut self, variant: &str, canonical: &str) {
        if variant == canonical {
            return;
        }
        if let Some(existing) = self.replacements.get(variant) {
            if existing != canonical {
                debug!(variant, existing = %existing, ignored = canonical, "conflicting token replacement");
            }
            return;
        }
        self.replacements.insert(variant.to_string(), canonical.to_string());
    }
}

fn phrase(raw: &str) -> TokenizeResult<String> {
    let tokens = tokenize(raw);
    if tokens.is_empty() || tokens.len() > MAX_PHRASE_TOKENS {
        return Err(TokenizeError::InvalidTable(format!(
            "entry {raw:?} must hold 1 to {MAX_PHRASE_TOKENS} tokens, got {}",
            tokens.len()
        )));
    }
    Ok(tokens.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_english() {
        let table = TokenTable::for_languages(&["en"]).unwrap();
        assert_eq!(table.replace("street"), "st");
        assert_eq!(table.replace("avenue"), "ave");
        assert_eq!(table.replace("st"), "st");
        assert_eq!(table.replace("main"), "main");
    }

    #[test]
    fn combined_languages_first_wins() {
        // "avenue" is "ave" in en and "av" in fr.
        let table = TokenTable::for_languages(&["en", "fr"]).unwrap();
        assert_eq!(table.replace("avenue"), "ave");
        assert_eq!(table.replace("rue"), "r");

        let table = TokenTable::for_languages(&["fr", "en"]).unwrap();
        assert_eq!(table.replace("avenue"), "av");
    }

    #[test]
    fn german_eszett() {
        let table = TokenTable::for_languages(&["de"]).unwrap();
        assert_eq!(table.replace("straße"), "str");
        assert_eq!(table.replace("strasse"), "str");
    }

    #[test]
    fn unknown_language() {
        let err = TokenTable::for_languages(&["xx"]).unwrap_err();
        assert!(matches!(err, TokenizeError::UnknownLanguage(code) if code == "xx"));
    }

    #[test]
    fn groups_are_tokenized() {
        let table = TokenTable::from_groups(vec![vec!["Mt.", "Mount"]]).unwrap();
        assert_eq!(table.replace("mount"), "mt");
    }

    #[test]
    fn phrase_entries_replace_token_runs() {
        let table = TokenTable::from_groups(vec![vec!["mlk", "martin luther king"], vec!["jr", "junior"]]).unwrap();
        assert_eq!(table.replace("martin luther king"), "mlk");

        let out = table.apply(tokenize("Martin Luther King Junior Blvd"));
        assert_eq!(out, vec!["mlk", "jr", "blvd"]);
        // A partial phrase is left alone.
        assert_eq!(table.apply(tokenize("Martin Luther Ave")), vec!["martin", "luther", "ave"]);
    }

    #[test]
    fn longest_phrase_wins() {
        let table = TokenTable::from_groups(vec![vec!["n", "north"], vec!["nc", "north carolina"]]).unwrap();
        assert_eq!(table.apply(tokenize("North Carolina Ave")), vec!["nc", "ave"]);
        assert_eq!(table.apply(tokenize("North Main")), vec!["n", "main"]);
    }

    #[test]
    fn empty_and_overlong_entries_rejected() {
        let err = TokenTable::from_groups(vec![vec!["x", "--"]]).unwrap_err();
        assert!(matches!(err, TokenizeError::InvalidTable(_)));
        let err = TokenTable::from_groups(vec![vec!["x", "a b c d e"]]).unwrap_err();
        assert!(matches!(err, TokenizeError::InvalidTable(_)));
    }

    #[test]
    fn global_table_has_no_chains() {
        let global = TokenTable::global();
        assert_eq!(global.replace("street"), "st");
        assert_eq!(global.replace("highway"), "hwy");
        for canonical in global.replacements.values() {
            assert_eq!(global.replace(canonical), canonical.as_str(), "{canonical} is also a variant");
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[["hl", "hill"], ["vw", "view"]]"#).unwrap();
        let table = TokenTable::from_json_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.replace("hill"), "hl");
    }

    #[test]
    fn bad_file_is_invalid_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{").unwrap();
        let err = TokenTable::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, TokenizeError::InvalidTable(_)));
    }

    #[test]
    fn serde_roundtrip() {
        let table = TokenTable::for_languages(&["es"]).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: TokenTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
