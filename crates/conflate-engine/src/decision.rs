//! Create / modify / drop decision for a single input record.

use std::collections::HashSet;

use conflate_tokenize::Tokenizer;
use conflate_types::{FeatureProperties, InputRecord, KnownRecord, StagedModification, StreetName};

use crate::config::MATCH_RADIUS_KM;

/// Outcome of [`Matcher::decide`].
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// No known record matched; the input becomes a new address.
    Create(InputRecord),
    /// The input adds street names to an existing record.
    Modify(StagedModification),
    /// A matching record already carries every input street.
    Drop,
}

/// Pure decision algorithm over a record and its prefiltered candidates.
#[derive(Clone, Debug)]
pub struct Matcher {
    tokenizer: Tokenizer,
    radius_km: f64,
}

impl Matcher {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            radius_km: MATCH_RADIUS_KM,
        }
    }

    /// Decide what to do with `record` given candidates sharing its number.
    ///
    /// Candidates are tried in the order given; the first one within the
    /// match radius whose street tokens intersect the record's wins.
    pub fn decide(&self, record: InputRecord, candidates: &[KnownRecord]) -> Decision {
        if candidates.is_empty() {
            return Decision::Create(record);
        }

        let potential = self.token_set(&record.properties.street);

        for known in candidates
            .iter()
            .filter(|k| k.geometry.distance_km(&record.geometry) < self.radius_km)
        {
            let known_tokens = self.token_set(&known.properties.street);
            if potential.is_disjoint(&known_tokens) {
                continue;
            }

            return match self.merge_streets(known, &known_tokens, &record.properties.street) {
                Some(street) => Decision::Modify(StagedModification {
                    target_id: known.id,
                    target_version: known.version,
                    properties: FeatureProperties {
                        street,
                        ..known.properties.clone()
                    },
                    geometry: known.geometry,
                }),
                None => Decision::Drop,
            };
        }

        Decision::Create(record)
    }

    // Empty tokens carry no street and never take part in matching.
    fn token_set(&self, names: &[StreetName]) -> HashSet<String> {
        names
            .iter()
            .map(|n| self.tokenizer.normalize(&n.display))
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Known streets followed by every input street with a novel token.
    /// `None` when nothing would be added.
    fn merge_streets(
        &self,
        known: &KnownRecord,
        known_tokens: &HashSet<String>,
        input: &[StreetName],
    ) -> Option<Vec<StreetName>> {
        let mut names = known.properties.street.clone();
        let mut added = false;
        for name in input {
            let token = self.tokenizer.normalize(&name.display);
            if token.is_empty() || known_tokens.contains(&token) {
                continue;
            }
            if names.iter().any(|n| n.display == name.display) {
                continue;
            }
            names.push(name.clone());
            added = true;
        }
        added.then_some(names)
    }
}
