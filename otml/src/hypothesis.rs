//! `TraversableGrammarHypothesis`: a grammar paired with the observed data
//! it is being scored against, plus its cached MDL energies.
//!
//! Lifecycle (spec.md §3): created fresh at the start of a run; cloned
//! deeply to produce an annealing neighbor; the driver replaces its
//! "current" reference on acceptance. The hypothesis exclusively owns its
//! grammar; neighbors own independent deep copies — a plain
//! [`Clone`] derive suffices here because `Grammar`'s fields (feature
//! table, constraint list, lexicon word strings) are themselves cheap value
//! types, not handles into the `EngineContext` caches (spec.md §9's
//! "value-copy strategy rather than a general serialization round-trip").

use std::collections::BTreeMap;

use crate::config::Configuration;
use crate::engine::EngineContext;
use crate::errors::Result;
use crate::grammar::{Grammar, Word};

/// The sentinel used for an infinite (unparseable) data or combined energy,
/// the Rust analogue of the original's `sys.maxsize` (spec.md §4.4).
pub const INFINITE_ENERGY: i64 = i64::MAX;

/// A grammar, the data it is being scored against, and its most recently
/// computed energies.
#[derive(Debug, Clone)]
pub struct TraversableGrammarHypothesis {
    grammar: Grammar,
    data: Vec<Word>,
    grammar_energy: i64,
    data_energy: i64,
    combined_energy: i64,
}

impl TraversableGrammarHypothesis {
    /// Builds a hypothesis over `grammar`, to be scored against `data`'s
    /// surface forms. Energies start at the infinite sentinel until
    /// [`TraversableGrammarHypothesis::update_energy`] is called.
    pub fn new(grammar: Grammar, data: Vec<Word>) -> Self {
        Self {
            grammar,
            data,
            grammar_energy: INFINITE_ENERGY,
            data_energy: INFINITE_ENERGY,
            combined_energy: INFINITE_ENERGY,
        }
    }

    /// The hypothesis's grammar.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The observed data this hypothesis is scored against.
    pub fn data(&self) -> &[Word] {
        &self.data
    }

    /// The most recently computed combined energy.
    pub fn combined_energy(&self) -> i64 {
        self.combined_energy
    }

    /// The most recently computed grammar-encoding-length term.
    pub fn grammar_energy(&self) -> i64 {
        self.grammar_energy
    }

    /// The most recently computed data-encoding-length term.
    pub fn data_energy(&self) -> i64 {
        self.data_energy
    }

    /// Recomputes and caches `grammar_energy`, `data_energy`, and
    /// `combined_energy` (spec.md §4.4), returning the combined energy.
    pub fn update_energy(&mut self, ctx: &mut EngineContext, config: &Configuration) -> Result<i64> {
        let data_length = self.data_length_given_grammar(ctx)?;
        let grammar_length = self.grammar.encoding_length(config) as i64;

        self.grammar_energy = saturating_mul(grammar_length, config.grammar_encoding_length_multiplier);
        self.data_energy = if data_length >= INFINITE_ENERGY {
            INFINITE_ENERGY
        } else {
            saturating_mul(data_length, config.data_encoding_length_multiplier)
        };
        self.combined_energy = self.grammar_energy.saturating_add(self.data_energy);
        Ok(self.combined_energy)
    }

    /// The data-length term: for each observed datum, the minimal
    /// `ceil(log2(L)) + ceil(log2(|outputs|))` over every lexicon word that
    /// generates it, where `L` is the number of distinct lexicon words.
    /// Returns [`INFINITE_ENERGY`] if any datum has no parse at all
    /// (spec.md §4.4).
    fn data_length_given_grammar(&mut self, ctx: &mut EngineContext) -> Result<i64> {
        let parses = self.parse_data(ctx)?;
        for datum in &self.data {
            let has_parse = parses.get(datum.to_key().as_str()).is_some_and(|p| !p.is_empty());
            if !has_parse {
                return Ok(INFINITE_ENERGY);
            }
        }

        let distinct_words = self.grammar.lexicon().get_number_of_distinct_words().max(1);
        let input_choice_length = log2_ceil(distinct_words) as i64;

        let mut total = 0i64;
        for datum in &self.data {
            let best = parses[datum.to_key().as_str()]
                .iter()
                .map(|&num_outputs| input_choice_length + log2_ceil(num_outputs) as i64)
                .min()
                .expect("checked non-empty above");
            total = total.saturating_add(best);
        }
        Ok(total)
    }

    /// Generates every lexicon word's surface realizations and records,
    /// for each datum it matches, the number of distinct outputs that
    /// lexicon word produced (used to pick the cheapest parse per datum).
    fn parse_data(&self, ctx: &mut EngineContext) -> Result<BTreeMap<String, Vec<usize>>> {
        let mut parses: BTreeMap<String, Vec<usize>> = self.data.iter().map(|d| (d.to_key(), Vec::new())).collect();
        let distinct_words: std::collections::BTreeSet<String> = self.grammar.lexicon().words().iter().map(Word::to_key).collect();
        for word_key in distinct_words {
            let word = Word::from_str(&word_key);
            let outputs = self.grammar.generate(ctx, &word)?;
            let num_outputs = outputs.len();
            for output in outputs {
                if let Some(entry) = parses.get_mut(&output) {
                    entry.push(num_outputs);
                }
            }
        }
        Ok(parses)
    }

    /// Clones this hypothesis and applies a single `make_mutation()` to the
    /// clone's grammar. Returns `(mutation_succeeded, neighbor)` (spec.md
    /// §4.3's `get_neighbor`).
    pub fn get_neighbor(&self, ctx: &mut EngineContext) -> (bool, Self) {
        let mut neighbor = self.clone();
        let changed = neighbor.grammar.make_mutation(ctx);
        (changed, neighbor)
    }
}

fn log2_ceil(n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    (usize::BITS - (n - 1).leading_zeros()) as usize
}

fn saturating_mul(value: i64, multiplier: u64) -> i64 {
    value.saturating_mul(multiplier.min(i64::MAX as u64) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, ConstraintSet};
    use crate::engine::EngineContext;
    use crate::features::{Feature, FeatureTable};
    use crate::grammar::Lexicon;
    use std::collections::BTreeMap;

    fn binary_table() -> FeatureTable {
        let features = vec![Feature {
            label: "cons".to_string(),
            values: vec!["-".to_string(), "+".to_string()],
        }];
        let mut segments = BTreeMap::new();
        segments.insert("a".to_string(), vec!["-".to_string()]);
        segments.insert("b".to_string(), vec!["+".to_string()]);
        FeatureTable::new(features, segments).unwrap()
    }

    fn minimal_config() -> Configuration {
        let json = r#"{
            "simulation_name": "t",
            "max_constraints_in_constraint_set": "inf",
            "min_constraints_in_constraint_set": 1,
            "max_feature_bundles_in_phonotactic_constraint": 3,
            "min_feature_bundles_in_phonotactic_constraint": 1,
            "max_features_in_bundle": 2,
            "initial_number_of_features": 1,
            "initial_number_of_bundles_in_phonotactic_constraint": 1,
            "lexicon_mutation_weights": {"insert_segment": 1, "delete_segment": 1},
            "constraint_set_mutation_weights": {"insert": 1},
            "constraint_insertion_weights": {"Max": 1, "Faith": 1},
            "initial_temp": 100,
            "threshold": "10**-2",
            "cooling_factor": 0.99,
            "debug_logging_interval": 100,
            "clear_modules_caching_interval": 500,
            "steps_limitation": "inf",
            "data_encoding_length_multiplier": 1,
            "grammar_encoding_length_multiplier": 1
        }"#;
        Configuration::from_json(json).unwrap()
    }

    #[test]
    fn identity_grammar_has_finite_energy() {
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("ab")]);
        let grammar = Grammar::new(table, constraints, lexicon);
        let mut hyp = TraversableGrammarHypothesis::new(grammar, vec![Word::from_str("ab")]);

        let config = minimal_config();
        let mut ctx = EngineContext::new(config.clone());
        let energy = hyp.update_energy(&mut ctx, &config).unwrap();
        assert!(energy < INFINITE_ENERGY);
        assert_eq!(hyp.combined_energy(), energy);
    }

    #[test]
    fn unparseable_datum_yields_infinite_energy() {
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        // The lexicon never produces "ba", so that datum cannot be parsed.
        let lexicon = Lexicon::new(vec![Word::from_str("ab")]);
        let grammar = Grammar::new(table, constraints, lexicon);
        let mut hyp = TraversableGrammarHypothesis::new(grammar, vec![Word::from_str("ba")]);

        let config = minimal_config();
        let mut ctx = EngineContext::new(config.clone());
        let energy = hyp.update_energy(&mut ctx, &config).unwrap();
        assert_eq!(energy, INFINITE_ENERGY);
    }

    #[test]
    fn get_neighbor_leaves_original_untouched() {
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("ab")]);
        let grammar = Grammar::new(table, constraints, lexicon);
        let hyp = TraversableGrammarHypothesis::new(grammar, vec![Word::from_str("ab")]);

        let config = minimal_config();
        let mut ctx = EngineContext::new(config);
        let before = hyp.grammar().lexicon().len();
        let (_changed, neighbor) = hyp.get_neighbor(&mut ctx);
        assert_eq!(hyp.grammar().lexicon().len(), before);
        let _ = neighbor;
    }
}
