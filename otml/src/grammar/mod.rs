//! The aggregate (feature table, constraint set, lexicon) grammar and its
//! mutation interface.

pub mod lexicon;

use std::collections::BTreeSet;

use rand::Rng;

use crate::config::Configuration;
use crate::constraint::ConstraintSet;
use crate::engine::EngineContext;
use crate::errors::Result;
use crate::features::FeatureTable;
use crate::fst::Transducer;

pub use lexicon::{Lexicon, Word};

/// The aggregate grammar: a feature table, a ranked constraint set, and a
/// lexicon of underlying-representation words (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct Grammar {
    feature_table: FeatureTable,
    constraints: ConstraintSet,
    lexicon: Lexicon,
}

impl Grammar {
    /// Builds a grammar from its three components.
    pub fn new(feature_table: FeatureTable, constraints: ConstraintSet, lexicon: Lexicon) -> Self {
        Self {
            feature_table,
            constraints,
            lexicon,
        }
    }

    /// The grammar's feature table.
    pub fn feature_table(&self) -> &FeatureTable {
        &self.feature_table
    }

    /// The grammar's ranked constraint set.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// The grammar's current lexicon.
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// The memoized, optimal-paths-reduced constraint-set transducer.
    pub fn get_transducer(&self, ctx: &mut EngineContext) -> Result<Transducer> {
        ctx.grammar_transducer(&self.feature_table, &self.constraints)
    }

    /// The set of surface strings that are OT-optimal for `word` under
    /// this grammar. Memoized by `(constraint-set string, word string)`.
    pub fn generate(&self, ctx: &mut EngineContext, word: &Word) -> Result<BTreeSet<String>> {
        ctx.generate(&self.feature_table, &self.constraints, word)
    }

    /// The grammar's MDL encoding length: `ConstraintSet.encoding_length +
    /// Lexicon.encoding_length` (spec.md §4.4).
    pub fn encoding_length(&self, config: &Configuration) -> usize {
        self.constraints.encoding_length() + self.lexicon.encoding_length(&self.feature_table, config.restriction_on_alphabet)
    }

    /// Attempts a single mutation, chosen with probability proportional to
    /// `lexicon_mutation_weights.sum` vs. `constraint_set_mutation_weights.sum`,
    /// then among the named mutations within that family. Returns whether
    /// the mutation changed state (spec.md §4.3).
    pub fn make_mutation(&mut self, ctx: &mut EngineContext) -> bool {
        let config = ctx.config().clone();
        let lexicon_sum: u32 = config.lexicon_mutation_weights.values().sum();
        let constraint_sum: u32 = config.constraint_set_mutation_weights.values().sum();
        let total = lexicon_sum + constraint_sum;
        if total == 0 {
            return false;
        }
        let draw = ctx.rng().gen_range(0..total);
        if draw < lexicon_sum {
            self.mutate_lexicon(ctx, &config, draw)
        } else {
            self.mutate_constraint_set(ctx, &config, draw - lexicon_sum)
        }
    }

    fn mutate_lexicon(&mut self, ctx: &mut EngineContext, config: &Configuration, mut draw: u32) -> bool {
        for name in ["insert_segment", "delete_segment", "change_segment"] {
            let weight = *config.lexicon_mutation_weights.get(name).unwrap_or(&0);
            if draw < weight {
                return match name {
                    "insert_segment" => self.lexicon.insert_segment(ctx.rng(), &self.feature_table),
                    "delete_segment" => self.lexicon.delete_segment(ctx.rng()),
                    "change_segment" => self.lexicon.change_segment(ctx.rng(), &self.feature_table),
                    _ => unreachable!(),
                };
            }
            draw -= weight;
        }
        false
    }

    fn mutate_constraint_set(&mut self, ctx: &mut EngineContext, config: &Configuration, mut draw: u32) -> bool {
        let names = [
            "insert",
            "remove",
            "demote",
            "insert_feature_bundle_phonotactic",
            "remove_feature_bundle_phonotactic",
            "augment_feature_bundle",
        ];
        for name in names {
            let weight = *config.constraint_set_mutation_weights.get(name).unwrap_or(&0);
            if draw < weight {
                return self.apply_constraint_set_mutation(ctx, config, name);
            }
            draw -= weight;
        }
        false
    }

    fn apply_constraint_set_mutation(&mut self, ctx: &mut EngineContext, config: &Configuration, name: &str) -> bool {
        match name {
            "insert" => {
                let families = &config.constraint_insertion_weights;
                let total: u32 = families.values().sum();
                if total == 0 {
                    return false;
                }
                let mut draw = ctx.rng().gen_range(0..total);
                let mut chosen = None;
                for (family, weight) in families {
                    if draw < *weight {
                        chosen = Some(family.clone());
                        break;
                    }
                    draw -= weight;
                }
                let Some(family) = chosen else { return false };
                let bundle_count = config.initial_number_of_bundles_in_phonotactic_constraint.as_usize();
                let feature_count = config.initial_number_of_features.as_usize();
                self.constraints
                    .insert(ctx.rng(), &family, &self.feature_table, bundle_count, feature_count)
            }
            "remove" => self.constraints.remove(ctx.rng()),
            "demote" => self.constraints.demote(ctx.rng()),
            "insert_feature_bundle_phonotactic" => self.constraints.insert_feature_bundle_phonotactic(
                ctx.rng(),
                &self.feature_table,
                config.initial_number_of_features.as_usize(),
                config.max_feature_bundles_in_phonotactic_constraint.as_usize(),
                config.random_position_for_feature_bundle_insertion_in_phonotactic,
            ),
            "remove_feature_bundle_phonotactic" => self.constraints.remove_feature_bundle_phonotactic(
                ctx.rng(),
                config.min_feature_bundles_in_phonotactic_constraint.as_usize(),
                config.random_position_for_feature_bundle_removal_in_phonotactic,
            ),
            "augment_feature_bundle" => {
                self.constraints
                    .augment_feature_bundle(ctx.rng(), &self.feature_table, config.max_features_in_bundle.as_usize())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::features::{Feature, FeatureBundle};
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
            "lexicon_mutation_weights": {"insert_segment": 1},
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

    fn universal_bundle(table: &FeatureTable) -> FeatureBundle {
        FeatureBundle::new(BTreeMap::new(), table).unwrap()
    }

    fn cons_bundle(table: &FeatureTable) -> FeatureBundle {
        let mut m = BTreeMap::new();
        m.insert("cons".to_string(), "+".to_string());
        FeatureBundle::new(m, table).unwrap()
    }

    #[test]
    fn identity_grammar_generates_itself_under_faith_only() {
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("ab")]);
        let grammar = Grammar::new(table, constraints, lexicon);

        let mut ctx = EngineContext::new(minimal_config());
        let outputs = grammar.generate(&mut ctx, &Word::from_str("ab")).unwrap();
        assert_eq!(outputs, BTreeSet::from(["ab".to_string()]));
    }

    #[test]
    fn empty_word_generates_the_empty_string_under_faith_only() {
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("")]);
        let grammar = Grammar::new(table, constraints, lexicon);

        let mut ctx = EngineContext::new(minimal_config());
        let outputs = grammar.generate(&mut ctx, &Word::from_str("")).unwrap();
        assert_eq!(outputs, BTreeSet::from(["".to_string()]));
    }

    /// When Max (bans deletion) outranks Dep (bans insertion), a
    /// phonotactic violation is repaired by inserting rather than
    /// deleting: the costlier Max violation is avoided.
    #[test]
    fn max_above_dep_prefers_insertion_to_repair_a_phonotactic_violation() {
        let table = binary_table();
        let phonotactic = Constraint::Phonotactic(vec![cons_bundle(&table), cons_bundle(&table)]);
        let constraints = ConstraintSet::new(
            vec![phonotactic, Constraint::Max(universal_bundle(&table)), Constraint::Dep(universal_bundle(&table))],
            1,
            10,
        )
        .unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("bb")]);
        let grammar = Grammar::new(table, constraints, lexicon);

        let mut ctx = EngineContext::new(minimal_config());
        let outputs = grammar.generate(&mut ctx, &Word::from_str("bb")).unwrap();
        assert_eq!(outputs, BTreeSet::from(["bab".to_string()]));
    }

    /// When Dep (bans insertion) outranks Max (bans deletion), the same
    /// phonotactic violation is instead repaired by deleting.
    #[test]
    fn dep_above_max_prefers_deletion_to_repair_a_phonotactic_violation() {
        let table = binary_table();
        let phonotactic = Constraint::Phonotactic(vec![cons_bundle(&table), cons_bundle(&table)]);
        let constraints = ConstraintSet::new(
            vec![phonotactic, Constraint::Dep(universal_bundle(&table)), Constraint::Max(universal_bundle(&table))],
            1,
            10,
        )
        .unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("bb")]);
        let grammar = Grammar::new(table, constraints, lexicon);

        let mut ctx = EngineContext::new(minimal_config());
        let outputs = grammar.generate(&mut ctx, &Word::from_str("bb")).unwrap();
        assert_eq!(outputs, BTreeSet::from(["b".to_string()]));
    }
}
