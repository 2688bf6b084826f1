//! `config.json` loading and validation.
//!
//! Configuration values travel through two stages: a loosely-typed
//! [`RawConfiguration`] that mirrors the JSON file's shape exactly
//! (including the `"inf"`/`"X**Y"` numeric-literal conventions), and a
//! validated [`Configuration`] that the rest of the engine consumes.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{OtmlError, Result};

/// An integer bound that may be `"inf"` in `config.json`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Bound {
    /// A finite bound.
    Finite(u64),
    /// An unbounded (`"inf"`) value.
    Infinite,
}

impl Bound {
    /// Whether `value` is within the bound.
    pub fn admits(&self, value: u64) -> bool {
        match self {
            Self::Finite(limit) => value <= *limit,
            Self::Infinite => true,
        }
    }

    /// The bound as a `usize`, saturating at `usize::MAX` when infinite.
    pub fn as_usize(&self) -> usize {
        match self {
            Self::Finite(v) => *v as usize,
            Self::Infinite => usize::MAX,
        }
    }

    /// Whether `step` has reached or passed this bound, used by the
    /// annealing loop's `step == steps_limitation` guard (also admitting
    /// `"inf"`).
    pub fn reached_by(&self, step: u64) -> bool {
        match self {
            Self::Finite(limit) => step >= *limit,
            Self::Infinite => false,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Finite(v) => write!(f, "{v}"),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

fn parse_numeric_literal(value: &Value, field: &str) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| OtmlError::configuration(format!("{field}: not a finite number"))),
        Value::String(s) if s == "inf" => Ok(f64::INFINITY),
        Value::String(s) => {
            if let Some((base, exp)) = s.split_once("**") {
                let base: f64 = base
                    .parse()
                    .map_err(|_| OtmlError::configuration(format!("{field}: invalid literal {s}")))?;
                let exp: i32 = exp
                    .parse()
                    .map_err(|_| OtmlError::configuration(format!("{field}: invalid literal {s}")))?;
                Ok(base.powi(exp))
            } else {
                s.parse()
                    .map_err(|_| OtmlError::configuration(format!("{field}: invalid literal {s}")))
            }
        }
        other => Err(OtmlError::configuration(format!("{field}: unexpected value {other}"))),
    }
}

fn parse_bound(value: &Value, field: &str) -> Result<Bound> {
    match value {
        Value::String(s) if s == "inf" => Ok(Bound::Infinite),
        Value::Number(n) => n
            .as_u64()
            .map(Bound::Finite)
            .ok_or_else(|| OtmlError::configuration(format!("{field}: expected a non-negative integer"))),
        other => Err(OtmlError::configuration(format!("{field}: unexpected value {other}"))),
    }
}

/// The raw JSON shape of `config.json`, deserialized with `serde_json`
/// before validation promotes it to a [`Configuration`].
#[derive(Debug, Deserialize)]
struct RawConfiguration {
    simulation_name: String,
    #[serde(default)]
    corpus_duplication_factor: Value,
    max_constraints_in_constraint_set: Value,
    min_constraints_in_constraint_set: Value,
    max_feature_bundles_in_phonotactic_constraint: Value,
    min_feature_bundles_in_phonotactic_constraint: Value,
    max_features_in_bundle: Value,
    initial_number_of_features: Value,
    initial_number_of_bundles_in_phonotactic_constraint: Value,
    #[serde(default)]
    random_position_for_feature_bundle_insertion_in_phonotactic: bool,
    #[serde(default)]
    random_position_for_feature_bundle_removal_in_phonotactic: bool,
    #[serde(default)]
    restriction_on_alphabet: bool,
    #[serde(default)]
    allow_candidates_with_changed_segments: bool,
    #[serde(default)]
    log_lexicon_words: bool,
    #[serde(default)]
    log_file_name: Option<String>,
    lexicon_mutation_weights: BTreeMap<String, u32>,
    constraint_set_mutation_weights: BTreeMap<String, u32>,
    constraint_insertion_weights: BTreeMap<String, u32>,
    initial_temp: Value,
    threshold: Value,
    cooling_factor: Value,
    debug_logging_interval: Value,
    clear_modules_caching_interval: Value,
    steps_limitation: Value,
    #[serde(default)]
    random_seed: bool,
    #[serde(default)]
    seed: u64,
    data_encoding_length_multiplier: Value,
    grammar_encoding_length_multiplier: Value,
}

/// A validated configuration driving one annealing run.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// The run's label, for logging only.
    pub simulation_name: String,
    /// Repeat the corpus this many times; integer part is full
    /// repetitions, fractional part a prefix of the corpus.
    pub corpus_duplication_factor: f64,
    /// Constraint-set size bounds.
    pub max_constraints_in_constraint_set: Bound,
    /// Constraint-set size bounds.
    pub min_constraints_in_constraint_set: Bound,
    /// Phonotactic bundle-sequence length bounds.
    pub max_feature_bundles_in_phonotactic_constraint: Bound,
    /// Phonotactic bundle-sequence length bounds.
    pub min_feature_bundles_in_phonotactic_constraint: Bound,
    /// Per-bundle feature-count bound.
    pub max_features_in_bundle: Bound,
    /// Feature count drawn for a freshly generated bundle.
    pub initial_number_of_features: Bound,
    /// Bundle count drawn for a freshly generated `Phonotactic` constraint.
    pub initial_number_of_bundles_in_phonotactic_constraint: Bound,
    /// Whether `insert_feature_bundle_phonotactic` picks a random index
    /// rather than appending.
    pub random_position_for_feature_bundle_insertion_in_phonotactic: bool,
    /// Whether `remove_feature_bundle_phonotactic` picks a random index
    /// rather than removing the last bundle.
    pub random_position_for_feature_bundle_removal_in_phonotactic: bool,
    /// Whether the lexicon encoding additionally charges for restricting
    /// to a sub-alphabet.
    pub restriction_on_alphabet: bool,
    /// Whether `change_segment` is permitted as a lexicon mutation.
    pub allow_candidates_with_changed_segments: bool,
    /// Whether to log the lexicon's words at each debug interval.
    pub log_lexicon_words: bool,
    /// When present, `otml-cli` additionally logs to this file (spec.md's
    /// ambient configuration, not part of learning semantics).
    pub log_file_name: Option<String>,
    /// Weighted choice among lexicon mutations (`insert_segment`,
    /// `delete_segment`, `change_segment`).
    pub lexicon_mutation_weights: BTreeMap<String, u32>,
    /// Weighted choice among constraint-set mutations (`insert`,
    /// `remove`, `demote`, `insert_feature_bundle_phonotactic`,
    /// `remove_feature_bundle_phonotactic`, `augment_feature_bundle`).
    pub constraint_set_mutation_weights: BTreeMap<String, u32>,
    /// Weighted choice of constraint family for the `insert` mutation.
    pub constraint_insertion_weights: BTreeMap<String, u32>,
    /// Initial annealing temperature.
    pub initial_temp: f64,
    /// Stop once temperature falls to or below this threshold.
    pub threshold: f64,
    /// Multiplicative cooling factor, in `(0, 1)`.
    pub cooling_factor: f64,
    /// Log run state every this many steps.
    pub debug_logging_interval: u64,
    /// Flush memoization caches every this many steps.
    pub clear_modules_caching_interval: u64,
    /// Hard cap on the number of annealing steps.
    pub steps_limitation: Bound,
    /// Whether to draw the PRNG seed randomly rather than use `seed`.
    pub random_seed: bool,
    /// The PRNG seed, when `random_seed` is `false`.
    pub seed: u64,
    /// Multiplier on the data-length term of the combined energy.
    pub data_encoding_length_multiplier: u64,
    /// Multiplier on the grammar-length term of the combined energy.
    pub grammar_encoding_length_multiplier: u64,
}

const LEXICON_MUTATIONS: &[&str] = &["insert_segment", "delete_segment", "change_segment"];
const CONSTRAINT_SET_MUTATIONS: &[&str] = &[
    "insert",
    "remove",
    "demote",
    "insert_feature_bundle_phonotactic",
    "remove_feature_bundle_phonotactic",
    "augment_feature_bundle",
];
const CONSTRAINT_FAMILIES: &[&str] = &["Max", "Dep", "Ident", "Faith", "Phonotactic"];

impl Configuration {
    /// Loads and validates a configuration from a `config.json` payload.
    pub fn from_json(data: &str) -> Result<Self> {
        let raw: RawConfiguration = serde_json::from_str(data)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfiguration) -> Result<Self> {
        let corpus_duplication_factor = if raw.corpus_duplication_factor.is_null() {
            1.0
        } else {
            parse_numeric_literal(&raw.corpus_duplication_factor, "corpus_duplication_factor")?
        };
        if corpus_duplication_factor < 0.0 {
            return Err(OtmlError::configuration("corpus_duplication_factor must be non-negative"));
        }

        let max_constraints = parse_bound(&raw.max_constraints_in_constraint_set, "max_constraints_in_constraint_set")?;
        let min_constraints = parse_bound(&raw.min_constraints_in_constraint_set, "min_constraints_in_constraint_set")?;
        check_bound_order(min_constraints, max_constraints, "constraints_in_constraint_set")?;

        let max_bundles = parse_bound(
            &raw.max_feature_bundles_in_phonotactic_constraint,
            "max_feature_bundles_in_phonotactic_constraint",
        )?;
        let min_bundles = parse_bound(
            &raw.min_feature_bundles_in_phonotactic_constraint,
            "min_feature_bundles_in_phonotactic_constraint",
        )?;
        check_bound_order(min_bundles, max_bundles, "feature_bundles_in_phonotactic_constraint")?;

        let max_features_in_bundle = parse_bound(&raw.max_features_in_bundle, "max_features_in_bundle")?;
        let initial_number_of_features = parse_bound(&raw.initial_number_of_features, "initial_number_of_features")?;
        let initial_number_of_bundles = parse_bound(
            &raw.initial_number_of_bundles_in_phonotactic_constraint,
            "initial_number_of_bundles_in_phonotactic_constraint",
        )?;

        validate_weight_map(&raw.lexicon_mutation_weights, LEXICON_MUTATIONS, "lexicon_mutation_weights")?;
        validate_weight_map(
            &raw.constraint_set_mutation_weights,
            CONSTRAINT_SET_MUTATIONS,
            "constraint_set_mutation_weights",
        )?;
        validate_weight_map(
            &raw.constraint_insertion_weights,
            CONSTRAINT_FAMILIES,
            "constraint_insertion_weights",
        )?;

        let lexicon_sum: u32 = raw.lexicon_mutation_weights.values().sum();
        let constraint_set_sum: u32 = raw.constraint_set_mutation_weights.values().sum();
        if lexicon_sum + constraint_set_sum == 0 {
            return Err(OtmlError::configuration(
                "lexicon_mutation_weights and constraint_set_mutation_weights cannot both sum to zero",
            ));
        }
        let insertion_sum: u32 = raw.constraint_insertion_weights.values().sum();
        if insertion_sum == 0 {
            return Err(OtmlError::configuration("constraint_insertion_weights must sum to more than zero"));
        }

        let change_segment_weight = raw.lexicon_mutation_weights.get("change_segment").copied().unwrap_or(0);
        if (change_segment_weight > 0) != raw.allow_candidates_with_changed_segments {
            return Err(OtmlError::configuration(
                "change_segment must be enabled in lexicon_mutation_weights if and only if \
                 allow_candidates_with_changed_segments is set",
            ));
        }

        let initial_temp = parse_numeric_literal(&raw.initial_temp, "initial_temp")?;
        let threshold = parse_numeric_literal(&raw.threshold, "threshold")?;
        let cooling_factor = parse_numeric_literal(&raw.cooling_factor, "cooling_factor")?;
        if !(0.0..1.0).contains(&cooling_factor) {
            return Err(OtmlError::configuration("cooling_factor must lie in (0, 1)"));
        }

        let debug_logging_interval = parse_numeric_literal(&raw.debug_logging_interval, "debug_logging_interval")? as u64;
        let clear_modules_caching_interval =
            parse_numeric_literal(&raw.clear_modules_caching_interval, "clear_modules_caching_interval")? as u64;
        let steps_limitation = parse_bound(&raw.steps_limitation, "steps_limitation")?;

        let data_encoding_length_multiplier =
            parse_numeric_literal(&raw.data_encoding_length_multiplier, "data_encoding_length_multiplier")? as u64;
        let grammar_encoding_length_multiplier =
            parse_numeric_literal(&raw.grammar_encoding_length_multiplier, "grammar_encoding_length_multiplier")? as u64;

        Ok(Self {
            simulation_name: raw.simulation_name,
            corpus_duplication_factor,
            max_constraints_in_constraint_set: max_constraints,
            min_constraints_in_constraint_set: min_constraints,
            max_feature_bundles_in_phonotactic_constraint: max_bundles,
            min_feature_bundles_in_phonotactic_constraint: min_bundles,
            max_features_in_bundle,
            initial_number_of_features,
            initial_number_of_bundles_in_phonotactic_constraint: initial_number_of_bundles,
            random_position_for_feature_bundle_insertion_in_phonotactic: raw
                .random_position_for_feature_bundle_insertion_in_phonotactic,
            random_position_for_feature_bundle_removal_in_phonotactic: raw
                .random_position_for_feature_bundle_removal_in_phonotactic,
            restriction_on_alphabet: raw.restriction_on_alphabet,
            allow_candidates_with_changed_segments: raw.allow_candidates_with_changed_segments,
            log_lexicon_words: raw.log_lexicon_words,
            log_file_name: raw.log_file_name,
            lexicon_mutation_weights: raw.lexicon_mutation_weights,
            constraint_set_mutation_weights: raw.constraint_set_mutation_weights,
            constraint_insertion_weights: raw.constraint_insertion_weights,
            initial_temp,
            threshold,
            cooling_factor,
            debug_logging_interval,
            clear_modules_caching_interval,
            steps_limitation,
            random_seed: raw.random_seed,
            seed: raw.seed,
            data_encoding_length_multiplier,
            grammar_encoding_length_multiplier,
        })
    }
}

fn check_bound_order(min: Bound, max: Bound, field: &str) -> Result<()> {
    let ok = match (min, max) {
        (Bound::Finite(lo), Bound::Finite(hi)) => lo <= hi,
        (Bound::Infinite, Bound::Finite(_)) => false,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(OtmlError::configuration(format!("min_{field} must not exceed max_{field}")))
    }
}

fn validate_weight_map(map: &BTreeMap<String, u32>, known: &[&str], field: &str) -> Result<()> {
    for key in map.keys() {
        if !known.contains(&key.as_str()) {
            return Err(OtmlError::configuration(format!("{field}: unknown key {key}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{
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
        }"#
        .to_string()
    }

    #[test]
    fn parses_inf_and_power_literals() {
        let cfg = Configuration::from_json(&minimal_json()).unwrap();
        assert_eq!(cfg.max_constraints_in_constraint_set, Bound::Infinite);
        assert!((cfg.threshold - 0.01).abs() < 1e-9);
    }

    #[test]
    fn rejects_unknown_mutation_weight_key() {
        let mut json: Value = serde_json::from_str(&minimal_json()).unwrap();
        json["lexicon_mutation_weights"]["bogus"] = serde_json::json!(1);
        assert!(Configuration::from_json(&json.to_string()).is_err());
    }

    #[test]
    fn rejects_zero_sum_mutation_weights() {
        let mut json: Value = serde_json::from_str(&minimal_json()).unwrap();
        json["lexicon_mutation_weights"] = serde_json::json!({});
        json["constraint_set_mutation_weights"] = serde_json::json!({});
        assert!(Configuration::from_json(&json.to_string()).is_err());
    }

    #[test]
    fn rejects_change_segment_without_the_matching_flag() {
        let mut json: Value = serde_json::from_str(&minimal_json()).unwrap();
        json["lexicon_mutation_weights"]["change_segment"] = serde_json::json!(1);
        assert!(Configuration::from_json(&json.to_string()).is_err());
    }

    #[test]
    fn accepts_change_segment_with_the_matching_flag() {
        let mut json: Value = serde_json::from_str(&minimal_json()).unwrap();
        json["lexicon_mutation_weights"]["change_segment"] = serde_json::json!(1);
        json["allow_candidates_with_changed_segments"] = serde_json::json!(true);
        assert!(Configuration::from_json(&json.to_string()).is_ok());
    }

    #[test]
    fn rejects_min_greater_than_max() {
        let mut json: Value = serde_json::from_str(&minimal_json()).unwrap();
        json["min_constraints_in_constraint_set"] = serde_json::json!(5);
        json["max_constraints_in_constraint_set"] = serde_json::json!(2);
        assert!(Configuration::from_json(&json.to_string()).is_err());
    }

    #[test]
    fn bound_reached_by_is_always_false_for_infinite() {
        assert!(!Bound::Infinite.reached_by(u64::MAX));
        assert!(Bound::Finite(3).reached_by(3));
        assert!(!Bound::Finite(3).reached_by(2));
    }

    #[test]
    fn parses_optional_log_file_name() {
        let cfg = Configuration::from_json(&minimal_json()).unwrap();
        assert_eq!(cfg.log_file_name, None);

        let mut json: Value = serde_json::from_str(&minimal_json()).unwrap();
        json["log_file_name"] = serde_json::json!("run.log");
        let cfg = Configuration::from_json(&json.to_string()).unwrap();
        assert_eq!(cfg.log_file_name.as_deref(), Some("run.log"));
    }
}
