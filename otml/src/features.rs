//! Feature table and segment algebra.
//!
//! Pure data: a phonological alphabet is a set of [`Segment`] symbols, each
//! carrying a complete assignment of values to every declared [`Feature`].
//! Two symbols are reserved outside the table — [`NULL_SEGMENT`] (epsilon)
//! and [`JOKER_SEGMENT`] (wildcard) — and never appear in a lexicon or
//! corpus.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::errors::{OtmlError, Result};

/// The reserved epsilon / deletion symbol.
pub const NULL_SEGMENT: &str = "\u{2205}";

/// The reserved wildcard symbol used during transducer composition.
pub const JOKER_SEGMENT: &str = "*";

/// A feature label and its ordered set of admissible values.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Feature {
    /// The feature's label, e.g. `"cons"`.
    pub label: String,
    /// The admissible values for this feature, in declaration order.
    pub values: Vec<String>,
}

impl Feature {
    /// Returns whether `value` is admissible for this feature.
    pub fn admits(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Raw JSON shape of `features.json`.
#[derive(Debug, Deserialize)]
struct RawFeatureTable {
    feature: Vec<Feature>,
    feature_table: BTreeMap<String, Vec<String>>,
}

/// A collection of [`Feature`]s plus a segment-symbol → feature-value map.
///
/// Invariants: every segment has one value for every feature; every value
/// is admissible for its feature.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    features: Vec<Feature>,
    segment_features: BTreeMap<String, Vec<String>>,
}

impl FeatureTable {
    /// Builds a feature table from a parsed feature list and per-segment
    /// value vectors, validating the invariants described in spec.md §3.
    pub fn new(features: Vec<Feature>, segment_values: BTreeMap<String, Vec<String>>) -> Result<Self> {
        for (symbol, values) in &segment_values {
            if symbol == NULL_SEGMENT || symbol == JOKER_SEGMENT {
                return Err(OtmlError::feature_parse(format!(
                    "segment symbol {symbol} collides with a reserved symbol"
                )));
            }
            if values.len() != features.len() {
                return Err(OtmlError::feature_parse(format!(
                    "segment {symbol} has {} feature values, expected {}",
                    values.len(),
                    features.len()
                )));
            }
            for (feature, value) in features.iter().zip(values.iter()) {
                if !feature.admits(value) {
                    return Err(OtmlError::feature_parse(format!(
                        "segment {symbol} has value {value} not admissible for feature {}",
                        feature.label
                    )));
                }
            }
        }
        Ok(Self {
            features,
            segment_features: segment_values,
        })
    }

    /// Loads a feature table from a `features.json` payload.
    pub fn from_json(data: &str) -> Result<Self> {
        let raw: RawFeatureTable = serde_json::from_str(data)?;
        Self::new(raw.feature, raw.feature_table.into_iter().collect())
    }

    /// Loads a feature table from a `features.csv` payload: a header row of
    /// feature labels (first cell blank) followed by one row per segment.
    /// Values are assumed binary (`-`/`+`), matching the original tool's
    /// CSV convention. Parsed with the `csv` crate rather than hand-rolled
    /// splitting (the cells themselves are bare tokens, so no quoting
    /// behavior is exercised, but reading through `csv::Reader` keeps this
    /// loader consistent with the rest of the pack's tabular-data parsing).
    pub fn from_csv(data: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(data.as_bytes());

        let header = reader.headers()?.clone();
        let features: Vec<Feature> = header
            .iter()
            .skip(1) // blank corner cell
            .map(|label| Feature {
                label: label.trim().to_string(),
                values: vec!["-".to_string(), "+".to_string()],
            })
            .collect();

        let mut segment_values = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let mut cols = record.iter();
            let symbol = cols
                .next()
                .ok_or_else(|| OtmlError::feature_parse("missing segment symbol in features.csv row"))?
                .trim()
                .to_string();
            if symbol.is_empty() {
                continue;
            }
            let values: Vec<String> = cols.map(|v| v.trim().to_string()).collect();
            segment_values.insert(symbol, values);
        }
        Self::new(features, segment_values)
    }

    /// The number of declared features.
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// The declared features, in table order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Returns whether `label` names a declared feature.
    pub fn is_valid_feature(&self, label: &str) -> bool {
        self.features.iter().any(|f| f.label == label)
    }

    /// The alphabet: every segment symbol declared in the table, excluding
    /// the reserved [`NULL_SEGMENT`]/[`JOKER_SEGMENT`].
    pub fn alphabet(&self) -> Vec<&str> {
        self.segment_features.keys().map(String::as_str).collect()
    }

    /// All alphabet segments as owned [`Segment`] handles.
    pub fn segments(&self) -> Vec<Segment> {
        self.alphabet().into_iter().map(Segment::concrete).collect()
    }

    /// The feature-value assignment for `symbol`, if it is a declared
    /// segment.
    pub fn values_of(&self, symbol: &str) -> Option<&[String]> {
        self.segment_features.get(symbol).map(Vec::as_slice)
    }

    /// Returns whether `symbol` satisfies `bundle`: agrees with every
    /// feature present in the bundle.
    pub fn satisfies(&self, symbol: &str, bundle: &FeatureBundle) -> bool {
        let Some(values) = self.segment_features.get(symbol) else {
            return false;
        };
        bundle.assignments.iter().all(|(label, required)| {
            self.features
                .iter()
                .position(|f| &f.label == label)
                .and_then(|idx| values.get(idx))
                .is_some_and(|v| v == required)
        })
    }
}

impl fmt::Display for FeatureTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Feature Table with {} features and {} segments:",
            self.features.len(),
            self.segment_features.len()
        )?;
        for symbol in self.segment_features.keys() {
            write!(f, "{symbol:8}")?;
            for value in &self.segment_features[symbol] {
                write!(f, "{value:6}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A partial feature-value predicate over segments: a segment *satisfies*
/// the bundle iff it agrees on every feature present.
///
/// Invariant: every feature label in the bundle is declared in the
/// [`FeatureTable`] it is used against.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct FeatureBundle {
    assignments: BTreeMap<String, String>,
}

impl FeatureBundle {
    /// Builds a bundle from label→value pairs, validating that every label
    /// is declared in `table`.
    pub fn new(assignments: BTreeMap<String, String>, table: &FeatureTable) -> Result<Self> {
        for label in assignments.keys() {
            if !table.is_valid_feature(label) {
                return Err(OtmlError::grammar_parse(format!(
                    "feature bundle references undeclared feature {label}"
                )));
            }
        }
        Ok(Self { assignments })
    }

    /// The number of feature/value pairs in the bundle, used by the MDL
    /// scorer (`2 * |features|` per constraint; see spec.md §4.4).
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Whether the bundle specifies no features.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Iterates the bundle's label/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Adds (or overwrites) one feature assignment, honoring
    /// `max_features_in_bundle` at the call site (see
    /// [`crate::constraint::ConstraintSet::augment_feature_bundle`]).
    pub fn insert(&mut self, label: String, value: String) {
        self.assignments.insert(label, value);
    }
}

impl fmt::Display for FeatureBundle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, (label, value)) in self.assignments.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}{label}")?;
        }
        Ok(())
    }
}

/// A segment handle: either a concrete alphabet symbol or one of the two
/// reserved symbols [`NULL_SEGMENT`]/[`JOKER_SEGMENT`].
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Segment(String);

impl Segment {
    /// Wraps a concrete alphabet symbol.
    pub fn concrete(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// The reserved epsilon segment.
    pub fn null() -> Self {
        Self(NULL_SEGMENT.to_string())
    }

    /// The reserved wildcard segment.
    pub fn joker() -> Self {
        Self(JOKER_SEGMENT.to_string())
    }

    /// The underlying symbol string.
    pub fn symbol(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved epsilon segment.
    pub fn is_null(&self) -> bool {
        self.0 == NULL_SEGMENT
    }

    /// Whether this is the reserved wildcard segment.
    pub fn is_joker(&self) -> bool {
        self.0 == JOKER_SEGMENT
    }

    /// Symbol unification under Riggle (2004) rule (17): `JOKER` unifies
    /// with anything; `NULL` unifies only with `NULL`; otherwise identity.
    /// Returns the unified segment, or `None` if unification fails.
    pub fn unify(&self, other: &Segment) -> Option<Segment> {
        if self.is_joker() {
            return Some(other.clone());
        }
        if other.is_joker() {
            return Some(self.clone());
        }
        if self.is_null() || other.is_null() {
            return (self.is_null() && other.is_null()).then(|| Segment::null());
        }
        (self == other).then(|| self.clone())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_builds_a_validated_table() {
        let json = r#"{
            "feature": [{"label": "cons", "values": ["-", "+"]}],
            "feature_table": {"a": ["-"], "b": ["+"]}
        }"#;
        let table = FeatureTable::from_json(json).unwrap();
        assert_eq!(table.num_features(), 1);
        assert_eq!(table.alphabet().len(), 2);
    }

    #[test]
    fn from_json_rejects_value_outside_declared_set() {
        let json = r#"{
            "feature": [{"label": "cons", "values": ["-", "+"]}],
            "feature_table": {"a": ["0"]}
        }"#;
        assert!(FeatureTable::from_json(json).is_err());
    }

    #[test]
    fn from_csv_parses_header_and_segment_rows() {
        let csv = ",cons,voice\na,-,+\nb,+,-\n";
        let table = FeatureTable::from_csv(csv).unwrap();
        assert_eq!(table.num_features(), 2);
        assert_eq!(table.values_of("a"), Some(&["-".to_string(), "+".to_string()][..]));
        assert_eq!(table.values_of("b"), Some(&["+".to_string(), "-".to_string()][..]));
    }

    #[test]
    fn reserved_symbols_cannot_be_declared_segments() {
        let json = r#"{
            "feature": [{"label": "cons", "values": ["-", "+"]}],
            "feature_table": {"*": ["-"]}
        }"#;
        assert!(FeatureTable::from_json(json).is_err());
    }

    #[test]
    fn unify_joker_with_anything_yields_the_other() {
        let a = Segment::concrete("a");
        assert_eq!(Segment::joker().unify(&a), Some(a.clone()));
        assert_eq!(a.unify(&Segment::joker()), Some(a.clone()));
    }

    #[test]
    fn unify_null_only_with_null() {
        assert_eq!(Segment::null().unify(&Segment::null()), Some(Segment::null()));
        assert_eq!(Segment::null().unify(&Segment::concrete("a")), None);
    }

    #[test]
    fn unify_distinct_concrete_segments_fails() {
        assert_eq!(Segment::concrete("a").unify(&Segment::concrete("b")), None);
    }

    #[test]
    fn feature_bundle_rejects_undeclared_feature() {
        let table = FeatureTable::new(
            vec![Feature {
                label: "cons".to_string(),
                values: vec!["-".to_string(), "+".to_string()],
            }],
            BTreeMap::new(),
        )
        .unwrap();
        let mut assignments = BTreeMap::new();
        assignments.insert("voice".to_string(), "+".to_string());
        assert!(FeatureBundle::new(assignments, &table).is_err());
    }
}
