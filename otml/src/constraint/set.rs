//! A ranked, size-bounded sequence of constraints and its compilation into
//! a single lexicographically-weighted transducer.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Deserialize;

use crate::constraint::Constraint;
use crate::errors::{OtmlError, Result};
use crate::features::{Feature, FeatureBundle, FeatureTable};
use crate::fst::Transducer;

/// Raw JSON shape of one entry in `constraints.json`: a family name plus
/// zero or more feature-bundle descriptors.
#[derive(Debug, Deserialize)]
struct RawConstraintDescriptor {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    bundles: Vec<BTreeMap<String, String>>,
}

/// An ordered list of constraints with a size invariant
/// (`min_constraints..=max_constraints`) and no duplicate instances.
///
/// Rank is position: index 0 dominates index 1, and so on. Compilation
/// folds each constraint's transducer into the running product via
/// [`Transducer::intersect`], growing the composite's cost-vector width by
/// one per constraint so that path cost becomes a vector ordered by rank.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
    min_constraints: usize,
    max_constraints: usize,
}

impl ConstraintSet {
    /// Builds a constraint set, validating the size invariant and the
    /// no-duplicates rule.
    pub fn new(constraints: Vec<Constraint>, min_constraints: usize, max_constraints: usize) -> Result<Self> {
        if constraints.len() < min_constraints || constraints.len() > max_constraints {
            return Err(OtmlError::configuration(format!(
                "constraint set has {} constraints, expected {min_constraints}..={max_constraints}",
                constraints.len()
            )));
        }
        for (i, a) in constraints.iter().enumerate() {
            for b in &constraints[i + 1..] {
                if a == b {
                    return Err(OtmlError::configuration("duplicate constraint in constraint set"));
                }
            }
        }
        Ok(Self {
            constraints,
            min_constraints,
            max_constraints,
        })
    }

    /// Loads a ranked constraint list from a `constraints.json` payload:
    /// `[{"type": "Max", "bundles": [{feature: value, ...}]}, ...]`, rank
    /// given by list position (spec.md §6).
    pub fn from_json(data: &str, table: &FeatureTable, min_constraints: usize, max_constraints: usize) -> Result<Self> {
        let raw: Vec<RawConstraintDescriptor> = serde_json::from_str(data)?;
        let constraints = raw
            .into_iter()
            .map(|d| {
                let bundles = d
                    .bundles
                    .into_iter()
                    .map(|assignments| FeatureBundle::new(assignments, table))
                    .collect::<Result<Vec<_>>>()?;
                Constraint::from_descriptor(&d.kind, bundles)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(constraints, min_constraints, max_constraints)
    }

    /// The constraints, in rank order (index 0 = highest ranked).
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The number of constraints currently in the set.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the set holds no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Folds every constraint's transducer into a single composite whose
    /// path cost is a vector ordered by rank, clearing dead states after
    /// each fold step. Does not apply the optimal-paths reduction; callers
    /// that want the OT-optimal relation should reduce the result (see
    /// `Grammar::get_transducer`).
    pub fn compile(&self, table: &FeatureTable) -> Result<Transducer> {
        let mut iter = self.constraints.iter();
        let Some(first) = iter.next() else {
            let mut t = Transducer::new(table.segments(), 0);
            let q = t.set_as_single_state();
            t.add_arc(crate::fst::Arc::new(
                q,
                crate::features::Segment::joker(),
                crate::features::Segment::joker(),
                crate::fst::CostVector::empty(),
                q,
            ))?;
            return Ok(t);
        };
        let mut composite = first.compile(table)?;
        for constraint in iter {
            let next = constraint.compile(table)?;
            composite = composite.intersect(&next)?;
        }
        Ok(composite)
    }

    /// A deterministic key over rank-ordered constraint descriptors, used
    /// to memoize compiled constraint-set transducers.
    pub fn canonical_string(&self) -> String {
        self.constraints
            .iter()
            .map(Constraint::canonical_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// The constraint-set portion of the grammar's MDL encoding length
    /// (spec.md §4.4): the sum of each constraint's own encoding length.
    pub fn encoding_length(&self) -> usize {
        self.constraints.iter().map(Constraint::encoding_length).sum()
    }

    /// Inserts a randomly generated constraint of `family` at a random
    /// rank, drawing `bundle_count` feature bundles (1 for `Max`/`Dep`/
    /// `Ident`, 0 for `Faith`, `initial_number_of_bundles_in_phonotactic_constraint`
    /// for `Phonotactic`) each with `feature_count` feature/value pairs.
    /// Fails (returns `false`) if the set is already at `max_constraints`.
    pub fn insert(
        &mut self,
        rng: &mut impl Rng,
        family: &str,
        table: &FeatureTable,
        bundle_count: usize,
        feature_count: usize,
    ) -> bool {
        if self.constraints.len() >= self.max_constraints {
            return false;
        }
        let Some(constraint) = random_constraint(rng, family, table, bundle_count, feature_count) else {
            return false;
        };
        if self.constraints.contains(&constraint) {
            return false;
        }
        let rank = rng.gen_range(0..=self.constraints.len());
        self.constraints.insert(rank, constraint);
        true
    }

    /// Removes a random constraint, provided doing so keeps the set at or
    /// above `min_constraints`.
    pub fn remove(&mut self, rng: &mut impl Rng) -> bool {
        if self.constraints.len() <= self.min_constraints {
            return false;
        }
        let idx = rng.gen_range(0..self.constraints.len());
        self.constraints.remove(idx);
        true
    }

    /// Swaps a random constraint with the one immediately below it in
    /// rank. Fails if fewer than two constraints are present.
    pub fn demote(&mut self, rng: &mut impl Rng) -> bool {
        if self.constraints.len() < 2 {
            return false;
        }
        let idx = rng.gen_range(0..self.constraints.len() - 1);
        self.constraints.swap(idx, idx + 1);
        true
    }

    /// Inserts a random feature bundle into a random `Phonotactic`
    /// constraint's sequence, honoring `max_feature_bundles_in_phonotactic_constraint`.
    /// If `random_position`, the bundle is inserted at a random index;
    /// otherwise it is appended.
    pub fn insert_feature_bundle_phonotactic(
        &mut self,
        rng: &mut impl Rng,
        table: &FeatureTable,
        feature_count: usize,
        max_bundles: usize,
        random_position: bool,
    ) -> bool {
        let Some(idx) = self.random_phonotactic_index(rng) else {
            return false;
        };
        let Constraint::Phonotactic(bundles) = &mut self.constraints[idx] else {
            unreachable!("random_phonotactic_index only returns Phonotactic indices");
        };
        if bundles.len() >= max_bundles {
            return false;
        }
        let Some(bundle) = random_bundle(rng, table, feature_count) else {
            return false;
        };
        let at = if random_position {
            rng.gen_range(0..=bundles.len())
        } else {
            bundles.len()
        };
        bundles.insert(at, bundle);
        true
    }

    /// Removes a random feature bundle from a random `Phonotactic`
    /// constraint's sequence, honoring `min_feature_bundles_in_phonotactic_constraint`.
    pub fn remove_feature_bundle_phonotactic(
        &mut self,
        rng: &mut impl Rng,
        min_bundles: usize,
        random_position: bool,
    ) -> bool {
        let Some(idx) = self.random_phonotactic_index(rng) else {
            return false;
        };
        let Constraint::Phonotactic(bundles) = &mut self.constraints[idx] else {
            unreachable!("random_phonotactic_index only returns Phonotactic indices");
        };
        if bundles.len() <= min_bundles {
            return false;
        }
        let at = if random_position {
            rng.gen_range(0..bundles.len())
        } else {
            bundles.len() - 1
        };
        bundles.remove(at);
        true
    }

    /// Adds one more feature/value pair to a random constraint's (first)
    /// bundle, honoring `max_features_in_bundle`. Implemented per spec.md
    /// §9 Open Question (b); left disabled by a zero weight in default
    /// configurations (see `otml::config`), so the gap the source leaves
    /// undocumented never activates unless a configuration opts in.
    pub fn augment_feature_bundle(&mut self, rng: &mut impl Rng, table: &FeatureTable, max_features: usize) -> bool {
        let candidates: Vec<usize> = (0..self.constraints.len())
            .filter(|&i| !self.constraints[i].bundles().is_empty())
            .collect();
        if candidates.is_empty() {
            return false;
        }
        let idx = candidates[rng.gen_range(0..candidates.len())];
        let bundle = match &mut self.constraints[idx] {
            Constraint::Max(b) | Constraint::Dep(b) | Constraint::Ident(b) => b,
            Constraint::Phonotactic(bs) if !bs.is_empty() => {
                let n = bs.len();
                &mut bs[rng.gen_range(0..n)]
            }
            _ => return false,
        };
        if bundle.len() >= max_features {
            return false;
        }
        let unused: Vec<&Feature> = table.features().iter().filter(|f| bundle.iter().all(|(l, _)| l != f.label)).collect();
        if unused.is_empty() {
            return false;
        }
        let feature = unused[rng.gen_range(0..unused.len())];
        let value = &feature.values[rng.gen_range(0..feature.values.len())];
        bundle.insert(feature.label.clone(), value.clone());
        true
    }

    fn random_phonotactic_index(&self, rng: &mut impl Rng) -> Option<usize> {
        let indices: Vec<usize> = self
            .constraints
            .iter()
            .enumerate()
            .filter_map(|(i, c)| matches!(c, Constraint::Phonotactic(_)).then_some(i))
            .collect();
        if indices.is_empty() {
            return None;
        }
        Some(indices[rng.gen_range(0..indices.len())])
    }
}

fn random_bundle(rng: &mut impl Rng, table: &FeatureTable, feature_count: usize) -> Option<FeatureBundle> {
    let features = table.features();
    if features.is_empty() || feature_count == 0 {
        return FeatureBundle::new(std::collections::BTreeMap::new(), table).ok();
    }
    let count = feature_count.min(features.len());
    let mut chosen: Vec<&Feature> = Vec::new();
    let mut pool: Vec<&Feature> = features.iter().collect();
    for _ in 0..count {
        let i = rng.gen_range(0..pool.len());
        chosen.push(pool.remove(i));
    }
    let mut assignments = std::collections::BTreeMap::new();
    for feature in chosen {
        let value = &feature.values[rng.gen_range(0..feature.values.len())];
        assignments.insert(feature.label.clone(), value.clone());
    }
    FeatureBundle::new(assignments, table).ok()
}

fn random_constraint(
    rng: &mut impl Rng,
    family: &str,
    table: &FeatureTable,
    bundle_count: usize,
    feature_count: usize,
) -> Option<Constraint> {
    match family {
        "Max" => Some(Constraint::Max(random_bundle(rng, table, feature_count)?)),
        "Dep" => Some(Constraint::Dep(random_bundle(rng, table, feature_count)?)),
        "Ident" => Some(Constraint::Ident(random_bundle(rng, table, feature_count)?)),
        "Faith" => Some(Constraint::Faith),
        "Phonotactic" => {
            let bundles: Option<Vec<FeatureBundle>> = (0..bundle_count.max(1))
                .map(|_| random_bundle(rng, table, feature_count))
                .collect();
            Some(Constraint::Phonotactic(bundles?))
        }
        _ => None,
    }
}
