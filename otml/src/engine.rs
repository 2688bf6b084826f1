//! `EngineContext`: the single piece of shared, explicitly-passed state
//! threading a run together, replacing the original's global mutable
//! singletons (spec.md §9's design note) much as `vibrato::Dictionary` is
//! the one piece of state every tokenizer call carries.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Configuration;
use crate::constraint::{Constraint, ConstraintSet};
use crate::errors::Result;
use crate::features::FeatureTable;
use crate::fst::{optimal_paths, Transducer};
use crate::grammar::lexicon::Word;

/// Owns the run's [`Configuration`], its seeded PRNG, and the memoization
/// caches named in spec.md §5: compiled constraint transducers, the
/// cost-bearing folded constraint-set composite, the optimal-paths-reduced
/// constraint-set transducer (`Grammar::get_transducer`'s memoized result),
/// per-word generation results, and word input transducers.
pub struct EngineContext {
    config: Configuration,
    rng: StdRng,
    constraint_cache: HashMap<String, Transducer>,
    constraint_set_composite_cache: HashMap<String, Transducer>,
    constraint_set_cache: HashMap<String, Transducer>,
    generation_cache: HashMap<(String, String), std::collections::BTreeSet<String>>,
    word_input_cache: HashMap<String, Transducer>,
}

impl EngineContext {
    /// Builds a context, seeding the PRNG from `config.seed` unless
    /// `config.random_seed` is set, in which case a seed is drawn from
    /// entropy.
    pub fn new(config: Configuration) -> Self {
        let rng = if config.random_seed {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Self {
            config,
            rng,
            constraint_cache: HashMap::new(),
            constraint_set_composite_cache: HashMap::new(),
            constraint_set_cache: HashMap::new(),
            generation_cache: HashMap::new(),
            word_input_cache: HashMap::new(),
        }
    }

    /// The run's configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The shared PRNG, for mutation sampling.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Flushes all memoization caches, as done periodically by the
    /// annealing driver to bound memory (spec.md §4.5).
    pub fn flush_caches(&mut self) {
        self.constraint_cache.clear();
        self.constraint_set_composite_cache.clear();
        self.constraint_set_cache.clear();
        self.generation_cache.clear();
        self.word_input_cache.clear();
    }

    /// The total number of entries held across all caches, reported in
    /// periodic debug logs.
    pub fn cache_len(&self) -> usize {
        self.constraint_cache.len()
            + self.constraint_set_composite_cache.len()
            + self.constraint_set_cache.len()
            + self.generation_cache.len()
            + self.word_input_cache.len()
    }

    /// The compiled transducer for `constraint`, keyed by its canonical
    /// string and memoized across calls.
    pub fn compiled_constraint(&mut self, table: &FeatureTable, constraint: &Constraint) -> Result<Transducer> {
        let key = constraint.canonical_string();
        if let Some(t) = self.constraint_cache.get(&key) {
            return Ok(t.clone());
        }
        let t = constraint.compile(table)?;
        self.constraint_cache.insert(key, t.clone());
        Ok(t)
    }

    /// The cost-bearing fold of `set`'s constraints (spec.md §4.2's
    /// constraint-set compilation, before the optimal-paths reduction),
    /// keyed by `set`'s canonical string and memoized across calls.
    ///
    /// This is the transducer `Grammar::generate` must intersect a word's
    /// input transducer against — its states do not yet encode a concrete
    /// amount of input consumed, so reducing it on its own (as
    /// `grammar_transducer` does for `Grammar::get_transducer`) only prunes
    /// per *state*, not per input string. Once a word's input transducer is
    /// intersected in, each product state corresponds to a unique input
    /// prefix, and the per-state reduction becomes the per-input-string
    /// reduction spec.md §4.1 step 2 calls for.
    pub fn composite_constraint_set(&mut self, table: &FeatureTable, set: &ConstraintSet) -> Result<Transducer> {
        let key = set.canonical_string();
        if let Some(t) = self.constraint_set_composite_cache.get(&key) {
            return Ok(t.clone());
        }

        let mut constraints = set.constraints().iter();
        let composite = match constraints.next() {
            Some(first) => {
                let mut composite = self.compiled_constraint(table, first)?;
                for constraint in constraints {
                    let next = self.compiled_constraint(table, constraint)?;
                    composite = composite.intersect(&next)?;
                }
                composite
            }
            None => {
                let mut t = Transducer::new(table.segments(), 0);
                let q = t.set_as_single_state();
                t.add_arc(crate::fst::Arc::new(
                    q,
                    crate::features::Segment::joker(),
                    crate::features::Segment::joker(),
                    crate::fst::CostVector::empty(),
                    q,
                ))?;
                t
            }
        };

        self.constraint_set_composite_cache.insert(key, composite.clone());
        Ok(composite)
    }

    /// The compiled, optimal-paths-reduced transducer for `set`, keyed by
    /// its canonical string and memoized across calls
    /// (`Grammar::get_transducer`). Not suitable for `Grammar::generate`:
    /// see [`EngineContext::composite_constraint_set`].
    pub fn grammar_transducer(&mut self, table: &FeatureTable, set: &ConstraintSet) -> Result<Transducer> {
        let key = set.canonical_string();
        if let Some(t) = self.constraint_set_cache.get(&key) {
            return Ok(t.clone());
        }
        let composite = self.composite_constraint_set(table, set)?;
        let reduced = optimal_paths(&composite)?;
        self.constraint_set_cache.insert(key, reduced.clone());
        Ok(reduced)
    }

    /// The word's input transducer, keyed by its surface-string form and
    /// memoized across calls.
    pub fn word_input_transducer(&mut self, word: &Word) -> Transducer {
        let key = word.to_key();
        if let Some(t) = self.word_input_cache.get(&key) {
            return t.clone();
        }
        let t = word.input_transducer();
        self.word_input_cache.insert(key, t.clone());
        t
    }

    /// `Grammar::generate`'s memoized core: intersects `word`'s input
    /// transducer with `set`'s **cost-bearing** constraint-set composite
    /// (not the already-reduced `grammar_transducer`, whose costs have been
    /// collapsed to the empty vector and so carry no optimality information
    /// left to prune against a concrete input), applies the optimal-paths
    /// reduction to that per-word product — where each state now encodes a
    /// unique amount of input consumed, making the per-state relaxation
    /// exact for this input string — and enumerates the range. Memoized by
    /// `(set canonical string, word string)`.
    pub fn generate(
        &mut self,
        table: &FeatureTable,
        set: &ConstraintSet,
        word: &Word,
    ) -> Result<std::collections::BTreeSet<String>> {
        let gkey = set.canonical_string();
        let wkey = word.to_key();
        if let Some(outputs) = self.generation_cache.get(&(gkey.clone(), wkey.clone())) {
            return Ok(outputs.clone());
        }

        let composite = self.composite_constraint_set(table, set)?;
        let word_t = self.word_input_transducer(word);
        let product = word_t.intersect(&composite)?;
        let reduced = optimal_paths(&product)?;
        let outputs = reduced.range();

        self.generation_cache.insert((gkey, wkey), outputs.clone());
        Ok(outputs)
    }
}
