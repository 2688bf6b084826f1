//! The simulated-annealing driver (spec.md §4.5).
//!
//! A tight, single-threaded, cooperative loop: cool the temperature,
//! propose one structured mutation, accept or reject it under the
//! Metropolis criterion, and periodically log progress and flush the
//! engine's memoization caches. Grounded in
//! `original_source/src/simulated_annealing.py`'s `SimulatedAnnealing`
//! class, restructured around an explicit [`EngineContext`] instead of
//! module-level globals.

use rand::Rng;
use tracing::info;

use crate::config::Configuration;
use crate::engine::EngineContext;
use crate::errors::{OtmlError, Result};
use crate::hypothesis::{TraversableGrammarHypothesis, INFINITE_ENERGY};

/// Drives simulated annealing over a sequence of [`TraversableGrammarHypothesis`]
/// neighbors, from an initial hypothesis down to a temperature threshold.
pub struct SimulatedAnnealing {
    current: TraversableGrammarHypothesis,
    temperature: f64,
    threshold: f64,
    cooling_factor: f64,
    step: u64,
    steps_limitation: crate::config::Bound,
    expected_steps: u64,
}

/// The outcome of a completed annealing run.
pub struct AnnealResult {
    /// The number of steps actually taken.
    pub steps: u64,
    /// The final accepted hypothesis.
    pub hypothesis: TraversableGrammarHypothesis,
}

impl SimulatedAnnealing {
    /// Builds a driver over `initial`, computing its starting energy.
    /// Fails with [`OtmlError::configuration`] if the first hypothesis has
    /// infinite energy (spec.md §4.5/§7: "first hypothesis with infinite
    /// energy" is a fatal configuration error).
    pub fn new(mut initial: TraversableGrammarHypothesis, ctx: &mut EngineContext, config: &Configuration) -> Result<Self> {
        let energy = initial.update_energy(ctx, config)?;
        if energy >= INFINITE_ENERGY {
            return Err(OtmlError::configuration(
                "first hypothesis energy is infinite: no grammar/lexicon parse covers the corpus",
            ));
        }

        let expected_steps = match config.steps_limitation {
            crate::config::Bound::Finite(n) => n,
            crate::config::Bound::Infinite => expected_step_count(config),
        };
        info!(expected_steps, "annealing run initialized");

        Ok(Self {
            current: initial,
            temperature: config.initial_temp,
            threshold: config.threshold,
            cooling_factor: config.cooling_factor,
            step: 0,
            steps_limitation: config.steps_limitation,
            expected_steps,
        })
    }

    /// The current step count.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// The current temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// The currently accepted hypothesis.
    pub fn current(&self) -> &TraversableGrammarHypothesis {
        &self.current
    }

    /// Runs the cooling loop to completion (`T ≤ threshold` or
    /// `step == steps_limitation`), logging progress every
    /// `debug_logging_interval` steps and flushing the engine's caches
    /// every `clear_modules_caching_interval` steps.
    pub fn run(mut self, ctx: &mut EngineContext, config: &Configuration) -> Result<AnnealResult> {
        while self.temperature > self.threshold && !self.steps_limitation.reached_by(self.step) {
            self.make_step(ctx, config)?;

            if config.debug_logging_interval > 0 && self.step % config.debug_logging_interval == 0 {
                self.log_progress(config);
            }
            if config.clear_modules_caching_interval > 0 && self.step % config.clear_modules_caching_interval == 0 {
                ctx.flush_caches();
            }
        }

        info!(
            steps = self.step,
            combined_energy = self.current.combined_energy(),
            "annealing run complete"
        );
        Ok(AnnealResult {
            steps: self.step,
            hypothesis: self.current,
        })
    }

    /// Executes a single annealing step: cools the temperature, proposes
    /// one neighbor via a single mutation, and accepts it under the
    /// Metropolis criterion. A mutation that fails to change state leaves
    /// `current` untouched but still counts as a step and still cools the
    /// temperature, matching the original's `make_step`.
    pub fn make_step(&mut self, ctx: &mut EngineContext, config: &Configuration) -> Result<()> {
        self.step += 1;
        self.temperature *= self.cooling_factor;

        let (changed, mut neighbor) = self.current.get_neighbor(ctx);
        if !changed {
            return Ok(());
        }

        let neighbor_energy = neighbor.update_energy(ctx, config)?;
        let current_energy = self.current.combined_energy();
        let delta = (neighbor_energy as f64) - (current_energy as f64);

        let accept_probability = if delta < 0.0 { 1.0 } else { (-delta / self.temperature).exp() };
        if ctx.rng().gen_range(0.0..1.0) < accept_probability {
            self.current = neighbor;
        }
        Ok(())
    }

    fn log_progress(&self, config: &Configuration) {
        let percentage = 100.0 * (self.step as f64) / (self.expected_steps.max(1) as f64);
        info!(
            step = self.step,
            expected_steps = self.expected_steps,
            percentage,
            temperature = self.temperature,
            grammar_energy = self.current.grammar_energy(),
            data_energy = self.current.data_energy(),
            combined_energy = self.current.combined_energy(),
            num_constraints = self.current.grammar().constraints().len(),
            num_words = self.current.grammar().lexicon().len(),
            "annealing progress"
        );
        if config.log_lexicon_words {
            let words: Vec<String> = self.current.grammar().lexicon().words().iter().map(|w| w.to_key()).collect();
            info!(?words, "current lexicon");
        }
    }
}

/// Pre-computes the number of cooling steps a run with no `steps_limitation`
/// will take, so progress logging can report a percentage
/// (`_calculate_num_of_steps` in the original).
fn expected_step_count(config: &Configuration) -> u64 {
    let mut steps = 0u64;
    let mut temp = config.initial_temp;
    while temp > config.threshold {
        steps += 1;
        temp *= config.cooling_factor;
        if steps > 100_000_000 {
            break;
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, ConstraintSet};
    use crate::features::{Feature, FeatureTable};
    use crate::grammar::{Grammar, Lexicon, Word};
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

    fn config_json(initial_temp: &str, threshold: &str, steps_limitation: &str) -> String {
        format!(
            r#"{{
            "simulation_name": "t",
            "max_constraints_in_constraint_set": "inf",
            "min_constraints_in_constraint_set": 1,
            "max_feature_bundles_in_phonotactic_constraint": 3,
            "min_feature_bundles_in_phonotactic_constraint": 1,
            "max_features_in_bundle": 2,
            "initial_number_of_features": 1,
            "initial_number_of_bundles_in_phonotactic_constraint": 1,
            "lexicon_mutation_weights": {{"insert_segment": 1, "delete_segment": 1}},
            "constraint_set_mutation_weights": {{"insert": 1}},
            "constraint_insertion_weights": {{"Max": 1, "Faith": 1}},
            "initial_temp": {initial_temp},
            "threshold": {threshold},
            "cooling_factor": 0.9,
            "debug_logging_interval": 10,
            "clear_modules_caching_interval": 10,
            "steps_limitation": {steps_limitation},
            "seed": 7,
            "data_encoding_length_multiplier": 1,
            "grammar_encoding_length_multiplier": 1
        }}"#
        )
    }

    fn fresh_hypothesis() -> (Grammar, Vec<Word>) {
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("ab")]);
        (Grammar::new(table, constraints, lexicon), vec![Word::from_str("ab")])
    }

    #[test]
    fn zero_steps_when_initial_temp_at_or_below_threshold() {
        let config = Configuration::from_json(&config_json("1", "1", "\"inf\"")).unwrap();
        let mut ctx = EngineContext::new(config.clone());
        let (grammar, data) = fresh_hypothesis();
        let hyp = TraversableGrammarHypothesis::new(grammar, data);
        let initial_energy = {
            let mut probe = hyp.clone();
            probe.update_energy(&mut ctx, &config).unwrap()
        };

        let driver = SimulatedAnnealing::new(hyp, &mut ctx, &config).unwrap();
        let result = driver.run(&mut ctx, &config).unwrap();
        assert_eq!(result.steps, 0);
        assert_eq!(result.hypothesis.combined_energy(), initial_energy);
    }

    #[test]
    fn identical_seed_and_config_reproduce_the_trajectory() {
        let config = Configuration::from_json(&config_json("50", "1", "30")).unwrap();

        let run_once = || {
            let mut ctx = EngineContext::new(config.clone());
            let (grammar, data) = fresh_hypothesis();
            let hyp = TraversableGrammarHypothesis::new(grammar, data);
            let driver = SimulatedAnnealing::new(hyp, &mut ctx, &config).unwrap();
            driver.run(&mut ctx, &config).unwrap()
        };

        let a = run_once();
        let b = run_once();
        assert_eq!(a.steps, b.steps);
        assert_eq!(a.hypothesis.combined_energy(), b.hypothesis.combined_energy());
        assert_eq!(
            a.hypothesis.grammar().constraints().canonical_string(),
            b.hypothesis.grammar().constraints().canonical_string()
        );
    }

    #[test]
    fn steps_limitation_caps_the_run() {
        let config = Configuration::from_json(&config_json("1000", "0.001", "5")).unwrap();
        let mut ctx = EngineContext::new(config.clone());
        let (grammar, data) = fresh_hypothesis();
        let hyp = TraversableGrammarHypothesis::new(grammar, data);
        let driver = SimulatedAnnealing::new(hyp, &mut ctx, &config).unwrap();
        let result = driver.run(&mut ctx, &config).unwrap();
        assert_eq!(result.steps, 5);
    }

    #[test]
    fn first_hypothesis_with_infinite_energy_is_rejected() {
        let config = Configuration::from_json(&config_json("50", "1", "30")).unwrap();
        let mut ctx = EngineContext::new(config.clone());
        let table = binary_table();
        let constraints = ConstraintSet::new(vec![Constraint::Faith], 1, 10).unwrap();
        let lexicon = Lexicon::new(vec![Word::from_str("ab")]);
        let grammar = Grammar::new(table, constraints, lexicon);
        // "ba" can never be produced by a lexicon containing only "ab".
        let hyp = TraversableGrammarHypothesis::new(grammar, vec![Word::from_str("ba")]);
        assert!(SimulatedAnnealing::new(hyp, &mut ctx, &config).is_err());
    }
}
