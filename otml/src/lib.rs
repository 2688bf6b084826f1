//! `otml`: an Optimality-Theoretic phonological grammar learner.
//!
//! A grammar is a ranked [`constraint::ConstraintSet`] paired with a
//! [`grammar::Lexicon`] of underlying word forms, generating surface forms
//! through the intersection of weighted finite-state transducers
//! ([`fst`]). Learning searches grammar space by simulated annealing
//! ([`anneal`]), scoring each candidate by its Minimum Description Length
//! ([`hypothesis`]) against an observed [`corpus::Corpus`].
#![deny(missing_docs)]

#[cfg(target_pointer_width = "16")]
compile_error!("`target_pointer_width` must be larger than or equal to 32");

pub mod anneal;
pub mod config;
pub mod constraint;
pub mod corpus;
pub mod dot;
pub mod engine;
pub mod errors;
pub mod features;
pub mod fst;
pub mod grammar;
pub mod hypothesis;

pub use anneal::{AnnealResult, SimulatedAnnealing};
pub use config::Configuration;
pub use corpus::Corpus;
pub use engine::EngineContext;
pub use errors::{OtmlError, Result};
pub use grammar::Grammar;
pub use hypothesis::TraversableGrammarHypothesis;
