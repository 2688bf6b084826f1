//! `otml-cli`: loads a simulation folder and runs simulated annealing to
//! learn an Optimality-Theoretic grammar under the MDL principle.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use otml::config::Configuration;
use otml::constraint::ConstraintSet;
use otml::corpus::Corpus;
use otml::errors::{ErrorKind, OtmlError, Result};
use otml::features::FeatureTable;
use otml::grammar::{Grammar, Lexicon, Word};
use otml::{EngineContext, SimulatedAnnealing, TraversableGrammarHypothesis};
use tracing::{error, info};

/// One entry point: `otml-cli --configuration <folder>`, matching the
/// original's single-script driver (spec.md §6).
#[derive(Parser, Debug)]
#[clap(name = "otml-cli", about = "Learns an OT grammar from a simulation folder")]
struct Args {
    /// Folder containing `config.json`, `features.json`/`.csv`,
    /// `constraints.json`, and `corpus.txt`.
    #[clap(short = 'c', long)]
    configuration: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args.configuration) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                kind = err.kind().map(|k| k.to_string()).unwrap_or_else(|| "Io".to_string()),
                context = ?err.context(),
                "{err}"
            );
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(folder: &Path) -> Result<()> {
    let config = Configuration::from_json(&fs::read_to_string(folder.join("config.json"))?)?;
    init_logging(&config);

    info!(simulation = config.simulation_name.as_str(), "loading simulation folder");

    let feature_table = load_feature_table(folder)?;
    let constraints = ConstraintSet::from_json(
        &fs::read_to_string(folder.join("constraints.json"))?,
        &feature_table,
        config.min_constraints_in_constraint_set.as_usize(),
        config.max_constraints_in_constraint_set.as_usize(),
    )?;

    let corpus = Corpus::parse(&fs::read_to_string(folder.join("corpus.txt"))?)?;
    let words = corpus.duplicate(config.corpus_duplication_factor);
    let data: Vec<Word> = words.iter().map(|w| Word::from_str(w)).collect();
    let lexicon = Lexicon::new(data.clone());

    info!(num_words = data.len(), num_constraints = constraints.len(), "built initial grammar");

    let grammar = Grammar::new(feature_table, constraints, lexicon);
    let hypothesis = TraversableGrammarHypothesis::new(grammar, data);

    let mut ctx = EngineContext::new(config.clone());
    let annealing = SimulatedAnnealing::new(hypothesis, &mut ctx, &config)?;
    let result = annealing.run(&mut ctx, &config)?;

    info!(
        steps = result.steps,
        combined_energy = result.hypothesis.combined_energy(),
        num_constraints = result.hypothesis.grammar().constraints().len(),
        num_distinct_words = result.hypothesis.grammar().lexicon().get_number_of_distinct_words(),
        "learning complete"
    );
    Ok(())
}

fn load_feature_table(folder: &Path) -> Result<FeatureTable> {
    let json_path = folder.join("features.json");
    if json_path.exists() {
        return FeatureTable::from_json(&fs::read_to_string(json_path)?);
    }
    let csv_path = folder.join("features.csv");
    FeatureTable::from_csv(&fs::read_to_string(csv_path)?)
}

fn init_logging(config: &Configuration) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()));

    if let Some(log_file_name) = &config.log_file_name {
        let file_appender = tracing_appender::rolling::never(".", log_file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leaked deliberately: the guard must outlive the subscriber, and the
        // subscriber is installed for the remainder of the process.
        std::mem::forget(guard);
        let file_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false);
        let _ = registry.with(stderr_layer).with(file_layer).try_init();
    } else {
        let _ = registry.with(stderr_layer).try_init();
    }
}

/// Maps an [`OtmlError`] to a distinct non-zero process exit code, grouped
/// by the flat error taxonomy of spec.md §7.
fn exit_code(err: &OtmlError) -> u8 {
    match err.kind() {
        Some(ErrorKind::Configuration) => 1,
        Some(ErrorKind::FeatureParse) => 2,
        Some(ErrorKind::GrammarParse) => 3,
        Some(ErrorKind::Constraint) => 4,
        Some(ErrorKind::CostVectorOperation) => 5,
        Some(ErrorKind::Transducer) => 6,
        Some(ErrorKind::TransducerOptimization) => 7,
        None => 70,
    }
}
