use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use autobyte_core::conditioner::Conditioner;
use autobyte_core::config::{FeatureKind, RunConfig};
use autobyte_core::corpus::{self, DirCorpusLoader};
use autobyte_core::ensemble::Ensemble;
use autobyte_core::generator::Generator;
use autobyte_core::histogram::SymbolHistogram;
use autobyte_core::tensor::seeded_rng;
use autobyte_core::trainer::Trainer;
use autobyte_core::Result;

/// Train the per-symbol autoencoder ensemble on a corpus, then sample from it.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the corpus sources
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Source names to load (repeatable); replaces the configured list
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Index of the source to train and generate with
    #[arg(long)]
    train_source: Option<usize>,

    /// Markov order
    #[arg(long)]
    order: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Bytes of the training source to consume (0 = all)
    #[arg(long)]
    max_train_bytes: Option<usize>,

    /// Generation seed text
    #[arg(short, long)]
    prompt: Option<String>,

    /// Bytes to generate after the prompt
    #[arg(short = 'n', long)]
    steps: Option<usize>,

    /// Feature source
    #[arg(long, value_parser = ["markov", "histogram"])]
    feature: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(dir) = self.corpus_dir {
            cfg.corpus_dir = dir;
        }
        if !self.sources.is_empty() {
            cfg.sources = self.sources;
        }
        if let Some(i) = self.train_source {
            cfg.train_source = i;
        }
        if let Some(order) = self.order {
            cfg.order = order;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(n) = self.max_train_bytes {
            cfg.max_train_bytes = n;
        }
        if let Some(prompt) = self.prompt {
            cfg.prompt = prompt;
        }
        if let Some(steps) = self.steps {
            cfg.generate_steps = steps;
        }
        match self.feature.as_deref() {
            Some("histogram") => cfg.feature = FeatureKind::Histogram,
            Some(_) => cfg.feature = FeatureKind::Markov,
            None => {}
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run(cfg: RunConfig) -> Result<()> {
    let loader = DirCorpusLoader::new(&cfg.corpus_dir);
    let corpora = corpus::load_all(&loader, &cfg.sources, cfg.order, cfg.alphabet)?;
    let train = &corpora[cfg.train_source];

    let mut rng = seeded_rng(cfg.seed);
    let mut ensemble = Ensemble::new(cfg.autoencoder(), cfg.adam(), &mut rng);
    info!(
        networks = ensemble.len(),
        params_per_network = ensemble.params(0).num_params(),
        "ensemble initialised"
    );

    let mut conditioner: Box<dyn Conditioner + '_> = match cfg.feature {
        FeatureKind::Markov => Box::new(train.model.conditioner()),
        FeatureKind::Histogram => Box::new(SymbolHistogram::new(cfg.histogram_window, cfg.alphabet)),
    };

    let mut trainer = Trainer::new(cfg.max_train_bytes);
    let report = trainer.train(&mut ensemble, conditioner.as_mut(), &train.data)?;
    info!(corpus = %train.name, iterations = report.iterations, skipped = report.skipped, "training done");

    let mut generator = Generator::new(rng);
    let text = generator.generate(
        &ensemble,
        conditioner.as_mut(),
        cfg.prompt.as_bytes(),
        cfg.generate_steps,
    )?;
    println!("{}", String::from_utf8_lossy(&text));
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = Args::parse().into_config().and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
