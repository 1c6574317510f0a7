use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;

use pcfg_core::enumerate::{Checkpoint, Sampler};
use pcfg_core::grammar::DEFAULT_MAX_LENGTH;
use pcfg_core::io::{normalize_folder, ruleset_path};
use pcfg_core::{load_ruleset, Driver, EmitError, LoadError, LoadOptions, TerminationPolicy};

/// Exit status when the output cannot be written.
const SINK_FAILURE: u8 = 4;

/// Generates password guesses from a trained PCFG ruleset, most probable first.
#[derive(Parser, Debug)]
#[command(name = "pcfg-guesser", version, about)]
struct Cli {
    /// Name of the ruleset to load
    #[arg(short, long, default_value = "Default")]
    rule: String,

    /// Directory holding the rulesets
    #[arg(long, default_value = "Rules")]
    rules_root: String,

    /// Stop before the first guess below this probability
    #[arg(short = 'p', long)]
    min_probability: Option<f64>,

    /// Stop after this many guesses
    #[arg(short = 'n', long)]
    max_guesses: Option<u64>,

    /// Stop after this many pre-terminals
    #[arg(long)]
    max_preterminals: Option<u64>,

    /// Write the guesses to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ignore terminals longer than this
    #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
    max_length: usize,

    /// Do not read or write the compiled grammar
    #[arg(long)]
    no_cache: bool,

    /// Continue the session saved in this checkpoint
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Save the session state here when done
    #[arg(long)]
    save_checkpoint: Option<PathBuf>,

    /// Draw this many random guesses instead of enumerating in order
    #[arg(long, value_name = "N", conflicts_with_all = ["resume", "save_checkpoint"])]
    random: Option<u64>,
}

impl Cli {
    fn policy(&self) -> Result<TerminationPolicy> {
        let mut policy = TerminationPolicy::new();
        policy.set_minimum_probability(self.min_probability).map_err(|e| anyhow!(e))?;
        policy.maximum_guesses = self.max_guesses;
        policy.maximum_preterminals = self.max_preterminals;
        Ok(policy)
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            max_length: self.max_length,
            use_cache: !self.no_cache,
        }
    }

    fn sink(&self) -> Result<Box<dyn Write>> {
        Ok(match &self.output {
            Some(path) => {
                let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(BufWriter::new(io::stdout().lock())),
        })
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Maps a failure to the process exit status.
fn exit_status(error: &anyhow::Error) -> u8 {
    if let Some(e) = error.downcast_ref::<LoadError>() {
        return u8::try_from(e.exit_code()).unwrap_or(1);
    }
    if error.downcast_ref::<EmitError>().is_some() {
        return SINK_FAILURE;
    }
    1
}

fn run(cli: &Cli) -> Result<()> {
    let policy = cli.policy()?;
    let ruleset = ruleset_path(normalize_folder(&cli.rules_root), &cli.rule);
    let grammar = load_ruleset(&ruleset, &cli.load_options())?;
    info!(
        "Ruleset {}: {} base structures, {} possible guesses",
        cli.rule,
        grammar.structure_count(),
        grammar.guess_space_size()
    );

    let mut sink = cli.sink()?;

    let result = match cli.random {
        Some(count) => sample(&grammar, count, &mut sink),
        None => {
            let mut driver = match &cli.resume {
                Some(path) => {
                    let checkpoint = Checkpoint::load(path)?;
                    info!("Resuming after {} guesses", checkpoint.guesses_emitted());
                    Driver::resume(&grammar, checkpoint, policy)?
                }
                None => Driver::new(&grammar, policy),
            };

            let result = driver.run(&mut sink).map(|report| {
                info!(
                    "Stopped ({:?}) after {} guesses ({} in total), {} pre-terminals, last probability {:?}",
                    report.termination,
                    report.guesses_emitted,
                    report.total_guesses_emitted,
                    report.preterminals_popped,
                    report.last_probability
                );
            });

            if result.is_ok() {
                if let Some(path) = &cli.save_checkpoint {
                    driver.checkpoint().save(path)?;
                    info!("Checkpoint saved to {}", path.display());
                }
            }
            result
        }
    };

    finish(result)
}

/// A reader closing the output early (e.g. `| head`) is a normal end.
fn finish(result: Result<(), EmitError>) -> Result<()> {
    match result {
        Err(e) if e.io_error().kind() == io::ErrorKind::BrokenPipe => {
            info!("Output closed after {} guesses", e.emitted());
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Writes `count` random-walk guesses, one per line.
fn sample<W: Write>(grammar: &pcfg_core::GrammarStore, count: u64, sink: &mut W) -> Result<(), EmitError> {
    let sampler = Sampler::new(grammar);
    let mut emitted = 0;

    while emitted < count {
        let Some(sample) = sampler.sample() else {
            info!("No base structure has a positive probability");
            break;
        };
        if let Err(source) = writeln!(sink, "{}", sample.guess) {
            return Err(EmitError::Sink { emitted, source });
        }
        emitted += 1;
    }

    sink.flush().map_err(|source| EmitError::Sink { emitted, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_error(kind: io::ErrorKind) -> EmitError {
        EmitError::Sink {
            emitted: 7,
            source: io::Error::new(kind, "sink"),
        }
    }

    #[test]
    fn exit_statuses() {
        let io_error = LoadError::Io {
            path: PathBuf::from("Rules/Default/config.ini"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        let malformed = LoadError::MalformedGrammar {
            location: "Alpha/3.txt:2".to_owned(),
            reason: "missing tab separator".to_owned(),
        };
        let encoding = LoadError::UnsupportedEncoding("latin-1".to_owned());

        assert_eq!(exit_status(&anyhow::Error::new(io_error)), 1);
        assert_eq!(exit_status(&anyhow::Error::new(malformed)), 2);
        assert_eq!(exit_status(&anyhow::Error::new(encoding)), 3);
        assert_eq!(exit_status(&anyhow::Error::new(sink_error(io::ErrorKind::Other))), SINK_FAILURE);
        assert_eq!(exit_status(&anyhow!("Minimum probability must be between 0.0 and 1.0")), 1);
    }

    #[test]
    fn context_keeps_the_status() {
        let err = anyhow::Error::new(LoadError::UnsupportedEncoding("latin-1".to_owned())).context("Loading Default");
        assert_eq!(exit_status(&err), 3);
    }

    #[test]
    fn broken_pipe_is_a_normal_end() {
        assert!(finish(Ok(())).is_ok());
        assert!(finish(Err(sink_error(io::ErrorKind::BrokenPipe))).is_ok());

        let err = finish(Err(sink_error(io::ErrorKind::Other))).unwrap_err();
        assert_eq!(exit_status(&err), SINK_FAILURE);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from(["pcfg-guesser", "-r", "Small", "-p", "0.001", "-n", "50", "--no-cache"]);
        assert_eq!(cli.rule, "Small");
        assert!(!cli.load_options().use_cache);
        assert_eq!(cli.load_options().max_length, DEFAULT_MAX_LENGTH);

        let policy = cli.policy().unwrap();
        assert_eq!(policy.minimum_probability(), Some(0.001));
        assert_eq!(policy.maximum_guesses, Some(50));

        let cli = Cli::parse_from(["pcfg-guesser", "-p", "2.0"]);
        assert!(cli.policy().is_err());
        assert!(Cli::try_parse_from(["pcfg-guesser", "--random", "5", "--resume", "a.ckpt"]).is_err());
    }
}
