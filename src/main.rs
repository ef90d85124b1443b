//! ic-inspect - command-line front end for the IC marking inspector
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ic_marking_inspector::analysis::{decide, evaluate_rules, InspectionResult};
use ic_marking_inspector::batch::{self, BatchOutcome};
use ic_marking_inspector::config::{self, AppConfig};
use ic_marking_inspector::kb::{CachedKbStore, KbStore, KnowledgeBase, PatternRule};
use ic_marking_inspector::pipeline::Inspector;
use ic_marking_inspector::storage::{self, HistoryEntry, HistoryLog};
use ic_marking_inspector::vision::{
    CenterCropExtractor, PageSegMode, RecognitionConfig, TextEngine, TextRecognizer,
};

/// IC top-marking inspection
#[derive(Parser, Debug)]
#[command(name = "ic-inspect", version)]
#[command(about = "Screen IC package photos for counterfeit markings")]
struct Args {
    /// Config file (defaults to config.toml in the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Knowledge base directory, overriding the config
    #[arg(long, global = true)]
    kb_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect one image
    Inspect {
        image: PathBuf,
        /// Claimed part identifier
        #[arg(long)]
        part: String,
        #[command(flatten)]
        recognition: RecognitionArgs,
    },
    /// Inspect several images of the same part
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        part: String,
        /// Worker threads (0 = available parallelism)
        #[arg(long)]
        workers: Option<usize>,
        #[command(flatten)]
        recognition: RecognitionArgs,
    },
    /// Run only the decision engine on given text
    Decide {
        #[arg(long)]
        part: String,
        #[arg(long)]
        text: String,
        /// Recognizer confidence in [0, 1]
        #[arg(long, default_value = "1.0")]
        conf: f64,
    },
    /// Knowledge base queries
    Kb {
        #[command(subcommand)]
        action: KbCommand,
    },
    /// Inspection history
    History {
        #[command(subcommand)]
        action: HistoryCommand,
    },
    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KbCommand {
    /// List known parts
    List,
    /// Show one record and the state of its rules
    Show { part: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config file (to --config, or the user config directory)
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// Write the history as CSV
    Export { out: PathBuf },
}

/// Per-command overrides of the configured recognition options
#[derive(ClapArgs, Debug)]
struct RecognitionArgs {
    /// Page segmentation mode: 6, 7, 8, 11 or 13
    #[arg(long)]
    psm: Option<PageSegMode>,

    /// Use Otsu instead of adaptive thresholding
    #[arg(long)]
    no_adaptive: bool,

    /// Characters the engine may emit
    #[arg(long)]
    whitelist: Option<String>,
}

impl RecognitionArgs {
    fn apply(&self, config: &AppConfig) -> RecognitionConfig {
        let mut recognition = config.recognition.to_recognition_config();
        if let Some(psm) = self.psm {
            recognition.psm = psm;
        }
        if self.no_adaptive {
            recognition.use_adaptive_threshold = false;
        }
        if let Some(whitelist) = &self.whitelist {
            recognition.char_whitelist = whitelist.clone();
        }
        recognition
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = storage::get_config_dir().ok();
    // `config init` has to work before any config file exists
    let mut config = match &args.command {
        Command::Config { .. } => AppConfig::default(),
        _ => config::resolve_config(args.config.as_deref(), config_dir.as_deref())?,
    };
    if let Some(dir) = &args.kb_dir {
        config.knowledge_base.dir = dir.clone();
    }

    match &args.command {
        Command::Inspect {
            image,
            part,
            recognition,
        } => run_inspect(&config, image, part, &recognition.apply(&config)),
        Command::Batch {
            images,
            part,
            workers,
            recognition,
        } => run_batch(&config, images, part, *workers, &recognition.apply(&config)),
        Command::Decide { part, text, conf } => run_decide(&config, part, text, *conf),
        Command::Kb { action } => match action {
            KbCommand::List => run_kb_list(&config),
            KbCommand::Show { part } => run_kb_show(&config, part),
        },
        Command::History { action } => match action {
            HistoryCommand::Export { out } => run_history_export(&config, out),
        },
        Command::Config { action } => match action {
            ConfigCommand::Init { force } => {
                run_config_init(args.config.as_deref(), config_dir.as_deref(), *force)
            }
        },
    }
}

/// Knowledge base per config: cached snapshot or per-call reads
fn open_knowledge_base(config: &AppConfig) -> Arc<dyn KnowledgeBase> {
    let dir = config.knowledge_base.dir.clone();
    info!("Knowledge base: {:?} (cache: {})", dir, config.knowledge_base.cache);
    if config.knowledge_base.cache {
        Arc::new(CachedKbStore::new(dir))
    } else {
        Arc::new(KbStore::new(dir))
    }
}

#[cfg(feature = "tesseract")]
fn build_engine(config: &AppConfig) -> Result<Box<dyn TextEngine>> {
    use ic_marking_inspector::vision::TesseractEngine;

    let engine = TesseractEngine::new(&config.engine.language, config.engine.datapath.as_deref())?;
    Ok(Box::new(engine))
}

#[cfg(not(feature = "tesseract"))]
fn build_engine(_config: &AppConfig) -> Result<Box<dyn TextEngine>> {
    anyhow::bail!("No OCR engine available: rebuild with `--features tesseract`")
}

fn build_inspector(config: &AppConfig) -> Result<Inspector> {
    let recognizer = TextRecognizer::from_boxed(build_engine(config)?);
    Ok(Inspector::new(open_knowledge_base(config), recognizer)
        .with_extractor(CenterCropExtractor::new(config.region.margin)))
}

fn history_log(config: &AppConfig) -> Result<HistoryLog> {
    let path = match &config.history.path {
        Some(path) => path.clone(),
        None => storage::default_history_path()?,
    };
    Ok(HistoryLog::new(path))
}

/// Append results to the history log; failures are logged, not fatal
fn record_history(config: &AppConfig, part: &str, results: &[(&Path, &InspectionResult)]) {
    if !config.history.enabled {
        return;
    }
    let log = match history_log(config) {
        Ok(log) => log,
        Err(e) => {
            warn!("History disabled for this run: {}", e);
            return;
        }
    };
    for (image, result) in results {
        let entry = HistoryEntry::new(part, &image.display().to_string(), (*result).clone());
        if let Err(e) = log.append(&entry) {
            warn!("Failed to record history: {}", e);
        }
    }
}

/// Mention close part identifiers when a part is unknown
fn hint_unknown_part(kb: &dyn KnowledgeBase, part: &str, result: &InspectionResult) {
    if result.scores.final_conf.is_some() {
        return;
    }
    let suggestions = kb.suggest(part);
    if !suggestions.is_empty() {
        warn!("Unknown part '{}'; did you mean: {}?", part, suggestions.join(", "));
    }
}

fn run_inspect(config: &AppConfig, image: &Path, part: &str, recognition: &RecognitionConfig) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read image {:?}", image))?;
    let inspector = build_inspector(config)?;

    let result = inspector
        .inspect(&bytes, part, recognition)
        .with_context(|| format!("Inspection of {:?} failed", image))?;

    hint_unknown_part(inspector.knowledge_base(), part, &result);
    record_history(config, part, &[(image, &result)]);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_batch(
    config: &AppConfig,
    images: &[PathBuf],
    part: &str,
    workers: Option<usize>,
    recognition: &RecognitionConfig,
) -> Result<()> {
    let inspector = build_inspector(config)?;
    let workers = match workers.unwrap_or(config.batch.workers) {
        0 => batch::default_workers(),
        n => n,
    };

    let outcomes = batch::inspect_all(&inspector, images, part, recognition, workers);

    let mut failures = 0;
    let mut succeeded = Vec::new();
    for BatchOutcome { path, result } in &outcomes {
        match result {
            Ok(result) => {
                println!(
                    "{}",
                    serde_json::json!({ "image": path.display().to_string(), "result": result })
                );
                succeeded.push((path.as_path(), result));
            }
            Err(e) => {
                failures += 1;
                println!(
                    "{}",
                    serde_json::json!({ "image": path.display().to_string(), "error": e.to_string() })
                );
            }
        }
    }

    if let Some((_, first)) = succeeded.first() {
        hint_unknown_part(inspector.knowledge_base(), part, first);
    }
    record_history(config, part, &succeeded);

    if failures > 0 {
        anyhow::bail!("{} of {} images could not be inspected", failures, outcomes.len());
    }
    Ok(())
}

fn run_decide(config: &AppConfig, part: &str, text: &str, conf: f64) -> Result<()> {
    let kb = open_knowledge_base(config);
    let record = match kb.load(part) {
        Ok(record) => record,
        Err(e) => {
            warn!("Treating '{}' as unknown: {}", part, e);
            None
        }
    };

    let result = decide(text, record.as_deref(), conf);
    hint_unknown_part(kb.as_ref(), part, &result);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_kb_list(config: &AppConfig) -> Result<()> {
    let kb = open_knowledge_base(config);
    let parts = kb.list();
    info!("{} parts in knowledge base", parts.len());
    println!("{}", serde_json::to_string_pretty(&parts)?);
    Ok(())
}

fn run_kb_show(config: &AppConfig, part: &str) -> Result<()> {
    let kb = open_knowledge_base(config);
    let Some(record) = kb.load(part)? else {
        let suggestions = kb.suggest(part);
        if suggestions.is_empty() {
            anyhow::bail!("Part '{}' is not in the knowledge base", part);
        }
        anyhow::bail!(
            "Part '{}' is not in the knowledge base; did you mean: {}?",
            part,
            suggestions.join(", ")
        );
    };

    let rules: Vec<_> = record
        .rules()
        .iter()
        .map(|(field, rule)| {
            let status = match rule {
                PatternRule::NotEnforced => "not enforced".to_string(),
                PatternRule::Compiled(_) => "ok".to_string(),
                PatternRule::Malformed { error, .. } => format!("malformed: {}", error),
            };
            serde_json::json!({ "field": field, "pattern": rule.source(), "status": status })
        })
        .collect();

    // Empty-text evaluation shows which checks are active
    let enforced: Vec<_> = evaluate_rules("", &record)
        .iter()
        .filter(|r| r.enforced)
        .map(|r| r.rule.failure_code())
        .collect();

    let view = serde_json::json!({
        "part_id": record.part_id,
        "oem": record.oem,
        "part_number": record.part_number,
        "logo_hint": record.logo_hint,
        "rules": rules,
        "enforced_checks": enforced,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn run_history_export(config: &AppConfig, out: &Path) -> Result<()> {
    let log = history_log(config)?;
    let rows = log.export_csv(out)?;
    info!("Exported {} history rows from {:?} to {:?}", rows, log.path(), out);
    Ok(())
}

fn run_config_init(explicit: Option<&Path>, config_dir: Option<&Path>, force: bool) -> Result<()> {
    let path = match (explicit, config_dir) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(dir)) => dir.join(config::CONFIG_FILE_NAME),
        (None, None) => anyhow::bail!("Could not determine config directory; pass --config"),
    };
    if !config::write_default_config(&path, force)? {
        warn!("{:?} already exists; use --force to replace it", path);
    }
    println!("{}", path.display());
    Ok(())
}
