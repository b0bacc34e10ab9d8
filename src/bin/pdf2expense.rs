//! CLI binary for pdf2expense.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, drives the pipeline or the document lifecycle and
//! prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2expense::lifecycle::validate_upload;
use pdf2expense::pipeline::input::{filename_from_url, is_url};
use pdf2expense::{
    extract_json, inspect, Document, DocumentId, DocumentLifecycle, DocumentStatus,
    ExtractionConfig, Pipeline, PipelineProgressCallback, ProgressCallback, RecordStore,
    Reprocess, ScanStrategy, SqliteStore, Stage,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that names the running stage and logs one line per
/// finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Resolve => "Resolving",
        Stage::Classify => "Classifying",
        Stage::Extract => "Extracting",
        Stage::Structure => "Structuring",
        Stage::Validate => "Validating",
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, source: &str) {
        self.bar.println(format!("{} {}", cyan("◆"), bold(source)));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage_label(stage));
        self.bar.set_message(match stage {
            Stage::Extract => "reading text layer / running OCR…",
            Stage::Structure => "waiting for the model…",
            _ => "",
        });
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        self.bar
            .println(format!("  {} {:<10} {}", green("✓"), stage, dim(detail)));
    }

    fn on_run_complete(&self, error: Option<&str>) {
        self.bar.finish_and_clear();
        match error {
            None => eprintln!("{} done", green("✔")),
            Some(e) => {
                // Truncate very long error messages to keep output tidy.
                let msg: String = if e.chars().count() > 100 {
                    format!("{}\u{2026}", e.chars().take(99).collect::<String>())
                } else {
                    e.to_string()
                };
                eprintln!("{} {}", red("✘"), red(&msg));
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract categorized expenses as JSON (stdout)
  pdf2expense extract invoice.pdf

  # Write to a file, include classification and timings
  pdf2expense extract scan.pdf --full -o scan.json

  # See what the extractors read, without calling a model
  pdf2expense inspect scan.pdf

  # Record-keeping: ingest, process, show
  pdf2expense ingest invoice.pdf
  pdf2expense process 1
  pdf2expense process 1 --force
  pdf2expense show 1

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium
  PDF2EXPENSE_DB          Record database path (default: pdf2expense.db)

EXTERNAL TOOLS:
  pdfium       text layer + page rendering (falls back to lopdf for text)
  tesseract    raster OCR for scanned PDFs
  paddleocr    PP-StructureV3 layout OCR for scanned PDFs
  Missing tools are reported at startup and their stage is skipped.
"#;

/// Extract categorized expense data from PDF invoices and receipts.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2expense",
    version,
    about = "Extract categorized expense JSON from digital and scanned PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on a file or URL and print the JSON.
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Write JSON to this file instead of stdout.
        #[arg(short, long, env = "PDF2EXPENSE_OUTPUT")]
        output: Option<PathBuf>,

        /// Emit classification, method and timings alongside the data.
        #[arg(long)]
        full: bool,
    },

    /// Classify and extract text only; no model call, no API key needed.
    Inspect {
        input: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create a document record in `processing`.
    Ingest {
        /// Local PDF path or URL to read on each run.
        source: String,

        /// Name to record; defaults to the source's file name.
        #[arg(long)]
        filename: Option<String>,

        /// Start processing immediately on a background task and wait for it.
        #[arg(long)]
        run: bool,
    },

    /// Run the pipeline for a stored document.
    Process {
        id: u64,

        /// Re-run even if the document already completed.
        #[arg(long)]
        force: bool,
    },

    /// Print a stored document record as JSON.
    Show { id: u64 },
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// SQLite database holding document records.
    #[arg(long, global = true, env = "PDF2EXPENSE_DB", default_value = "pdf2expense.db")]
    db: PathBuf,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "PDF2EXPENSE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "PDF2EXPENSE_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "PDF2EXPENSE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries on LLM failure or timeout.
    #[arg(long, global = true, env = "PDF2EXPENSE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-attempt LLM call timeout in seconds.
    #[arg(long, global = true, env = "PDF2EXPENSE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDF2EXPENSE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Pages sampled to decide digital vs scanned.
    #[arg(long, global = true, env = "PDF2EXPENSE_SAMPLE_PAGES", default_value_t = 3)]
    sample_pages: usize,

    /// Render magnification for raster OCR.
    #[arg(long, global = true, env = "PDF2EXPENSE_ZOOM", default_value_t = 3.0)]
    zoom: f32,

    /// Scanned-PDF strategy order, e.g. "raster,structure".
    #[arg(long, global = true, env = "PDF2EXPENSE_SCAN_ORDER", default_value = "raster,structure")]
    scan_order: String,

    /// Directory holding the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "PDF2EXPENSE_TESSERACT", default_value = "tesseract")]
    tesseract_cmd: String,

    /// Tesseract language(s), e.g. "eng" or "eng+deu".
    #[arg(long, global = true, env = "PDF2EXPENSE_TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,

    #[arg(long, global = true, env = "PDF2EXPENSE_PADDLEOCR", default_value = "paddleocr")]
    paddleocr_cmd: String,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "PDF2EXPENSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2EXPENSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2EXPENSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO-level logs unless --verbose is set.
    let show_progress = !opts.quiet && !opts.no_progress;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    match &cli.command {
        Command::Extract { input, output, full } => {
            let config = build_config(opts, progress_cb).await?;
            let result = extract_json(input, &config)
                .await
                .context("Extraction failed")?;
            let json = if *full {
                serde_json::to_string_pretty(&result)
            } else {
                serde_json::to_string_pretty(&result.data)
            }
            .context("Failed to serialise output")?;

            match output {
                Some(path) => {
                    write_atomic(path, &json).await?;
                    if !opts.quiet {
                        eprintln!(
                            "{}  {} via {}  {}ms  →  {}",
                            green("✔"),
                            plural(result.stats.page_count, "page"),
                            result.method,
                            result.stats.total_duration_ms,
                            bold(&path.display().to_string()),
                        );
                    }
                }
                None => println!("{json}"),
            }
        }

        Command::Inspect { input, json } => {
            let config = build_config(opts, None).await?;
            let report = inspect(input, &config)
                .await
                .context("Failed to inspect PDF")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else {
                println!("File:         {}", input);
                println!("PDF type:     {}", report.pdf_type);
                println!("Method:       {}", report.method);
                println!("Pages:        {}", report.page_count);
                println!("Text length:  {}", report.text_length);
                println!(
                    "OCR status:   {}",
                    if report.ok { green("success") } else { red("failed") }
                );
                if let Some(ref reason) = report.classification_fallback {
                    println!("Fallback:     {}", reason);
                }
                println!("{}", dim("── preview ──"));
                println!("{}", report.preview);
            }
        }

        Command::Ingest {
            source,
            filename,
            run,
        } => {
            let filename = filename.clone().unwrap_or_else(|| default_filename(source));
            let store = open_store(&opts.db)?;

            let doc = if *run {
                let lifecycle = Arc::new(build_lifecycle(opts, store, progress_cb).await?);
                let doc = lifecycle.ingest(&filename, source).await?;
                let handle = lifecycle.spawn_process(doc.id)?;
                eprintln!("{} document {} queued", cyan("◆"), doc.id);
                // The outcome is also recorded; the handle only reports it.
                let _ = handle.await.context("Processing task panicked")?;
                lifecycle.get(doc.id).await?
            } else {
                validate_upload(&filename, source).await?;
                store.create(filename.trim(), source.trim()).await?
            };
            print_document(&doc)?;
        }

        Command::Process { id, force } => {
            let store = open_store(&opts.db)?;
            let lifecycle = build_lifecycle(opts, store, progress_cb).await?;
            match lifecycle.reprocess(DocumentId(*id), *force).await {
                Ok(Reprocess::AlreadyCompleted(doc)) => {
                    eprintln!(
                        "{} document {} already completed (use --force to re-run)",
                        cyan("⚠"),
                        doc.id
                    );
                    print_document(&doc)?;
                }
                Ok(Reprocess::Finished(doc)) => print_document(&doc)?,
                Err(e) => return Err(e).context(format!("Processing document {id} failed")),
            }
        }

        Command::Show { id } => {
            let store = open_store(&opts.db)?;
            let doc = store
                .get(DocumentId(*id))
                .await?
                .with_context(|| format!("Document {id} not found"))?;
            print_document(&doc)?;
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(opts: &GlobalOpts, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = opts.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let scan_order = ScanStrategy::parse_list(&opts.scan_order).context("Invalid --scan-order")?;

    let mut builder = ExtractionConfig::builder()
        .sample_pages(opts.sample_pages)
        .raster_zoom(opts.zoom)
        .scan_strategies(scan_order)
        .tesseract_cmd(opts.tesseract_cmd.clone())
        .tesseract_lang(opts.tesseract_lang.clone())
        .paddleocr_cmd(opts.paddleocr_cmd.clone())
        .max_tokens(opts.max_tokens)
        .temperature(opts.temperature)
        .max_retries(opts.max_retries)
        .api_timeout_secs(opts.api_timeout)
        .download_timeout_secs(opts.download_timeout);

    if let Some(ref dir) = opts.pdfium_lib_dir {
        builder = builder.pdfium_lib_dir(dir.clone());
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn build_lifecycle(
    opts: &GlobalOpts,
    store: Arc<SqliteStore>,
    progress: Option<ProgressCallback>,
) -> Result<DocumentLifecycle> {
    let config = build_config(opts, progress).await?;
    let pipeline = Pipeline::from_config(config).context("Failed to set up the pipeline")?;
    Ok(DocumentLifecycle::new(store, Arc::new(pipeline)))
}

fn open_store(path: &Path) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open record database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn default_filename(source: &str) -> String {
    if is_url(source) {
        return filename_from_url(source);
    }
    Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

fn print_document(doc: &Document) -> Result<()> {
    let status = match doc.status {
        DocumentStatus::Completed => green(doc.status.as_str()),
        DocumentStatus::Failed => red(doc.status.as_str()),
        DocumentStatus::Processing => cyan(doc.status.as_str()),
    };
    eprintln!("{} document {}  {}  {}", dim("·"), doc.id, doc.filename, status);
    println!(
        "{}",
        serde_json::to_string_pretty(doc).context("Failed to serialise document")?
    );
    Ok(())
}

/// Write via a temp file and rename so readers never see a partial file.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}
