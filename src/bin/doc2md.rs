//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `EngineConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_doc2md::convert::write_atomic;
use edgequake_doc2md::{
    ConversionProgressCallback, ConversionResult, Doc2MdError, DocumentEngine, EngineConfig,
    ProgressCallback, StreamInfo,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
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

/// Prints rejected attempts above the progress bar.
///
/// Only top-level attempts are shown; members of an archive report with
/// `depth > 0` and are counted but not printed.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_attempts: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed_attempts: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_attempt_start(&self, converter: &str, hypothesis: &str, depth: usize) {
        if depth == 0 {
            self.bar.set_message(format!("{converter} ({hypothesis})"));
        }
    }

    fn on_attempt_failed(&self, converter: &str, hypothesis: &str, error: &str, depth: usize) {
        self.failed_attempts.fetch_add(1, Ordering::SeqCst);
        if depth > 0 {
            return;
        }
        let first_line = error.lines().next().unwrap_or_default();
        self.bar.println(format!(
            "    {} {} {}  {}",
            dim("↳"),
            converter,
            dim(&format!("as {hypothesis}")),
            dim(first_line),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a document (stdout)
  doc2md report.docx

  # Convert to file
  doc2md report.docx -o report.md

  # Every member of an archive, one section per file
  doc2md bundle.zip -o bundle.md

  # Several inputs into a directory
  doc2md a.docx b.txt c.zip -o out/

  # Read from stdin with a format hint
  cat notes | doc2md -x .txt -c latin-1

  # Machine-readable result (failures print {"error", "attempts"})
  doc2md --json report.docx > report.json

  # Show the converter registry in dispatch order
  doc2md --list-converters

BUILT-IN CONVERTERS:
  Name         Priority  Accepts
  ──────────   ────────  ───────────────────────────────────────────
  docx         0         .docx, WordprocessingML MIME type
  zip          0         .zip, application/zip, PK signature
  html         0         .html, .htm, .xhtml, text/html
  csv          0         .csv, text/csv, application/csv
  plain_text   10        text/*, JSON, Markdown, text-looking bytes

ENVIRONMENT VARIABLES:
  DOC2MD_OUTPUT           Default for -o
  DOC2MD_SCRATCH_DIR      Parent directory for archive working areas
  DOC2MD_KEEP_EXTRACTED   Keep archive working areas after conversion
  RUST_LOG                Overrides -v / -q (e.g. edgequake_doc2md=debug)
"#;

/// Convert documents and archives to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert documents and archives to Markdown",
    long_about = "Convert documents (DOCX with equations, plain text, zip archives of either) \
to Markdown. The format is detected from the file name, any hints given on the command line \
and the leading bytes; each candidate format is offered to the registered converters in \
priority order until one succeeds.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local files to convert. No input, or `-`, reads stdin.
    inputs: Vec<String>,

    /// Write Markdown to this file (or directory, with several inputs).
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Extension hint, e.g. `.docx`.
    #[arg(short = 'x', long)]
    extension: Option<String>,

    /// MIME type hint, e.g. `text/plain`.
    #[arg(short, long)]
    mimetype: Option<String>,

    /// Charset hint for text input, e.g. `utf-8`.
    #[arg(short, long)]
    charset: Option<String>,

    /// Keep full `data:` URIs for embedded images.
    #[arg(long, env = "DOC2MD_KEEP_DATA_URIS")]
    keep_data_uris: bool,

    /// Keep files extracted from archives (the path is logged).
    #[arg(long, env = "DOC2MD_KEEP_EXTRACTED")]
    keep_extracted: bool,

    /// Parent directory for archive working areas.
    #[arg(long, env = "DOC2MD_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Leading bytes inspected for signature detection.
    #[arg(long, env = "DOC2MD_PEEK_BYTES", default_value_t = 4096)]
    peek_bytes: usize,

    /// Output the result as JSON (ConversionResult) instead of Markdown.
    /// A failure is reported as `{"error": ..., "attempts": [...]}`.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// List registered converters in dispatch order and exit.
    #[arg(long)]
    list_converters: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

impl Cli {
    fn hint(&self) -> Option<StreamInfo> {
        let mut hint = StreamInfo::new();
        if let Some(ref ext) = self.extension {
            hint = hint.with_extension(ext);
        }
        if let Some(ref mime) = self.mimetype {
            hint = hint.with_mimetype(mime);
        }
        if let Some(ref charset) = self.charset {
            hint = hint.with_charset(charset.to_ascii_lowercase());
        }
        (hint != StreamInfo::new()).then_some(hint)
    }

    fn reads_stdin(&self) -> bool {
        self.inputs.is_empty() || (self.inputs.len() == 1 && self.inputs[0] == "-")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let batch = cli.inputs.len() > 1;
    let show_progress = batch && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb = show_progress.then(|| CliProgressCallback::new(cli.inputs.len()));
    let engine = build_engine(&cli, progress_cb.clone())?;

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list_converters {
        for (name, priority) in engine.converters() {
            println!("{priority:>6}  {name}");
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    if cli.reads_stdin() {
        let mut bytes = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Failed to read stdin")?;
        let result = match engine.convert_bytes(&bytes, cli.hint()) {
            Ok(result) => result,
            Err(e) => return fail(&cli, e, cli.output.as_deref(), "Conversion failed".to_string()),
        };
        emit(&cli, &result, cli.output.as_deref())?;
    } else if !batch {
        let input = &cli.inputs[0];
        let result = match engine.convert_local(input, cli.hint()) {
            Ok(result) => result,
            Err(e) => {
                let context = format!("Conversion of '{input}' failed");
                return fail(&cli, e, cli.output.as_deref(), context);
            }
        };
        emit(&cli, &result, cli.output.as_deref())?;
        if let (Some(out), false) = (&cli.output, cli.quiet) {
            eprintln!(
                "{}  {}  {}  →  {}",
                green("✔"),
                input,
                dim(result.converter.as_deref().unwrap_or("?")),
                bold(&out.display().to_string()),
            );
        }
    } else {
        let failed = convert_batch(&cli, Arc::new(engine), progress_cb).await?;
        if failed > 0 {
            bail!("{failed} of {} input(s) failed", cli.inputs.len());
        }
    }

    Ok(())
}

/// Map CLI args to an engine.
fn build_engine(cli: &Cli, progress: Option<Arc<CliProgressCallback>>) -> Result<DocumentEngine> {
    let mut builder = EngineConfig::builder()
        .peek_bytes(cli.peek_bytes)
        .keep_data_uris(cli.keep_data_uris)
        .cleanup_extracted(!cli.keep_extracted);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb as ProgressCallback);
    }

    let config = builder.build().context("Invalid configuration")?;
    DocumentEngine::new(config).context("Failed to initialise engine")
}

/// Convert several inputs into the `-o` directory, one file each.
///
/// Returns the number of inputs that failed.
async fn convert_batch(
    cli: &Cli,
    engine: Arc<DocumentEngine>,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<usize> {
    let out_dir = cli
        .output
        .as_deref()
        .context("Several inputs need -o <DIR> to write their results")?;
    if out_dir.exists() && !out_dir.is_dir() {
        bail!("-o '{}' must be a directory when converting several inputs", out_dir.display());
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;

    let start = Instant::now();
    let mut failed = 0usize;
    let mut taken = HashSet::new();
    for input in &cli.inputs {
        let target = out_dir.join(unique_output_name(input, cli.json, &mut taken));
        let outcome = match Arc::clone(&engine).convert_async(input, cli.hint()).await {
            Ok(result) => emit(cli, &result, Some(&target)).map(|_| result),
            Err(e) => {
                if cli.json {
                    if let Err(write_err) = write_error_report(&e, Some(&target)) {
                        eprintln!("  {} {write_err:#}", red("✗"));
                    }
                }
                Err(anyhow::Error::from(e))
            }
        };

        let line = match &outcome {
            Ok(result) => format!(
                "  {} {}  {}",
                green("✓"),
                input,
                dim(result.converter.as_deref().unwrap_or("?")),
            ),
            Err(e) => {
                failed += 1;
                let first = e.to_string();
                format!("  {} {}  {}", red("✗"), input, red(first.lines().next().unwrap_or_default()))
            }
        };
        match progress {
            Some(ref cb) => {
                cb.bar.println(line);
                cb.bar.inc(1);
            }
            None if !cli.quiet => eprintln!("{line}"),
            None => {}
        }
    }

    if let Some(ref cb) = progress {
        cb.bar.finish_and_clear();
    }
    if !cli.quiet {
        let ok = cli.inputs.len() - failed;
        eprintln!(
            "{} {}/{} files converted in {}ms  →  {}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            cli.inputs.len(),
            start.elapsed().as_millis(),
            bold(&out_dir.display().to_string()),
        );
        if let Some(ref cb) = progress {
            let rejected = cb.failed_attempts.load(Ordering::SeqCst);
            if rejected > 0 {
                eprintln!("   {}", dim(&format!("{rejected} converter attempt(s) failed along the way")));
            }
        }
    }
    Ok(failed)
}

/// `dir/report.docx` → `report.md` (or `report.json`).
fn output_name(input: &str, json: bool) -> PathBuf {
    let stem = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from(format!("{stem}.{}", if json { "json" } else { "md" }))
}

/// [`output_name`], suffixed `-1`, `-2`, … until it is not in `taken`.
///
/// `a/x.txt` and `b/x.txt` land in `x.md` and `x-1.md`.
fn unique_output_name(input: &str, json: bool, taken: &mut HashSet<PathBuf>) -> PathBuf {
    let name = output_name(input, json);
    if taken.insert(name.clone()) {
        return name;
    }
    let stem = name.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = if json { "json" } else { "md" };
    let mut n = 1usize;
    loop {
        let candidate = PathBuf::from(format!("{stem}-{n}.{ext}"));
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// JSON report for a failed conversion: the message plus every attempt.
fn error_report(err: &Doc2MdError) -> serde_json::Value {
    serde_json::json!({
        "error": err.to_string(),
        "attempts": err.attempts(),
    })
}

fn write_error_report(err: &Doc2MdError, target: Option<&Path>) -> Result<()> {
    let body = serde_json::to_string_pretty(&error_report(err))
        .context("Failed to serialise error report")?;
    write_body(body, target)
}

/// Report a fatal conversion error, as JSON too under `--json`.
fn fail(cli: &Cli, err: Doc2MdError, target: Option<&Path>, context: String) -> Result<()> {
    if cli.json {
        write_error_report(&err, target)?;
    }
    Err(anyhow::Error::new(err).context(context))
}

/// Write one result to `target`, or stdout when there is none.
fn emit(cli: &Cli, result: &ConversionResult, target: Option<&Path>) -> Result<()> {
    let body = if cli.json {
        serde_json::to_string_pretty(result).context("Failed to serialise output")?
    } else {
        result.markdown.clone()
    };
    write_body(body, target)
}

fn write_body(mut body: String, target: Option<&Path>) -> Result<()> {
    if !body.ends_with('\n') {
        body.push('\n');
    }

    match target {
        Some(path) => write_atomic(path, &body)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(body.as_bytes())
                .context("Failed to write to stdout")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_doc2md::{ConverterError, FailedAttempt};

    #[test]
    fn batch_names_with_same_stem_do_not_collide() {
        let mut taken = HashSet::new();
        let names: Vec<PathBuf> = ["a/x.txt", "b/x.txt", "c/x.docx", "y.txt"]
            .iter()
            .map(|i| unique_output_name(i, false, &mut taken))
            .collect();
        assert_eq!(
            names,
            ["x.md", "x-1.md", "x-2.md", "y.md"].map(PathBuf::from).to_vec()
        );
        assert_eq!(unique_output_name("d/x.csv", true, &mut taken), PathBuf::from("x.json"));
    }

    #[test]
    fn generated_suffix_does_not_clobber_a_real_input() {
        let mut taken = HashSet::new();
        let first = unique_output_name("a/x.txt", false, &mut taken);
        let second = unique_output_name("b/x.txt", false, &mut taken);
        let third = unique_output_name("x-1.txt", false, &mut taken);
        assert_eq!((first, second), (PathBuf::from("x.md"), PathBuf::from("x-1.md")));
        assert_eq!(third, PathBuf::from("x-1-1.md"));
    }

    #[test]
    fn error_report_lists_attempts() {
        let err = Doc2MdError::ConversionFailed {
            attempts: vec![FailedAttempt {
                converter: "docx".to_string(),
                hypothesis: ".docx".to_string(),
                error: ConverterError::Other("bad package".to_string()),
            }],
        };
        let report = error_report(&err);
        assert_eq!(report["error"], serde_json::json!(err.to_string()));
        assert_eq!(report["attempts"][0]["converter"], "docx");
        assert_eq!(report["attempts"][0]["hypothesis"], ".docx");
        assert_eq!(report["attempts"][0]["error"], "bad package");
    }

    #[test]
    fn error_report_written_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x.json");
        let err = Doc2MdError::UnsupportedFormat {
            hypotheses: vec![".xyz".to_string(), "<any>".to_string()],
        };
        write_error_report(&err, Some(&target)).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert!(written["error"].as_str().unwrap().contains(".xyz"));
        assert_eq!(written["attempts"], serde_json::json!([]));
    }
}
