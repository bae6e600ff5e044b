use clap::{Parser, Subcommand};
use coursec::config::{self, RepoLayout};
use coursec::imaging::RustBackend;
use coursec::pipeline::{self, Cancellation, GenerateOptions, PipelineError};
use coursec::{logging, output};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "coursec")]
#[command(about = "Compiler for language-course content")]
#[command(long_about = "\
Compiler for language-course content

A hand-authored specification document describes a course as categories of
lessons of items. `generate` compiles it into a canonical Course Tree plus
resized image variants; `export` flattens the Course Tree into the bundle the
presentation layer loads.

Repository layout (defaults, see `coursec gen-config`):

  repo/
  ├── coursec.toml                 # Optional config
  ├── course.json                  # Specification document
  ├── hello.png                    # Source images, referenced from the spec
  ├── courses/jp/                  # Course Tree (generated)
  │   ├── _course.yaml
  │   └── greetings/
  │       ├── _category.yaml
  │       └── hello/
  │           ├── _lesson.yaml
  │           └── konnichiha.yaml
  ├── static/images/               # Image variants (generated, shared)
  │   ├── .coursec-jp.json         # Which variants belong to course jp
  │   ├── jp_hello.jpg
  │   └── jp_hello_tiny.jpg
  └── export/jp/                   # Bundle (export)
      ├── manifest.json
      └── challenges/hello.json

Generated files that the specification no longer produces are pruned after
every generate run. Pruning only ever touches the course's own Course Tree
directory and the image variants recorded in its ledger.

Logging: COURSEC_LOG=debug for detail, COURSEC_LOG_FORMAT=json for JSON lines.")]
#[command(version = version_string())]
struct Cli {
    /// Repository root
    #[arg(long, default_value = ".", global = true)]
    repo: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Specification document (default: paths.spec from coursec.toml)
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Keep stale generated files instead of deleting them
    #[arg(long)]
    no_prune: bool,

    /// List what pruning would delete without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Repository URL recorded in the course metadata
    #[arg(long, value_name = "URL")]
    repository_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile the specification into the Course Tree and image variants
    Generate(GenerateArgs),
    /// Flatten a course's Course Tree into its bundle
    Export {
        /// Course slug
        #[arg(long)]
        course: String,
    },
    /// Load and validate the specification without writing anything
    Check {
        /// Specification document (default: paths.spec from coursec.toml)
        #[arg(long)]
        spec: Option<PathBuf>,
    },
    /// Print a stock coursec.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    logging::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    match cli.command {
        Command::Generate(args) => generate(&cli.repo, args),
        Command::Export { course } => {
            let config = config::load_config(&cli.repo)?;
            let layout = RepoLayout::resolve(&cli.repo, &config.paths, None);
            println!("==> Exporting {course}");
            let report = pipeline::export(&layout, &course)?;
            output::print_export_report(&report, &cli.repo);
            Ok(())
        }
        Command::Check { spec } => {
            let config = config::load_config(&cli.repo)?;
            let layout = RepoLayout::resolve(&cli.repo, &config.paths, spec.as_deref());
            println!("==> Checking {}", layout.spec.display());
            let summary = pipeline::check(&layout, &config)?;
            println!("{}", output::format_summary(&summary));
            println!("==> Specification is valid");
            Ok(())
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
    }
}

fn generate(repo: &Path, args: GenerateArgs) -> Result<(), PipelineError> {
    let config = config::load_config(repo)?;
    let layout = RepoLayout::resolve(repo, &config.paths, args.spec.as_deref());
    let options = GenerateOptions {
        prune: !args.no_prune,
        dry_run: args.dry_run,
        repository_url: args.repository_url,
    };
    println!("==> Generating from {}", layout.spec.display());

    let (tx, rx) = mpsc::channel();
    let printer_repo = repo.to_path_buf();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_variant_event(&event, &printer_repo) {
                println!("{}", line);
            }
        }
    });

    let cancel = Cancellation::new();
    let job_cancel = cancel.clone();
    let result = pipeline::run_with_timeout(args.timeout.map(Duration::from_secs), &cancel, move || {
        pipeline::generate(&layout, &config, &RustBackend::new(), &options, Some(tx), &job_cancel)
    });
    // A timed-out worker still holds the sender.
    if !matches!(result, Err(PipelineError::Timeout { .. })) {
        let _ = printer.join();
    }

    let report = result?;
    println!();
    output::print_run_report(&report, repo);
    report.media_result()
}
