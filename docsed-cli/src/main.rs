use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use docsed_engine::{CancelToken, Engine, HttpDocumentService, compile_plan};
use docsed_parser::parse_program;

/// Apply sed-style edit directives to a remote rich-text document.
///
/// Directives look like `s/pattern/replacement/flags`, with markdown
/// replacements (`**bold**`, `# heading`), `{...}` attribute blocks, and
/// table/cell/image addressing (`|2|[A1]`, `!(-1)`).
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// The document to edit
    document_id: String,

    /// A directive to apply; repeatable, run in order
    #[arg(short = 'e', long = "expression", value_name = "DIRECTIVE")]
    expressions: Vec<String>,

    /// Read directives from a file (one per line, `#` comments); `-` = stdin
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Compile and print the operation plan as JSON without mutating
    #[arg(long)]
    dry_run: bool,

    /// Service endpoint base URL
    #[arg(long, default_value = "https://docs.example.com/v1")]
    base_url: String,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let program = load_program(args)?;
    let parsed = parse_program(&program);
    for error in &parsed.errors {
        tracing::error!(line = error.line, "{}", error.message);
    }
    if parsed.directives.is_empty() {
        bail!("no valid directives to apply");
    }

    let token = std::env::var("DOCSED_TOKEN").unwrap_or_default();
    if token.is_empty() && !args.dry_run {
        bail!("DOCSED_TOKEN is not set");
    }
    let service = HttpDocumentService::new(args.base_url.clone(), token);

    if args.dry_run {
        let doc = service_fetch(&service, &args.document_id)?;
        let mut plans = Vec::new();
        for directive in &parsed.directives {
            let plan = compile_plan(&doc, directive)
                .with_context(|| format!("compiling {}", directive.raw))?;
            plans.push(serde_json::json!({
                "directive": directive.raw,
                "plan": plan,
            }));
        }
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(parsed.errors.is_empty());
    }

    let engine = Engine::new(&service).with_cancel(CancelToken::new());
    let outcome = engine
        .apply(&args.document_id, &parsed.directives)
        .context("applying directives")?;

    for result in &outcome.outcomes {
        println!(
            "{}: {} match(es), {} operation(s)",
            result.directive, result.matches, result.operations
        );
    }
    Ok(parsed.errors.is_empty())
}

fn service_fetch(
    service: &HttpDocumentService,
    id: &str,
) -> Result<docsed_engine::Document> {
    use docsed_engine::DocumentService as _;
    service.fetch(id).context("fetching document")
}

/// Gather the expression program from `-e` flags and/or a file or stdin.
fn load_program(args: &Args) -> Result<String> {
    let mut program = String::new();
    for expression in &args.expressions {
        program.push_str(expression);
        program.push('\n');
    }
    if let Some(path) = &args.file {
        if path.as_os_str() == "-" {
            io::stdin()
                .read_to_string(&mut program)
                .context("reading directives from stdin")?;
        } else {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            program.push_str(&contents);
        }
    }
    if program.trim().is_empty() {
        bail!("no directives given; use -e or -f");
    }
    Ok(program)
}
