//! CLI tool to run a JSON pipeline definition against JSON-lines items.
//!
//! Usage:
//!   pipe-run <pipeline.json> <items.jsonl>
//!   pipe-run <pipeline.json> <items.jsonl> -o <output.jsonl> --async
//!
//! If no output file is specified, writes to stdout. Logging is controlled
//! by `RUST_LOG` (default `pipes_rs=warn`, or `pipes_rs=debug` with `-v`).

use clap::Parser;
use pipes_rs::{execute_pipeline, execute_pipeline_async};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run a pipeline definition against items.
///
/// Both schedulers produce identical output.
#[derive(Parser, Debug)]
#[command(name = "pipe-run", version)]
struct Cli {
    /// Pipeline definition file (.json array of stages)
    pipeline: String,

    /// Input items, one JSON value per line (or /dev/stdin)
    input: String,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Use the suspending (async) scheduler
    #[arg(long = "async")]
    use_async: bool,

    /// Show paths, scheduler, and item counts on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli, input_text: &str, pipeline_text: &str) -> pipes_rs::Result<(String, usize, usize)> {
    if !cli.use_async {
        return execute_pipeline(input_text, pipeline_text);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute_pipeline_async(input_text, pipeline_text))
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pipes_rs={default_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let pipeline_text = match fs::read_to_string(&cli.pipeline) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading pipeline file '{}': {e}", cli.pipeline);
            process::exit(1);
        }
    };

    let input_text = match fs::read_to_string(&cli.input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading input file '{}': {e}", cli.input);
            process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("Pipeline:  {}", cli.pipeline);
        eprintln!("Input:     {}", cli.input);
        eprintln!("Output:    {}", cli.output.as_deref().unwrap_or("(stdout)"));
        eprintln!(
            "Scheduler: {}",
            if cli.use_async { "suspending" } else { "immediate" }
        );
    }

    match run(&cli, &input_text, &pipeline_text) {
        Ok((output, input_count, output_count)) => {
            if let Some(out_path) = &cli.output {
                if let Some(parent) = Path::new(out_path.as_str()).parent()
                    && !parent.as_os_str().is_empty()
                    && fs::create_dir_all(parent).is_err()
                {
                    eprintln!("Error creating output directory for '{out_path}'");
                    process::exit(1);
                }
                if let Err(e) = fs::write(out_path, &output) {
                    eprintln!("Error writing output file '{out_path}': {e}");
                    process::exit(1);
                }
            } else {
                if let Err(e) = io::stdout().write_all(output.as_bytes()) {
                    eprintln!("Error writing output: {e}");
                    process::exit(1);
                }
                if !output.is_empty() && !output.ends_with('\n') {
                    println!();
                }
            }
            if cli.verbose {
                eprintln!("Items:     {input_count} in -> {output_count} out");
            }
        }
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            process::exit(1);
        }
    }
}
