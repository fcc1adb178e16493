//! CLI entry point for pywrap.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// pywrap — generate CPython extension module sources from a resolved
/// declaration tree.
#[derive(Parser, Debug)]
#[command(name = "pywrap", version, about)]
struct Cli {
    /// Serialized declaration tree (JSON).
    input: PathBuf,

    /// Directory for the generated sources.
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Indentation unit for the generated C++.
    #[arg(long, default_value = "  ")]
    indent: String,

    /// Generate Python 2 module sources.
    #[arg(long)]
    py2: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pywrap=info")),
        )
        .init();

    let cli = Cli::parse();
    let opts = pywrap::Options {
        indent: cli.indent,
        py3: !cli.py2,
    };
    pywrap::run(&cli.input, &cli.out_dir, &opts)?;
    Ok(())
}
