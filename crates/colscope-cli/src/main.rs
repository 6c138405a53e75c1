//! colscope CLI - column-level SQL lineage

use colscope_cli::cli;
use colscope_cli::input;
use colscope_cli::schema;

use anyhow::{Context, Result};
use clap::Parser;
use colscope_core::{lineage, Dialect, LineageError, LineageRequest, Node};
use colscope_export::{export, write_to_dir, ExportNaming};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use cli::Args;

/// The column could not be traced.
const EXIT_FAILURE: u8 = 1;
/// Configuration or IO error (unreadable input, bad schema, unwritable output).
const EXIT_CONFIG_ERROR: u8 = 66;

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let prefix = "colscope: error:";
            if io::stderr().is_terminal() {
                eprintln!("{} {e:#}", prefix.red().bold());
            } else {
                eprintln!("{prefix} {e:#}");
            }
            if e.downcast_ref::<LineageError>().is_some() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::from(EXIT_CONFIG_ERROR)
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let dialect: Dialect = args.dialect.into();
    let sql = input::read_query(args.file.as_deref())?;
    let sources = input::read_sources(&args.sources)?;

    let mut request = LineageRequest::new(args.column.clone(), sql, dialect)
        .with_trim_selects(!args.no_trim);
    if let Some(path) = &args.schema {
        request = request.with_schema(schema::load_schema(path, dialect)?);
    }
    for (name, source_sql) in sources {
        request = request.with_source(name, source_sql);
    }

    let node = lineage(&request)?;

    let naming = ExportNaming::new(&args.column);
    let format = args.format.export_format(args.compact);
    match &args.output {
        Some(path) if path.is_dir() => {
            let written = write_to_dir(&node, format, &naming, path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            if !args.quiet {
                eprintln!("wrote {}", written.display());
            }
        }
        output => {
            let content = export(&node, format, &naming).context("Failed to render lineage")?;
            write_output(output.as_deref(), &content)?;
        }
    }

    if !args.quiet {
        print_summary(&node);
    }
    Ok(())
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    if let Some(path) = path {
        fs::write(path, content)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    } else {
        io::stdout()
            .write_all(content.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure newline at end for terminal output
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_summary(node: &Node) {
    let mut nodes = 0;
    let mut unknown = 0;
    for visit in node.walk() {
        nodes += 1;
        if visit.node.name == "?" && visit.node.is_leaf() {
            unknown += 1;
        }
    }
    let tables = node.source_tables();
    let tables = if tables.is_empty() {
        "no tables".to_string()
    } else {
        tables.into_iter().collect::<Vec<_>>().join(", ")
    };

    let summary = format!("{}: {nodes} nodes from {tables}", node.name);
    let colored = io::stderr().is_terminal();
    if colored {
        eprintln!("{}", summary.dimmed());
    } else {
        eprintln!("{summary}");
    }
    if unknown > 0 {
        let warning = format!("{unknown} column reference(s) could not be resolved");
        if colored {
            eprintln!("{}", warning.yellow());
        } else {
            eprintln!("warning: {warning}");
        }
    }
}
