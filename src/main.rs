use anyhow::{Context, Result};
use clap::Parser;
use class_graph::archive::{DecodedClasses, collect_class_entries, decode_entries};
use class_graph::cli::{Cli, Commands, OutputFormat};
use class_graph::config::{build_exclude_prefixes, dot_path_for, resolve_dot_bin, resolve_output_path};
use class_graph::extract::{focused_references, full_references};
use class_graph::render::{
    ViewOptions, class_view_dot, class_view_edges, member_view_dot, member_view_references,
};
use log::warn;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let summary = match cli.command.clone() {
        Commands::Class {
            input,
            target,
            output,
            format,
        } => run_class(&cli, &input, &target, output, format)?,
        Commands::Jar {
            input,
            target,
            output,
            keep_anonymous,
            exclude,
            no_default_exclude,
            format,
        } => {
            let options = ViewOptions {
                fold_anonymous: !keep_anonymous,
                exclude_prefixes: build_exclude_prefixes(&exclude, no_default_exclude),
            };
            run_jar(&cli, &input, target.as_deref(), output, format, options)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct RunSummary {
    mode: &'static str,
    input: String,
    classes_decoded: usize,
    entries_skipped: usize,
    references: usize,
    dot: String,
    image: Option<String>,
    duration_ms: u64,
}

fn run_class(
    cli: &Cli,
    input: &Path,
    target: &str,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<RunSummary> {
    let start = Instant::now();
    let decoded = decode_input(input)?;

    let references = focused_references(&decoded.classes, target)?;
    let members = member_view_references(&references);
    let dot_source = member_view_dot(target, &members);

    let (dot, image) = emit(cli, input, output, format, &dot_source)?;
    Ok(RunSummary {
        mode: "class",
        input: input.to_string_lossy().to_string(),
        classes_decoded: decoded.classes.len(),
        entries_skipped: decoded.skipped.len(),
        references: references.len(),
        dot,
        image,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn run_jar(
    cli: &Cli,
    input: &Path,
    target: Option<&str>,
    output: Option<PathBuf>,
    format: OutputFormat,
    options: ViewOptions,
) -> Result<RunSummary> {
    let start = Instant::now();
    let decoded = decode_input(input)?;

    let references = full_references(&decoded.classes, target)?;
    let edges = class_view_edges(&references, &options);
    let graph_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "classes".to_string());
    let dot_source = class_view_dot(&graph_name, &edges);

    let (dot, image) = emit(cli, input, output, format, &dot_source)?;
    Ok(RunSummary {
        mode: "jar",
        input: input.to_string_lossy().to_string(),
        classes_decoded: decoded.classes.len(),
        entries_skipped: decoded.skipped.len(),
        references: references.len(),
        dot,
        image,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn decode_input(input: &Path) -> Result<DecodedClasses> {
    let entries = collect_class_entries(input)?;
    let decoded = decode_entries(entries);
    for skipped in &decoded.skipped {
        warn!("skipping {}: {}", skipped.path, skipped.error);
    }
    Ok(decoded)
}

/// Writes the DOT file and, for the PNG format, renders it with the external
/// Graphviz binary. Returns the emitted paths.
fn emit(
    cli: &Cli,
    input: &Path,
    output: Option<PathBuf>,
    format: OutputFormat,
    dot_source: &str,
) -> Result<(String, Option<String>)> {
    match format {
        OutputFormat::Dot => {
            let dot_path = resolve_output_path(output, input, "dot");
            write_output(&dot_path, dot_source)?;
            Ok((dot_path.to_string_lossy().to_string(), None))
        }
        OutputFormat::Png => {
            let image_path = resolve_output_path(output, input, "png");
            let dot_path = dot_path_for(&image_path);
            write_output(&dot_path, dot_source)?;

            let dot_bin = resolve_dot_bin(cli.dot_bin.as_deref());
            class_graph::render::render_image(
                &dot_bin,
                &dot_path,
                &image_path,
                Duration::from_secs(cli.timeout_secs),
            )?;
            Ok((
                dot_path.to_string_lossy().to_string(),
                Some(image_path.to_string_lossy().to_string()),
            ))
        }
    }
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("failed to write output file: {}", path.display()))
}
