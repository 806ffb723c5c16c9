use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-graph")]
#[command(version)]
#[command(about = "Derive class, method, and field reference graphs from compiled JVM bytecode")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Graphviz binary used for image rendering (default: CLASS_GRAPH_DOT
    /// env, then "dot" on PATH).
    #[arg(long, value_name = "BIN")]
    pub dot_bin: Option<String>,

    /// Seconds to wait for the external renderer before failing.
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Draw the intra-class flow of one class: field accesses and method
    /// calls are depicted at member granularity.
    Class {
        /// Input archive (.jar/.zip), .class file, or class directory.
        input: PathBuf,

        /// Fully qualified internal class name (ex. com/package/name/ClassName).
        target: String,

        /// Output image path; defaults to the input path with a .png extension.
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Png)]
        format: OutputFormat,
    },
    /// Draw the inter-class flow of a whole archive; classes are the only
    /// node type, since the full member-level relation graph is too big to
    /// be drawn.
    Jar {
        /// Input archive (.jar/.zip), .class file, or class directory.
        input: PathBuf,

        /// Comma-separated class or package name prefixes to analyze;
        /// everything decoded is analyzed when absent.
        #[arg(short = 't', long, value_name = "PREFIXES")]
        target: Option<String>,

        /// Output image path; defaults to the input path with a .png extension.
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Keep anonymous class nodes instead of folding them into the
        /// nearest named enclosing class.
        #[arg(long)]
        keep_anonymous: bool,

        /// Additional namespace prefixes to drop from the graph.
        #[arg(long, value_name = "PREFIXES", value_delimiter = ',')]
        exclude: Vec<String>,

        /// Do not drop the default platform namespaces (java/, javax/, ...).
        #[arg(long)]
        no_default_exclude: bool,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Png)]
        format: OutputFormat,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Emit the DOT file and render it to PNG with Graphviz.
    Png,
    /// Emit the DOT file only; no external renderer is invoked.
    Dot,
}
