//! # class-graph
//!
//! Derives a directed graph of semantic references between JVM program
//! elements (classes, methods, fields) from compiled bytecode, and renders
//! it with Graphviz.
//!
//! ## Architecture
//!
//! - **model**: immutable `Component`/`Reference`/`ClassModel` value hierarchy
//! - **classfile**: binary class-file decoder and instruction classifier
//! - **names**: internal-name canonicalization and descriptor/signature scans
//! - **archive**: class-bytes collection from jars, files, and directories,
//!   plus failure-tolerant bulk decoding
//! - **extract**: the reference-extraction rule engine (focused and full modes)
//! - **render**: graph views, DOT emission, and external Graphviz invocation
//! - **cli**: command-line interface definitions
//! - **config**: binary, output-path, and namespace-filter resolution

pub mod archive;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod extract;
pub mod model;
pub mod names;
pub mod render;
