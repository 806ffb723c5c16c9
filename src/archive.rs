//! Class-bytes collection and bulk decoding.
//!
//! Accepts a jar/zip archive, a single `.class` file, or a directory tree and
//! yields `(entry-path, raw-bytes)` pairs for class-suffixed entries only.
//! All bytes are fully materialized before decoding begins; decoding then
//! fans out over rayon. One corrupt entry never aborts the batch: it is
//! recorded as a skipped entry and the run continues.

use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::mpsc;
use zip::ZipArchive;

use crate::classfile::{self, DecodeError};
use crate::model::ClassModel;

const CLASS_SUFFIX: &str = ".class";

#[derive(Debug)]
pub struct ClassEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// One archive entry that failed to decode; reported as a warning, never
/// fatal for the batch.
#[derive(Debug)]
pub struct SkippedEntry {
    pub path: String,
    pub error: DecodeError,
}

/// Decoded classes keyed by internal name, plus the entries that failed.
/// Duplicate internal names resolve last-write-wins in entry order.
#[derive(Debug)]
pub struct DecodedClasses {
    pub classes: HashMap<String, ClassModel>,
    pub skipped: Vec<SkippedEntry>,
}

/// Collects raw class bytes from a jar/zip archive, a bare `.class` file, or
/// a directory scanned recursively. Non-class and directory entries are
/// filtered out here.
pub fn collect_class_entries(input: &Path) -> Result<Vec<ClassEntry>> {
    if input.is_dir() {
        return collect_from_directory(input);
    }

    match input.extension().and_then(|e| e.to_str()) {
        Some("jar") | Some("zip") | Some("war") => collect_from_archive(input),
        Some("class") => {
            let bytes = std::fs::read(input)
                .with_context(|| format!("failed to read class file: {}", input.display()))?;
            Ok(vec![ClassEntry {
                path: input.to_string_lossy().to_string(),
                bytes,
            }])
        }
        _ => anyhow::bail!(
            "unsupported input {}: expected a .jar/.zip archive, a .class file, or a directory",
            input.display()
        ),
    }
}

fn collect_from_archive(archive_path: &Path) -> Result<Vec<ClassEntry>> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime
    // of the mmap. The mmap is dropped before the file, ensuring memory safety.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to mmap archive: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("failed to read zip structure: {}", archive_path.display()))?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if !name.ends_with(CLASS_SUFFIX) {
            continue;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read archive entry: {name}"))?;
        entries.push(ClassEntry { path: name, bytes });
    }

    Ok(entries)
}

fn collect_from_directory(root: &Path) -> Result<Vec<ClassEntry>> {
    let (tx, rx) = mpsc::channel();

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.is_file() && path.to_string_lossy().ends_with(CLASS_SUFFIX) {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut paths: Vec<_> = rx.iter().collect();
    paths.sort();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read class file: {}", path.display()))?;
        entries.push(ClassEntry {
            path: path.to_string_lossy().to_string(),
            bytes,
        });
    }
    Ok(entries)
}

/// Decodes every entry in parallel. Failures are collected, not raised;
/// successful models land in the map keyed by internal name, later entries
/// overwriting earlier ones.
pub fn decode_entries(entries: Vec<ClassEntry>) -> DecodedClasses {
    let decoded: Vec<(String, Result<ClassModel, DecodeError>)> = entries
        .into_par_iter()
        .map(|entry| {
            let result = classfile::decode(&entry.bytes);
            (entry.path, result)
        })
        .collect();

    let mut classes = HashMap::new();
    let mut skipped = Vec::new();
    for (path, result) in decoded {
        match result {
            Ok(model) => {
                classes.insert(model.internal_name.clone(), model);
            }
            Err(error) => skipped.push(SkippedEntry { path, error }),
        }
    }

    DecodedClasses { classes, skipped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_graph_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn collect_filters_non_class_entries() -> Result<()> {
        let jar = temp_path("filter.jar");
        write_jar(
            &jar,
            &[
                ("a/B.class", b"one".as_slice()),
                ("META-INF/MANIFEST.MF", b"manifest".as_slice()),
                ("a/resource.txt", b"text".as_slice()),
            ],
        )?;

        let entries = collect_class_entries(&jar)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a/B.class");
        assert_eq!(entries[0].bytes, b"one");

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn collect_handles_empty_archive() -> Result<()> {
        let jar = temp_path("empty.jar");
        write_jar(&jar, &[("README.txt", b"nothing here".as_slice())])?;

        let entries = collect_class_entries(&jar)?;
        assert!(entries.is_empty());

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn collect_walks_directories() -> Result<()> {
        let root = temp_path("classes_dir");
        std::fs::create_dir_all(root.join("a/b"))?;
        std::fs::write(root.join("a/b/C.class"), b"c")?;
        std::fs::write(root.join("a/notes.md"), b"n")?;

        let entries = collect_class_entries(&root)?;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].path.ends_with("C.class"));

        std::fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn collect_rejects_unknown_extensions() {
        let err = collect_class_entries(Path::new("input.exe")).unwrap_err();
        assert!(err.to_string().contains("unsupported input"));
    }

    #[test]
    fn decode_entries_skips_corrupt_without_aborting() {
        let entries = vec![
            ClassEntry {
                path: "bad/Corrupt.class".to_string(),
                bytes: vec![0xDE, 0xAD],
            },
            ClassEntry {
                path: "a/B.class".to_string(),
                bytes: minimal_class_bytes("a/B", "java/lang/Object"),
            },
        ];

        let decoded = decode_entries(entries);
        assert_eq!(decoded.classes.len(), 1);
        assert!(decoded.classes.contains_key("a/B"));
        assert_eq!(decoded.skipped.len(), 1);
        assert_eq!(decoded.skipped[0].path, "bad/Corrupt.class");
    }

    #[test]
    fn decode_entries_resolves_duplicates_last_write_wins() {
        let decoded = decode_entries(vec![
            ClassEntry {
                path: "first/a/B.class".to_string(),
                bytes: minimal_class_bytes("a/B", "x/Old"),
            },
            ClassEntry {
                path: "second/a/B.class".to_string(),
                bytes: minimal_class_bytes("a/B", "x/New"),
            },
        ]);
        assert_eq!(decoded.classes.len(), 1);
        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.classes["a/B"].super_name.as_deref(), Some("x/New"));
    }

    // A hand-assembled minimal class: two class constants, no members.
    fn minimal_class_bytes(name: &str, super_name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(0xCAFE_BABEu32.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(52u16.to_be_bytes());

        // pool: 1 utf8(name), 2 class(1), 3 utf8(super), 4 class(3)
        out.extend(5u16.to_be_bytes());
        out.push(1);
        out.extend((name.len() as u16).to_be_bytes());
        out.extend(name.as_bytes());
        out.push(7);
        out.extend(1u16.to_be_bytes());
        out.push(1);
        out.extend((super_name.len() as u16).to_be_bytes());
        out.extend(super_name.as_bytes());
        out.push(7);
        out.extend(3u16.to_be_bytes());

        out.extend(0x0021u16.to_be_bytes());
        out.extend(2u16.to_be_bytes()); // this
        out.extend(4u16.to_be_bytes()); // super
        out.extend(0u16.to_be_bytes()); // interfaces
        out.extend(0u16.to_be_bytes()); // fields
        out.extend(0u16.to_be_bytes()); // methods
        out.extend(0u16.to_be_bytes()); // attributes
        out
    }
}
