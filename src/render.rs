//! Graph views, DOT emission, and Graphviz invocation.
//!
//! The reference set is collapsed into one of two views before drawing: the
//! class-only view for whole-archive graphs and the member view for a single
//! focused class. PNG rendering shells out to the Graphviz `dot` binary with
//! a bounded wait; on timeout the process is killed and any partial output is
//! removed.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::model::{ComponentKind, Reference};
use crate::names::fold_anonymous_class;

/// Platform namespaces dropped from the class-only view by default. Callers
/// assemble the effective prefix set from configuration; this list is only
/// the default.
pub const DEFAULT_PLATFORM_PREFIXES: &[&str] = &[
    "java/",
    "javax/",
    "android/",
    "androidx/",
    "kotlin/",
    "com/google/",
    "org/hamcrest/",
    "org/junit/",
];

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub fold_anonymous: bool,
    pub exclude_prefixes: Vec<String>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            fold_anonymous: true,
            exclude_prefixes: DEFAULT_PLATFORM_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Class-only view: each reference collapses to its owner pair. Self-loops
/// and excluded namespaces are dropped before anonymous folding, so a folded
/// pair may still collapse onto itself; the result is sorted and deduplicated
/// for stable DOT output.
pub fn class_view_edges(
    references: &HashSet<Reference>,
    options: &ViewOptions,
) -> Vec<(String, String)> {
    let mut edges: Vec<(String, String)> = references
        .iter()
        .map(|r| (r.src.owner.as_str(), r.dst.owner.as_str()))
        .filter(|(src, dst)| src != dst)
        .filter(|(src, dst)| !is_excluded(src, options) && !is_excluded(dst, options))
        .map(|(src, dst)| {
            if options.fold_anonymous {
                (
                    fold_anonymous_class(src).to_string(),
                    fold_anonymous_class(dst).to_string(),
                )
            } else {
                (src.to_string(), dst.to_string())
            }
        })
        .collect();

    edges.sort();
    edges.dedup();
    edges
}

/// Member view: method/field-granularity edges only. Class-to-class
/// structural edges belong to the coarser full-mode graph.
pub fn member_view_references(references: &HashSet<Reference>) -> Vec<&Reference> {
    let mut members: Vec<&Reference> = references
        .iter()
        .filter(|r| {
            r.src.kind != ComponentKind::Class && r.dst.kind != ComponentKind::Class
        })
        .collect();
    members.sort_by_key(|r| r.to_string());
    members
}

pub fn class_view_dot(graph_name: &str, edges: &[(String, String)]) -> String {
    let mut dot = dot_header(graph_name);
    let mut nodes: Vec<&str> = edges
        .iter()
        .flat_map(|(src, dst)| [src.as_str(), dst.as_str()])
        .collect();
    nodes.sort();
    nodes.dedup();

    for node in nodes {
        dot.push_str(&format!(
            "  \"{}\" [color=\"{}\"];\n",
            escape(node),
            kind_color(ComponentKind::Class)
        ));
    }
    for (src, dst) in edges {
        dot.push_str(&format!("  \"{}\" -> \"{}\";\n", escape(src), escape(dst)));
    }
    dot.push_str("}\n");
    dot
}

pub fn member_view_dot(graph_name: &str, references: &[&Reference]) -> String {
    let mut dot = dot_header(graph_name);

    let mut nodes: Vec<(String, ComponentKind)> = references
        .iter()
        .flat_map(|r| {
            [
                (node_name(&r.src.owner, &r.src.name), r.src.kind),
                (node_name(&r.dst.owner, &r.dst.name), r.dst.kind),
            ]
        })
        .collect();
    nodes.sort();
    nodes.dedup();

    for (name, kind) in nodes {
        dot.push_str(&format!(
            "  \"{}\" [color=\"{}\"];\n",
            escape(&name),
            kind_color(kind)
        ));
    }
    for r in references {
        dot.push_str(&format!(
            "  \"{}\" -> \"{}\";\n",
            escape(&node_name(&r.src.owner, &r.src.name)),
            escape(&node_name(&r.dst.owner, &r.dst.name)),
        ));
    }
    dot.push_str("}\n");
    dot
}

/// Renders a DOT file to an image by invoking the external Graphviz binary.
/// Waits at most `timeout`; a run that exceeds it is killed, its partial
/// output removed, and the call fails.
pub fn render_image(
    dot_bin: &str,
    dot_path: &Path,
    image_path: &Path,
    timeout: Duration,
) -> Result<()> {
    let mut child = Command::new(dot_bin)
        .arg("-Tpng")
        .arg(dot_path)
        .arg("-o")
        .arg(image_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!("failed to launch graphviz binary '{dot_bin}' (install graphviz or use --dot-bin)")
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => {
                let mut stderr = String::new();
                if let Some(pipe) = child.stderr.as_mut() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                anyhow::bail!(
                    "graphviz rendering failed (status {:?}): {}",
                    status.code(),
                    stderr.trim()
                );
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = std::fs::remove_file(image_path);
                    anyhow::bail!(
                        "graphviz rendering timed out after {}s",
                        timeout.as_secs()
                    );
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn dot_header(graph_name: &str) -> String {
    format!(
        "digraph \"{}\" {{\n  rankdir=TB;\n  ranksep=2.0;\n",
        escape(graph_name)
    )
}

fn node_name(owner: &str, name: &str) -> String {
    format!("{owner}.{name}")
}

fn kind_color(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Field => "royalblue",
        ComponentKind::Class => "springgreen",
        ComponentKind::Undefined => "red",
        ComponentKind::Method => "black",
    }
}

fn escape(id: &str) -> String {
    id.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_excluded(owner: &str, options: &ViewOptions) -> bool {
    options
        .exclude_prefixes
        .iter()
        .any(|prefix| owner.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Component;

    fn reference(src: (&str, &str, ComponentKind), dst: (&str, &str, ComponentKind)) -> Reference {
        Reference::new(
            Component::new(src.0, src.1, src.2),
            Component::new(dst.0, dst.1, dst.2),
        )
    }

    fn set(references: Vec<Reference>) -> HashSet<Reference> {
        references.into_iter().collect()
    }

    #[test]
    fn class_view_collapses_and_drops_self_loops() {
        let references = set(vec![
            reference(
                ("a/B", "run()V", ComponentKind::Method),
                ("a/C", "a/C", ComponentKind::Class),
            ),
            reference(
                ("a/B", "run()V", ComponentKind::Method),
                ("a/B", "helper()V", ComponentKind::Method),
            ),
        ]);

        let edges = class_view_edges(&references, &ViewOptions::default());
        assert_eq!(edges, vec![("a/B".to_string(), "a/C".to_string())]);
    }

    #[test]
    fn class_view_applies_exclude_prefixes() {
        let references = set(vec![
            reference(
                ("a/B", "a/B", ComponentKind::Class),
                ("java/lang/Object", "java/lang/Object", ComponentKind::Class),
            ),
            reference(
                ("a/B", "a/B", ComponentKind::Class),
                ("a/C", "a/C", ComponentKind::Class),
            ),
        ]);

        let edges = class_view_edges(&references, &ViewOptions::default());
        assert_eq!(edges, vec![("a/B".to_string(), "a/C".to_string())]);

        let keep_all = ViewOptions {
            exclude_prefixes: Vec::new(),
            ..ViewOptions::default()
        };
        assert_eq!(class_view_edges(&references, &keep_all).len(), 2);
    }

    #[test]
    fn class_view_folds_anonymous_classes() {
        let references = set(vec![reference(
            ("a/B$1", "run()V", ComponentKind::Method),
            ("a/C", "a/C", ComponentKind::Class),
        )]);

        let folded = class_view_edges(&references, &ViewOptions::default());
        assert_eq!(folded, vec![("a/B".to_string(), "a/C".to_string())]);

        let kept = class_view_edges(
            &references,
            &ViewOptions {
                fold_anonymous: false,
                ..ViewOptions::default()
            },
        );
        assert_eq!(kept, vec![("a/B$1".to_string(), "a/C".to_string())]);
    }

    #[test]
    fn class_view_deduplicates_collapsed_edges() {
        let references = set(vec![
            reference(
                ("a/B", "run()V", ComponentKind::Method),
                ("a/C", "a/C", ComponentKind::Class),
            ),
            reference(
                ("a/B", "stop()V", ComponentKind::Method),
                ("a/C", "<init>()V", ComponentKind::Method),
            ),
        ]);

        let edges = class_view_edges(&references, &ViewOptions::default());
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn member_view_drops_class_kind_endpoints() {
        let references = set(vec![
            reference(
                ("a/B", "run()V", ComponentKind::Method),
                ("a/C", "a/C", ComponentKind::Class),
            ),
            reference(
                ("a/B", "run()V", ComponentKind::Method),
                ("a/C", "go()V", ComponentKind::Method),
            ),
            reference(
                ("a/B", "run()V", ComponentKind::Method),
                ("a/C", "I:x", ComponentKind::Field),
            ),
        ]);

        let members = member_view_references(&references);
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|r| r.dst.kind != ComponentKind::Class));
    }

    #[test]
    fn dot_output_quotes_and_colors_nodes() {
        let references = set(vec![reference(
            ("a/B", "run()V", ComponentKind::Method),
            ("a/C", "Ljava/lang/String;:name", ComponentKind::Field),
        )]);
        let members = member_view_references(&references);
        let dot = member_view_dot("a/B", &members);

        assert!(dot.starts_with("digraph \"a/B\" {"));
        assert!(dot.contains("rankdir=TB;"));
        assert!(dot.contains("\"a/B.run()V\" [color=\"black\"];"));
        assert!(dot.contains("[color=\"royalblue\"];"));
        assert!(dot.contains("\"a/B.run()V\" -> \"a/C.Ljava/lang/String;:name\";"));
    }

    #[test]
    fn class_view_dot_lists_every_node_once() {
        let edges = vec![
            ("a/B".to_string(), "a/C".to_string()),
            ("a/C".to_string(), "a/D".to_string()),
        ];
        let dot = class_view_dot("app.jar", &edges);

        assert_eq!(dot.matches("\"a/C\" [color=\"springgreen\"];").count(), 1);
        assert!(dot.contains("\"a/B\" -> \"a/C\";"));
        assert!(dot.contains("\"a/C\" -> \"a/D\";"));
    }

    #[cfg(unix)]
    mod graphviz {
        use super::*;
        use std::path::PathBuf;
        use std::time::{SystemTime, UNIX_EPOCH};

        fn temp_dir(name: &str) -> PathBuf {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            std::env::temp_dir().join(format!(
                "class_graph_render_test_{}_{}_{}",
                std::process::id(),
                nanos,
                name
            ))
        }

        fn fake_dot(dir: &Path, script: &str) -> Result<PathBuf> {
            use std::os::unix::fs::PermissionsExt;
            std::fs::create_dir_all(dir)?;
            let path = dir.join("dot");
            std::fs::write(&path, script)?;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms)?;
            Ok(path)
        }

        #[test]
        fn render_image_succeeds_with_working_binary() -> Result<()> {
            let base = temp_dir("render_ok");
            let bin = fake_dot(
                &base,
                "#!/bin/sh\nprintf png > \"$4\"\n",
            )?;
            let dot_path = base.join("graph.dot");
            let image_path = base.join("graph.png");
            std::fs::write(&dot_path, "digraph g {}\n")?;

            render_image(
                bin.to_str().unwrap(),
                &dot_path,
                &image_path,
                Duration::from_secs(10),
            )?;
            assert_eq!(std::fs::read(&image_path)?, b"png");

            std::fs::remove_dir_all(base)?;
            Ok(())
        }

        #[test]
        fn render_image_reports_stderr_on_failure() -> Result<()> {
            let base = temp_dir("render_fail");
            let bin = fake_dot(&base, "#!/bin/sh\necho \"syntax error in line 1\" >&2\nexit 1\n")?;
            let dot_path = base.join("graph.dot");
            std::fs::write(&dot_path, "digraph g {}\n")?;

            let err = render_image(
                bin.to_str().unwrap(),
                &dot_path,
                &base.join("graph.png"),
                Duration::from_secs(10),
            )
            .unwrap_err()
            .to_string();
            assert!(err.contains("graphviz rendering failed"));
            assert!(err.contains("syntax error in line 1"));

            std::fs::remove_dir_all(base)?;
            Ok(())
        }

        #[test]
        fn render_image_fails_closed_on_timeout() -> Result<()> {
            let base = temp_dir("render_timeout");
            let bin = fake_dot(
                &base,
                "#!/bin/sh\nprintf partial > \"$4\"\nsleep 30\n",
            )?;
            let dot_path = base.join("graph.dot");
            let image_path = base.join("graph.png");
            std::fs::write(&dot_path, "digraph g {}\n")?;

            let err = render_image(
                bin.to_str().unwrap(),
                &dot_path,
                &image_path,
                Duration::from_millis(200),
            )
            .unwrap_err()
            .to_string();
            assert!(err.contains("timed out"));
            assert!(!image_path.exists());

            std::fs::remove_dir_all(base)?;
            Ok(())
        }
    }
}
