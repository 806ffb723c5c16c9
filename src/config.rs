use std::env;
use std::path::{Path, PathBuf};

use crate::names::normalize_class_name;
use crate::render::DEFAULT_PLATFORM_PREFIXES;

pub const DOT_BIN_ENV: &str = "CLASS_GRAPH_DOT";

/// Resolution order: --dot-bin flag, CLASS_GRAPH_DOT env, plain "dot".
pub fn resolve_dot_bin(flag: Option<&str>) -> String {
    if let Some(bin) = flag {
        return bin.to_string();
    }
    if let Ok(bin) = env::var(DOT_BIN_ENV)
        && !bin.is_empty()
    {
        return bin;
    }
    "dot".to_string()
}

/// Output defaults to the input path with the requested extension.
pub fn resolve_output_path(output: Option<PathBuf>, input: &Path, extension: &str) -> PathBuf {
    match output {
        Some(path) => path,
        None => input.with_extension(extension),
    }
}

/// The DOT file sits next to the image it was rendered from.
pub fn dot_path_for(output: &Path) -> PathBuf {
    output.with_extension("dot")
}

/// Effective platform-namespace exclude set: the default list unless
/// disabled, plus any user-supplied prefixes, all normalized.
pub fn build_exclude_prefixes(extra: &[String], no_default: bool) -> Vec<String> {
    let mut prefixes: Vec<String> = if no_default {
        Vec::new()
    } else {
        DEFAULT_PLATFORM_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect()
    };

    for prefix in extra {
        let prefix = normalize_class_name(prefix);
        if !prefix.is_empty() && !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    prefixes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_dot_bin_prefers_the_flag() {
        assert_eq!(
            resolve_dot_bin(Some("/opt/graphviz/bin/dot")),
            "/opt/graphviz/bin/dot"
        );
    }

    #[test]
    fn resolve_dot_bin_falls_back_to_plain_dot() {
        // The env override is exercised end-to-end in the integration test;
        // only the default path is deterministic here.
        if env::var(DOT_BIN_ENV).is_err() {
            assert_eq!(resolve_dot_bin(None), "dot");
        }
    }

    #[test]
    fn resolve_output_path_defaults_next_to_input() {
        let resolved = resolve_output_path(None, Path::new("build/app.jar"), "png");
        assert_eq!(resolved, PathBuf::from("build/app.png"));

        let explicit = resolve_output_path(
            Some(PathBuf::from("graphs/deps.png")),
            Path::new("build/app.jar"),
            "png",
        );
        assert_eq!(explicit, PathBuf::from("graphs/deps.png"));
    }

    #[test]
    fn dot_path_sits_next_to_the_image() {
        assert_eq!(
            dot_path_for(Path::new("graphs/deps.png")),
            PathBuf::from("graphs/deps.dot")
        );
    }

    #[test]
    fn exclude_prefixes_extend_and_normalize() {
        let prefixes = build_exclude_prefixes(&["com.acme.generated".to_string()], false);
        assert!(prefixes.contains(&"java/".to_string()));
        assert!(prefixes.contains(&"com/acme/generated".to_string()));
    }

    #[test]
    fn exclude_prefixes_can_drop_the_defaults() {
        let prefixes = build_exclude_prefixes(&["com/acme".to_string()], true);
        assert_eq!(prefixes, vec!["com/acme".to_string()]);
    }
}
