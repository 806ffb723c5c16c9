//! Name canonicalization and descriptor/signature scanning.
//!
//! Canonical class names are slash-separated internal names with no `L…;`
//! object-descriptor wrapper and no trailing `.class` suffix. Everything the
//! extraction rules emit goes through `normalize_class_name` first.

use regex::Regex;
use std::sync::LazyLock;

static GENERIC_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("<([^>]+)>").expect("generic group pattern"));

/// Canonicalizes an internal name, descriptor, or dotted class name.
///
/// The leading `L` is only removed together with a trailing `;` so that class
/// names that merely start with `L` survive, which keeps the function
/// idempotent. A lone trailing `;` never appears in a canonical name either.
pub fn normalize_class_name(raw: &str) -> String {
    let mut name = raw.trim();
    if let Some(stripped) = name.strip_suffix(';') {
        name = stripped.strip_prefix('L').unwrap_or(stripped);
    }
    if let Some(stripped) = name.strip_suffix(".class") {
        name = stripped;
    }
    name.replace('.', "/")
}

/// Distinct class names mentioned in a method descriptor: every `L…;` run in
/// the parameter segment between `(` and `)` and in the return segment after
/// `)`. Primitive descriptor characters contribute nothing.
pub fn class_names_in_method_descriptor(descriptor: &str) -> Vec<String> {
    let mut names = Vec::new();
    let params_end = descriptor.find(')');

    if let (Some(start), Some(end)) = (descriptor.find('('), params_end)
        && start < end
    {
        scan_object_descriptors(&descriptor[start + 1..end], &mut names);
    }

    let return_segment = match params_end {
        Some(end) => &descriptor[end + 1..],
        None => descriptor,
    };
    scan_object_descriptors(return_segment, &mut names);

    names.sort();
    names.dedup();
    names
}

/// Distinct first-level `<…>` bracket groups of a generic signature, each
/// normalized as one name. Multi-argument groups collapse to a single name;
/// this mirrors the plain reference graph, which does not decompose generic
/// argument lists.
pub fn generic_types_in_signature(signature: Option<&str>) -> Vec<String> {
    let Some(signature) = signature else {
        return Vec::new();
    };
    if signature.is_empty() {
        return Vec::new();
    }

    let mut names: Vec<String> = GENERIC_GROUP
        .captures_iter(signature)
        .map(|caps| normalize_class_name(&caps[1]))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Folds anonymous/synthetic nested names into the nearest named enclosing
/// class by stripping trailing `$<digits>` suffixes until none remains.
pub fn fold_anonymous_class(name: &str) -> &str {
    let mut folded = name;
    loop {
        match folded.rfind('$') {
            Some(pos)
                if pos + 1 < folded.len()
                    && folded[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
            {
                folded = &folded[..pos];
            }
            _ => return folded,
        }
    }
}

fn scan_object_descriptors(segment: &str, names: &mut Vec<String>) {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'L' {
            i += 1;
            continue;
        }
        match segment[i + 1..].find(';') {
            Some(rel) => {
                names.push(segment[i + 1..i + 1 + rel].to_string());
                i += rel + 2;
            }
            None => break,
        }
    }
}
