//! Reference extraction rule engine.
//!
//! Two granularities: focused mode walks the instruction stream of one target
//! class; full mode additionally derives references from method descriptors,
//! generic signatures, field declarations, and the declared inner-class,
//! interface, and superclass relationships of every analyzed class.
//! Extraction is pure per class and fans out over rayon; results collect into
//! one deduplicating set, so emission order never matters.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::{ClassModel, Component, ComponentKind, Instruction, MethodModel, Reference};
use crate::names::{
    class_names_in_method_descriptor, generic_types_in_signature, normalize_class_name,
};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no classes decoded from input")]
    EmptyInput,
    #[error("target class {0} not found")]
    TargetNotFound(String),
    #[error("extraction produced an empty reference set")]
    EmptyReferences,
}

/// Focused mode: instruction-derived references of the one target class.
pub fn focused_references(
    classes: &HashMap<String, ClassModel>,
    target: &str,
) -> Result<HashSet<Reference>, AnalysisError> {
    if classes.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let target = normalize_class_name(target);
    let class = classes
        .get(&target)
        .ok_or_else(|| AnalysisError::TargetNotFound(target.clone()))?;

    let owner = normalize_class_name(&class.internal_name);
    let references: HashSet<Reference> = class
        .methods
        .iter()
        .flat_map(|method| instruction_references(&owner, method))
        .collect();

    if references.is_empty() {
        return Err(AnalysisError::EmptyReferences);
    }
    Ok(references)
}

/// Full mode: every rule applied to every analyzed class, in parallel.
/// `prefix_list` optionally restricts analysis to classes whose internal name
/// starts with at least one comma-separated prefix.
pub fn full_references(
    classes: &HashMap<String, ClassModel>,
    prefix_list: Option<&str>,
) -> Result<HashSet<Reference>, AnalysisError> {
    let analyzed = select_classes(classes, prefix_list);
    if analyzed.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let references: HashSet<Reference> = analyzed
        .par_iter()
        .flat_map_iter(|class| class_references(class))
        .collect();

    if references.is_empty() {
        return Err(AnalysisError::EmptyReferences);
    }
    Ok(references)
}

fn select_classes<'a>(
    classes: &'a HashMap<String, ClassModel>,
    prefix_list: Option<&str>,
) -> Vec<&'a ClassModel> {
    let prefixes: Vec<String> = prefix_list
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(normalize_class_name)
        .collect();

    classes
        .values()
        .filter(|class| {
            prefixes.is_empty()
                || prefixes
                    .iter()
                    .any(|prefix| class.internal_name.starts_with(prefix.as_str()))
        })
        .collect()
}

/// All references one class contributes in full mode.
fn class_references(class: &ClassModel) -> Vec<Reference> {
    let owner = normalize_class_name(&class.internal_name);
    let class_component = Component::new(owner.clone(), owner.clone(), ComponentKind::Class);
    let mut references = Vec::new();

    for method in &class.methods {
        references.extend(instruction_references(&owner, method));

        let source = method_component(&owner, method);
        let mut names = class_names_in_method_descriptor(&method.descriptor);
        names.extend(generic_types_in_signature(method.signature.as_deref()));
        names.sort();
        names.dedup();
        for name in names {
            let name = normalize_class_name(&name);
            references.push(Reference::new(
                source.clone(),
                Component::new(name.clone(), name, ComponentKind::Class),
            ));
        }
    }

    for field in &class.fields {
        let descriptor = normalize_class_name(&field.descriptor);
        references.push(Reference::new(
            Component::new(
                owner.clone(),
                format!("{descriptor}:{}", field.name),
                ComponentKind::Field,
            ),
            // Destination kind is Field even though the name denotes a type.
            Component::new(descriptor.clone(), descriptor, ComponentKind::Field),
        ));
    }

    for inner in &class.inner_classes {
        references.push(structural_reference(&class_component, inner));
    }
    for interface in &class.interfaces {
        references.push(structural_reference(&class_component, interface));
    }
    if let Some(super_name) = &class.super_name {
        references.push(structural_reference(&class_component, super_name));
    }

    references
}

fn structural_reference(source: &Component, destination_name: &str) -> Reference {
    let name = normalize_class_name(destination_name);
    Reference::new(
        source.clone(),
        Component::new(name.clone(), name, ComponentKind::Class),
    )
}

fn instruction_references<'a>(
    owner: &'a str,
    method: &'a MethodModel,
) -> impl Iterator<Item = Reference> + 'a {
    let source = method_component(owner, method);
    method
        .instructions
        .iter()
        .filter_map(move |instruction| {
            instruction_destination(instruction)
                .map(|destination| Reference::new(source.clone(), destination))
        })
}

fn method_component(owner: &str, method: &MethodModel) -> Component {
    Component::new(
        owner,
        format!("{}{}", method.name, method.descriptor),
        ComponentKind::Method,
    )
}

/// Destination component for one classified instruction; `Other` and anything
/// lacking data for its rule produce no edge.
fn instruction_destination(instruction: &Instruction) -> Option<Component> {
    match instruction {
        Instruction::TypeRef { descriptor, .. }
        | Instruction::MultiNewArray { descriptor, .. } => {
            let name = normalize_class_name(descriptor);
            Some(Component::new(name.clone(), name, ComponentKind::Class))
        }
        Instruction::LoadClassConstant { class_name } => {
            let name = normalize_class_name(class_name);
            Some(Component::new(name.clone(), name, ComponentKind::Class))
        }
        Instruction::InvokeMethod {
            owner,
            name,
            descriptor,
        } => Some(Component::new(
            normalize_class_name(owner),
            format!("{name}{descriptor}"),
            ComponentKind::Method,
        )),
        Instruction::AccessField {
            owner,
            name,
            descriptor,
        } => Some(Component::new(
            normalize_class_name(owner),
            format!("{}:{name}", normalize_class_name(descriptor)),
            ComponentKind::Field,
        )),
        Instruction::Other => None,
    }
}
