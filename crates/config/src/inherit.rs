// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime namespace inheritance.
//!
//! `[runtime]` namespaces support multiple inheritance resolved with C3
//! linearization, the same method-resolution order used for the original
//! string-keyed config. Every namespace implicitly inherits from `root`
//! when one is defined.

use crate::error::WorkflowConfigError;
use std::collections::HashMap;

/// Compute the C3 linearization (MRO) for a namespace.
///
/// The result starts with `name` itself and ends at the most generic
/// ancestor. Cyclic or inconsistent hierarchies are errors.
pub fn linearize(
    name: &str,
    parents: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, WorkflowConfigError> {
    let mut memo: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_progress: Vec<String> = Vec::new();
    c3(name, parents, &mut memo, &mut in_progress)
}

fn c3(
    name: &str,
    parents: &HashMap<String, Vec<String>>,
    memo: &mut HashMap<String, Vec<String>>,
    in_progress: &mut Vec<String>,
) -> Result<Vec<String>, WorkflowConfigError> {
    if let Some(done) = memo.get(name) {
        return Ok(done.clone());
    }
    if in_progress.iter().any(|n| n == name) {
        return Err(WorkflowConfigError::CyclicInheritance(name.to_string()));
    }
    in_progress.push(name.to_string());

    let direct: Vec<String> = parents.get(name).cloned().unwrap_or_default();
    let mut sequences: Vec<Vec<String>> = Vec::new();
    for parent in &direct {
        sequences.push(c3(parent, parents, memo, in_progress)?);
    }
    sequences.push(direct.clone());

    let mut result = vec![name.to_string()];
    merge(&mut sequences, &mut result, name)?;

    in_progress.pop();
    memo.insert(name.to_string(), result.clone());
    Ok(result)
}

/// C3 merge: repeatedly take a head that appears in no sequence tail.
fn merge(
    sequences: &mut Vec<Vec<String>>,
    result: &mut Vec<String>,
    name: &str,
) -> Result<(), WorkflowConfigError> {
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(());
        }

        let candidate = sequences
            .iter()
            .map(|s| s[0].clone())
            .find(|head| !sequences.iter().any(|s| s[1..].contains(head)));

        match candidate {
            Some(head) => {
                result.push(head.clone());
                for s in sequences.iter_mut() {
                    s.retain(|n| *n != head);
                }
            }
            None => {
                return Err(WorkflowConfigError::Invalid {
                    location: format!("runtime.{name}"),
                    message: "inconsistent inheritance hierarchy (no C3 linearization)"
                        .to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "inherit_tests.rs"]
mod tests;
