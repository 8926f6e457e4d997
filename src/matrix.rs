//! Matrix strategy expansion.
//!
//! A matrix declares axes of values and expands into the cartesian product
//! of combinations, one independent job instance per combination. Expansion
//! is deterministic: axis order and value order follow the workflow file.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::workflow::{scalar_to_string, Matrix};

/// One expanded matrix combination. Keys map axis names to the string
/// value a shell or expression would see. Empty for non-matrix jobs.
pub type Combination = BTreeMap<String, String>;

/// Expand a matrix into its ordered list of combinations.
///
/// `exclude` entries remove every combination they are a subset of, and are
/// applied before `include`. An `include` entry whose shared-axis keys match
/// an existing combination merges its extra keys into it; an entry matching
/// no combination is appended as a standalone combination.
pub fn expand(matrix: &Matrix) -> Result<Vec<Combination>> {
    let mut combos: Vec<Combination> = vec![Combination::new()];

    for (axis, values) in &matrix.axes {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(axis.clone(), scalar_to_string(value)?);
                next.push(extended);
            }
        }
        combos = next;
    }

    let excludes = stringify_entries(&matrix.exclude)?;
    combos.retain(|combo| !excludes.iter().any(|ex| is_subset(ex, combo)));

    let axis_names: Vec<&String> = matrix.axes.iter().map(|(name, _)| name).collect();
    for entry in stringify_entries(&matrix.include)? {
        let shared: Combination = entry
            .iter()
            .filter(|(k, _)| axis_names.iter().any(|a| *a == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // An entry naming no axis keys applies to every combination.
        let mut matched = false;
        for combo in combos.iter_mut() {
            if is_subset(&shared, combo) {
                for (k, v) in &entry {
                    combo.insert(k.clone(), v.clone());
                }
                matched = true;
            }
        }
        if !matched {
            combos.push(entry);
        }
    }

    Ok(combos)
}

/// Expand an optional matrix; a job without one gets a single empty
/// combination (one instance).
pub fn expand_or_single(matrix: Option<&Matrix>) -> Result<Vec<Combination>> {
    match matrix {
        Some(m) => expand(m),
        None => Ok(vec![Combination::new()]),
    }
}

/// Short human label for a combination: `(3.10, ubuntu-latest)`.
pub fn label(combo: &Combination) -> String {
    if combo.is_empty() {
        return String::new();
    }
    let values: Vec<&str> = combo.values().map(String::as_str).collect();
    format!("({})", values.join(", "))
}

fn stringify_entries(
    entries: &[BTreeMap<String, serde_yaml::Value>],
) -> Result<Vec<Combination>> {
    entries
        .iter()
        .map(|entry| {
            entry
                .iter()
                .map(|(k, v)| Ok((k.clone(), scalar_to_string(v)?)))
                .collect()
        })
        .collect()
}

fn is_subset(needle: &Combination, haystack: &Combination) -> bool {
    needle
        .iter()
        .all(|(k, v)| haystack.get(k).map(|hv| hv == v).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Workflow;

    fn matrix_of(yaml: &str) -> Matrix {
        let wf = Workflow::parse(&format!(
            "on: push\njobs:\n  a:\n    strategy:\n      matrix:\n{}\n    steps: []\n",
            yaml
        ))
        .unwrap();
        wf.job("a")
            .unwrap()
            .strategy
            .as_ref()
            .unwrap()
            .matrix
            .clone()
            .unwrap()
    }

    #[test]
    fn test_single_axis() {
        let m = matrix_of("        python-version: [\"3.10\", \"3.11\"]");
        let combos = expand(&m).unwrap();
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].get("python-version").unwrap(), "3.10");
        assert_eq!(combos[1].get("python-version").unwrap(), "3.11");
    }

    #[test]
    fn test_cartesian_product_order() {
        let m = matrix_of("        os: [linux, macos]\n        version: [\"1\", \"2\"]");
        let combos = expand(&m).unwrap();
        let flat: Vec<(String, String)> = combos
            .iter()
            .map(|c| {
                (
                    c.get("os").unwrap().clone(),
                    c.get("version").unwrap().clone(),
                )
            })
            .collect();
        assert_eq!(
            flat,
            vec![
                ("linux".to_string(), "1".to_string()),
                ("linux".to_string(), "2".to_string()),
                ("macos".to_string(), "1".to_string()),
                ("macos".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_numeric_values_stringified() {
        let m = matrix_of("        version: [8, 9]");
        let combos = expand(&m).unwrap();
        assert_eq!(combos[0].get("version").unwrap(), "8");
    }

    #[test]
    fn test_exclude_removes_subset_matches() {
        let m = matrix_of(
            "        os: [linux, macos]\n        version: [\"1\", \"2\"]\n        exclude:\n          - os: macos\n            version: \"1\"",
        );
        let combos = expand(&m).unwrap();
        assert_eq!(combos.len(), 3);
        assert!(!combos
            .iter()
            .any(|c| c.get("os").unwrap() == "macos" && c.get("version").unwrap() == "1"));
    }

    #[test]
    fn test_include_extends_matching_combination() {
        let m = matrix_of(
            "        os: [linux, macos]\n        include:\n          - os: linux\n            coverage: \"true\"",
        );
        let combos = expand(&m).unwrap();
        assert_eq!(combos.len(), 2);
        let linux = combos.iter().find(|c| c.get("os").unwrap() == "linux").unwrap();
        assert_eq!(linux.get("coverage").unwrap(), "true");
        let macos = combos.iter().find(|c| c.get("os").unwrap() == "macos").unwrap();
        assert!(macos.get("coverage").is_none());
    }

    #[test]
    fn test_include_appends_unmatched_combination() {
        let m = matrix_of(
            "        os: [linux]\n        include:\n          - os: windows\n            experimental: \"true\"",
        );
        let combos = expand(&m).unwrap();
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[1].get("os").unwrap(), "windows");
        assert_eq!(combos[1].get("experimental").unwrap(), "true");
    }

    #[test]
    fn test_empty_matrix_single_instance() {
        let combos = expand_or_single(None).unwrap();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
    }

    #[test]
    fn test_label() {
        let mut combo = Combination::new();
        assert_eq!(label(&combo), "");
        combo.insert("python-version".to_string(), "3.10".to_string());
        assert_eq!(label(&combo), "(3.10)");
    }
}
