use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::RuleError;
use crate::rule::CollectionPolicy;

/// Reads collection policies from a YAML/JSON file or a directory of them.
pub fn load_policies(path: impl AsRef<Path>) -> Result<Vec<CollectionPolicy>, RuleError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RuleError::MissingPath(path.display().to_string()));
    }

    let mut policies = if path.is_dir() {
        load_from_directory(path)?
    } else {
        load_from_file(path)?
    };

    deduplicate(&policies)?;
    policies.sort_by(|a, b| a.pattern.as_str().cmp(b.pattern.as_str()));

    Ok(policies)
}

fn load_from_directory(path: &Path) -> Result<Vec<CollectionPolicy>, RuleError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| RuleError::from_io(path, err))? {
        let entry = entry.map_err(|err| RuleError::from_io(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| RuleError::from_io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();

    let mut policies = Vec::new();
    for entry in entries {
        if let Some(ext) = entry.extension().and_then(|value| value.to_str()) {
            if matches!(ext, "json" | "yaml" | "yml") {
                policies.append(&mut load_from_file(&entry)?);
            }
        }
    }

    Ok(policies)
}

fn load_from_file(path: &Path) -> Result<Vec<CollectionPolicy>, RuleError> {
    let raw = fs::read_to_string(path).map_err(|err| RuleError::from_io(path, err))?;
    parse_policies(&raw, path)
}

/// Accepts `{ policies: [...] }`, a bare list, or a single policy.
pub fn parse_policies(raw: &str, origin: &Path) -> Result<Vec<CollectionPolicy>, RuleError> {
    let mut attempts = Vec::new();

    match serde_yaml::from_str::<PolicyDocument>(raw) {
        Ok(doc) => return Ok(doc.policies),
        Err(err) => attempts.push(format!("policy document: {err}")),
    }

    match serde_yaml::from_str::<Vec<CollectionPolicy>>(raw) {
        Ok(list) => return Ok(list),
        Err(err) => attempts.push(format!("list: {err}")),
    }

    match serde_yaml::from_str::<CollectionPolicy>(raw) {
        Ok(policy) => return Ok(vec![policy]),
        Err(err) => attempts.push(format!("single: {err}")),
    }

    Err(RuleError::parse_error(origin, attempts.join("; ")))
}

fn deduplicate(policies: &[CollectionPolicy]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for policy in policies {
        if !seen.insert(policy.pattern.shape()) {
            return Err(RuleError::DuplicateRule {
                pattern: policy.pattern.to_string(),
                operation: "*".into(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    policies: Vec<CollectionPolicy>,
}
