//! Forward-only store migration.
//!
//! The store's `version` field is compared with [`CODE_VERSION`] using
//! semantic versioning. A store newer than the code is refused. An older
//! store is walked forward one step at a time: if a registered structural
//! step targets a version in `(stored, code]`, the earliest one is applied;
//! otherwise only the version number changes, since releases without a
//! registered step carry no format change.
//!
//! Steps are pure functions over the raw JSON, applied in memory before the
//! typed store is deserialized. Nothing is written until the next save.
//!
//! The registered steps rewrite this crate's own earlier snake_case layouts
//! (`path` documents before 1.1.0, embedded `document` objects in chunks
//! before 1.2.0). Stores from other tools with different key names are not
//! recognized.

use std::cmp::Ordering;
use std::path::Path;

use semver::Version;
use serde_json::{Map, Value};

use crate::error::{GrokError, Result};

/// The store format version written by this binary.
pub const CODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version assumed for stores written before the field existed.
pub const UNVERSIONED: &str = "0.1.0";

/// Outcome of [`migrate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: bool,
    pub from: String,
    pub to: String,
}

struct Step {
    target: &'static str,
    apply: fn(&mut Map<String, Value>) -> Result<()>,
}

/// Structural steps, ordered by target version.
const STEPS: &[Step] = &[
    Step {
        target: "1.1.0",
        apply: documents_to_rel_path,
    },
    Step {
        target: "1.2.0",
        apply: flatten_chunk_documents,
    },
];

/// Bring a raw store up to [`CODE_VERSION`].
pub fn migrate(store: &mut Value) -> Result<MigrationReport> {
    migrate_to(store, CODE_VERSION)
}

/// Bring a raw store up to `code_version`.
pub fn migrate_to(store: &mut Value, code_version: &str) -> Result<MigrationReport> {
    let obj = store.as_object_mut().ok_or_else(|| GrokError::Migration {
        target: code_version.to_string(),
        reason: "store is not a JSON object".into(),
    })?;

    let code = parse_version(code_version)?;
    let from = match obj.get("version").and_then(Value::as_str) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNVERSIONED.to_string(),
    };
    let mut current = parse_version(&from)?;
    tracing::debug!(store = %current, code = %code, "checking migrations");

    let mut migrated = false;
    loop {
        match current.cmp(&code) {
            Ordering::Equal => break,
            Ordering::Greater => {
                return Err(GrokError::StoreVersionTooNew {
                    store: current.to_string(),
                    code: code.to_string(),
                })
            }
            Ordering::Less => {}
        }

        let next = next_step(&current, &code)?;
        let target = match next {
            Some(step) => {
                let target = parse_version(step.target)?;
                tracing::info!(from = %current, to = %target, "running migration");
                (step.apply)(obj)?;
                target
            }
            None => {
                tracing::info!(from = %current, to = %code, "updating store version");
                code.clone()
            }
        };
        obj.insert("version".into(), Value::String(target.to_string()));
        current = target;
        migrated = true;
    }

    if !obj.contains_key("version") {
        obj.insert("version".into(), Value::String(current.to_string()));
    }

    Ok(MigrationReport {
        migrated,
        from,
        to: current.to_string(),
    })
}

fn next_step(current: &Version, code: &Version) -> Result<Option<&'static Step>> {
    for step in STEPS {
        let target = parse_version(step.target)?;
        if &target > current && &target <= code {
            return Ok(Some(step));
        }
    }
    Ok(None)
}

fn parse_version(s: &str) -> Result<Version> {
    Version::parse(s).map_err(|e| GrokError::InvalidVersion(s.to_string(), e))
}

/// 1.1.0: documents were keyed by `path` (possibly absolute); they are now
/// keyed by `rel_path` under the store root.
fn documents_to_rel_path(store: &mut Map<String, Value>) -> Result<()> {
    let root = store.get("root").and_then(Value::as_str).map(str::to_string);
    let Some(Value::Array(documents)) = store.get_mut("documents") else {
        return Ok(());
    };

    for doc in documents.iter_mut().filter_map(Value::as_object_mut) {
        let legacy = doc.remove("path");
        if doc.contains_key("rel_path") {
            continue;
        }
        let path = legacy
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| GrokError::Migration {
                target: "1.1.0".into(),
                reason: "document has neither path nor rel_path".into(),
            })?;
        doc.insert("rel_path".into(), Value::String(relativize(path, root.as_deref())));
    }
    Ok(())
}

/// 1.2.0: chunks embedded their whole document; they now carry its `rel_path`.
fn flatten_chunk_documents(store: &mut Map<String, Value>) -> Result<()> {
    let root = store.get("root").and_then(Value::as_str).map(str::to_string);
    let Some(Value::Array(chunks)) = store.get_mut("chunks") else {
        return Ok(());
    };

    for chunk in chunks.iter_mut().filter_map(Value::as_object_mut) {
        let Some(document) = chunk.remove("document") else {
            continue;
        };
        if chunk.contains_key("rel_path") {
            continue;
        }
        let rel_path = match (
            document.get("rel_path").and_then(Value::as_str),
            document.get("path").and_then(Value::as_str),
        ) {
            (Some(rel), _) => rel.to_string(),
            (None, Some(path)) => relativize(path, root.as_deref()),
            (None, None) => {
                return Err(GrokError::Migration {
                    target: "1.2.0".into(),
                    reason: "chunk document has no path".into(),
                })
            }
        };
        chunk.insert("rel_path".into(), Value::String(rel_path));
    }
    Ok(())
}

fn relativize(path: &str, root: Option<&str>) -> String {
    root.and_then(|root| Path::new(path).strip_prefix(root).ok())
        .and_then(Path::to_str)
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}
