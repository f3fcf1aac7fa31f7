//! YAML parser for manifests
//!
//! Parses and validates manifest files. Validation only covers structure;
//! component arguments are checked when the factory builds them.

use crate::error::{Error, Result};
use crate::manifest::types::{
    parse_method, ManifestDefinition, RequesterDefinition, RetrieverDefinition, StreamDefinition,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Load a manifest from a YAML file
pub fn load_manifest(path: impl AsRef<Path>) -> Result<ManifestDefinition> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read manifest '{}': {}",
            path.display(),
            e
        ))
    })?;
    load_manifest_from_str(&content)
}

/// Load a manifest from a YAML string
pub fn load_manifest_from_str(yaml: &str) -> Result<ManifestDefinition> {
    let def: ManifestDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse manifest YAML: {e}")))?;

    validate_manifest(&def)?;
    Ok(def)
}

/// Validate a manifest definition
pub fn validate_manifest(def: &ManifestDefinition) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::config("Manifest name cannot be empty"));
    }

    if def.url_base.trim().is_empty() {
        return Err(Error::config("Manifest url_base cannot be empty"));
    }

    if def.streams.is_empty() {
        return Err(Error::config("Manifest must have at least one stream"));
    }

    let stream_names: HashSet<_> = def.streams.iter().map(|s| s.name.as_str()).collect();
    if stream_names.len() != def.streams.len() {
        return Err(Error::config("Duplicate stream names found"));
    }

    for stream in &def.streams {
        validate_stream(stream)?;
        for parent in stream.retriever.parent_streams() {
            if !stream_names.contains(parent) {
                return Err(Error::config(format!(
                    "Stream '{}' references unknown parent stream '{parent}'",
                    stream.name
                )));
            }
        }
    }

    for stream in &def.streams {
        check_acyclic(def, &stream.name, &mut Vec::new())?;
    }

    if let Some(check) = &def.check {
        for name in &check.stream_names {
            if !stream_names.contains(name.as_str()) {
                return Err(Error::config(format!(
                    "Check references unknown stream '{name}'"
                )));
            }
        }
    }

    Ok(())
}

/// Validate a stream definition
fn validate_stream(stream: &StreamDefinition) -> Result<()> {
    if stream.name.trim().is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }

    match &stream.retriever {
        RetrieverDefinition::Simple { requester, .. } => validate_requester(stream, requester)?,
        RetrieverDefinition::Substream {
            parent_stream_configs,
            nested_field,
            requester,
            ..
        } => {
            if parent_stream_configs.is_empty() {
                return Err(Error::config(format!(
                    "Stream '{}' substream needs at least one parent stream",
                    stream.name
                )));
            }
            if nested_field.is_none() && requester.is_none() {
                return Err(Error::config(format!(
                    "Stream '{}' substream needs a nested_field or a requester",
                    stream.name
                )));
            }
            if let Some(requester) = requester {
                validate_requester(stream, requester)?;
            }
        }
        RetrieverDefinition::Async { job, .. } => {
            if parse_method(&job.create.http_method).is_none() {
                return Err(Error::config(format!(
                    "Stream '{}' has invalid HTTP method: {}",
                    stream.name, job.create.http_method
                )));
            }
        }
    }

    if let Some(incremental) = &stream.incremental_sync {
        if incremental.cursor_field.trim().is_empty() {
            return Err(Error::config(format!(
                "Stream '{}' cursor_field cannot be empty",
                stream.name
            )));
        }
    }

    Ok(())
}

fn validate_requester(stream: &StreamDefinition, requester: &RequesterDefinition) -> Result<()> {
    if requester.path.is_empty() {
        return Err(Error::config(format!(
            "Stream '{}' path cannot be empty",
            stream.name
        )));
    }

    if requester.method().is_none() {
        return Err(Error::config(format!(
            "Stream '{}' has invalid HTTP method: {}",
            stream.name, requester.http_method
        )));
    }

    Ok(())
}

fn check_acyclic<'a>(
    def: &'a ManifestDefinition,
    name: &'a str,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    if path.contains(&name) {
        path.push(name);
        return Err(Error::config(format!(
            "Parent stream cycle: {}",
            path.join(" -> ")
        )));
    }
    let Some(stream) = def.stream(name) else {
        return Ok(());
    };

    path.push(name);
    for parent in stream.retriever.parent_streams() {
        check_acyclic(def, parent, path)?;
    }
    path.pop();
    Ok(())
}
