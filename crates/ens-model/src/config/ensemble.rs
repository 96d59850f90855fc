use std::{collections::BTreeSet, fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::{Batch, ModelError, TaskList, Vars, domain::null_as_default};

/// Keys that must be set per batch and may not come from `batch_config`.
const BATCH_ONLY_KEYS: [&str; 2] = ["name", "basedir"];

/// Top level of an ensemble file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleFile {
    pub ensemble: Ensemble,
}

/// Ensemble configuration: global variables, process level tasks and the batches in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ensemble {
    #[serde(default, deserialize_with = "null_as_default")]
    pub vars: Vars,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pre_process: TaskList,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_process: TaskList,
    pub batches: Vec<Batch>,
}

impl Ensemble {
    /// Load and validate an ensemble file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate an ensemble document.
    ///
    /// A `batch_config` mapping under `ensemble` supplies defaults for every batch
    /// that does not set the key itself.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ModelError> {
        let mut doc: YamlValue = serde_yaml::from_str(raw)?;
        apply_batch_config(&mut doc)?;

        let file: EnsembleFile = serde_yaml::from_value(doc)?;
        file.ensemble.validate()?;
        Ok(file.ensemble)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let mut names = BTreeSet::new();
        for batch in &self.batches {
            batch.validate()?;
            if !names.insert(batch.name.as_str()) {
                return Err(ModelError::Invalid(format!(
                    "batch name {} is used more than once",
                    batch.name
                )));
            }
        }
        Ok(())
    }
}

fn apply_batch_config(doc: &mut YamlValue) -> Result<(), ModelError> {
    let Some(ensemble) = doc.get_mut("ensemble").and_then(YamlValue::as_mapping_mut) else {
        return Ok(());
    };
    let Some(defaults) = ensemble.remove("batch_config") else {
        return Ok(());
    };
    let defaults: Mapping = match defaults {
        YamlValue::Mapping(m) => m,
        YamlValue::Null => return Ok(()),
        _ => return Err(ModelError::Invalid("batch_config must be a mapping".into())),
    };

    for key in BATCH_ONLY_KEYS {
        if defaults.contains_key(key) {
            return Err(ModelError::Invalid(format!(
                "'{key}' cannot be set in batch_config"
            )));
        }
    }

    if let Some(batches) = ensemble
        .get_mut("batches")
        .and_then(YamlValue::as_sequence_mut)
    {
        for batch in batches.iter_mut().filter_map(YamlValue::as_mapping_mut) {
            for (k, v) in &defaults {
                if !batch.contains_key(k) {
                    batch.insert(k.clone(), v.clone());
                }
            }
        }
    }
    Ok(())
}
