use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Variable value as it appears in configuration and templates.
pub type Value = serde_json::Value;

/// Prefix marking a task argument as a reference into the active scope.
const BACK_REFERENCE_PREFIX: &str = "run.";

/// Flat variable namespace shared by templates and tasks.
///
/// Ensemble, batch and run level variables are layered into one `Vars`; later layers override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars(BTreeMap<String, Value>);

impl Vars {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string variable, `None` if missing or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Look up a field by name.
    ///
    /// Unlike [`Vars::get`], a missing field is an error; this is the accessor used to resolve back-references.
    pub fn field(&self, name: &str) -> Result<&Value, ModelError> {
        self.0
            .get(name)
            .ok_or_else(|| ModelError::UnknownField(name.to_string()))
    }

    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<Value>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.0.insert(key.into(), value.into())
    }

    /// Overlay `other` on top of `self`; keys from `other` win.
    pub fn extend(&mut self, other: &Vars) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Return a new namespace with `other` layered on top.
    pub fn merged(&self, other: &Vars) -> Vars {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Build a namespace from a serializable object.
    ///
    /// Anything that does not serialize to a JSON object yields an error.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Vars, ModelError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Vars(map.into_iter().collect())),
            other => Err(ModelError::Invalid(format!(
                "expected a mapping of variables, got {other}"
            ))),
        }
    }
}

impl FromIterator<(String, Value)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Returns the referenced field name when `value` is a `"run.<field>"` back-reference.
pub fn back_reference(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix(BACK_REFERENCE_PREFIX))
        .filter(|field| !field.is_empty())
}
