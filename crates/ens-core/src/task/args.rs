use std::path::PathBuf;

use ens_model::{Value, Vars};

use crate::OperationError;

/// Task arguments after back-reference resolution, with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct TaskArgs(Vars);

impl TaskArgs {
    pub fn new(vars: Vars) -> Self {
        Self(vars)
    }

    pub fn vars(&self) -> &Vars {
        &self.0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.present(key).is_some()
    }

    fn present(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, OperationError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(invalid(key, format!("expected a string, got {other}"))),
        }
    }

    pub fn req_str(&self, key: &str) -> Result<&str, OperationError> {
        self.opt_str(key)?
            .ok_or_else(|| invalid(key, "argument is required"))
    }

    pub fn opt_path(&self, key: &str) -> Result<Option<PathBuf>, OperationError> {
        Ok(self.opt_str(key)?.map(PathBuf::from))
    }

    /// Boolean flag; accepts `true`/`false` strings, missing means false.
    pub fn flag(&self, key: &str) -> Result<bool, OperationError> {
        match self.present(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => s
                .trim()
                .parse::<bool>()
                .map_err(|_| invalid(key, format!("expected a boolean, got '{s}'"))),
            Some(other) => Err(invalid(key, format!("expected a boolean, got {other}"))),
        }
    }

    /// Unsigned integer; accepts numeric strings.
    pub fn req_u64(&self, key: &str) -> Result<u64, OperationError> {
        match self.present(key) {
            None => Err(invalid(key, "argument is required")),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| invalid(key, format!("expected an unsigned integer, got {n}"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(key, format!("expected an unsigned integer, got '{s}'"))),
            Some(other) => Err(invalid(
                key,
                format!("expected an unsigned integer, got {other}"),
            )),
        }
    }

    /// List of strings; a single string counts as a one element list.
    pub fn str_list(&self, key: &str) -> Result<Vec<String>, OperationError> {
        match self.present(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid(key, format!("expected strings, got {item}")))
                })
                .collect(),
            Some(other) => Err(invalid(key, format!("expected a list, got {other}"))),
        }
    }
}

fn invalid(arg: &str, reason: impl Into<String>) -> OperationError {
    OperationError::InvalidArgument {
        arg: arg.to_string(),
        reason: reason.into(),
    }
}
