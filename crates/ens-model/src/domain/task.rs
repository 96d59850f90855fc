use serde::{Deserialize, Serialize};

use crate::{Value, Vars, domain::null_as_default};

/// A configured task or check invocation.
///
/// `name` selects a registered operation, `args` are passed to it after back-references
/// (`"run.<field>"`) have been resolved against the active scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vars::new(),
            value: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key, value);
        self
    }
}
