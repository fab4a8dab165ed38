//! Operator modules and the factory that builds them from stage
//! definitions.

pub mod regex;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipeError, Result};
use crate::pipe::{Operator, PipeRegistry};

pub use self::regex::{RegexModule, RegexOptions, pipe_regex, pipe_regex_async};

/// One stage of a JSON pipeline definition.
///
/// ```text
/// {"module": "regex", "conf": {"RULE": [..]}, "pass_if": "frozen", "on_error": "skip"}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StageDef {
    pub module: String,
    #[serde(default)]
    pub conf: Value,
    /// Item path; items where it is truthy bypass the stage.
    #[serde(default)]
    pub pass_if: Option<String>,
    /// `abort` (default) or `skip`.
    #[serde(default)]
    pub on_error: Option<String>,
}

/// Build the operator a stage definition names.
pub fn build(def: &StageDef, registry: &PipeRegistry) -> Result<Arc<dyn Operator>> {
    match def.module.as_str() {
        self::regex::NAME => Ok(Arc::new(RegexModule::from_def(def, registry)?)),
        other => Err(PipeError::UnknownModule {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_regex() {
        let def: StageDef =
            serde_json::from_value(json!({"module": "regex", "conf": {"RULE": []}})).unwrap();
        let op = build(&def, &PipeRegistry::new()).unwrap();
        assert_eq!(op.info().name, "regex");
        assert!(op.info().listize);
    }

    #[test]
    fn test_build_unknown_module() {
        let def: StageDef = serde_json::from_value(json!({"module": "fetchdata"})).unwrap();
        let err = build(&def, &PipeRegistry::new()).err().unwrap();
        assert!(matches!(err, PipeError::UnknownModule { .. }));
    }

    #[test]
    fn test_bad_error_policy() {
        let def: StageDef =
            serde_json::from_value(json!({"module": "regex", "on_error": "retry"})).unwrap();
        let err = build(&def, &PipeRegistry::new()).err().unwrap();
        assert!(matches!(err, PipeError::InvalidConf { .. }));
    }
}
