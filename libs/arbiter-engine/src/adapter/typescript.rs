use super::javascript::NODE_HARNESS;
use super::{task_request, unit_request, LanguageAdapter, UnitCommand};
use crate::normalizer::Value;
use crate::protocol::UnitTask;
use anyhow::Result;
use arbiter_common::config::RuntimeConfig;
use arbiter_common::types::Language;
use async_trait::async_trait;

/// Transpiles once with the `typescript` module, then runs the output like JavaScript
///
/// Only syntactic diagnostics are reported; type errors do not fail a submission.
/// `prepare` and `prepare_script` expect code that has already been through
/// [`LanguageAdapter::compile`].
pub struct TypeScriptAdapter {
    runtime: RuntimeConfig,
}

impl TypeScriptAdapter {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl LanguageAdapter for TypeScriptAdapter {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn prepare(&self, code: &str, function_name: &str, args: &[Value]) -> Result<UnitCommand> {
        let request = unit_request(code, function_name, args);
        UnitCommand::from_runtime(&self.runtime, NODE_HARNESS, &request)
    }

    fn prepare_script(&self, code: &str) -> Result<UnitCommand> {
        let request = task_request(code, UnitTask::Script);
        UnitCommand::from_runtime(&self.runtime, NODE_HARNESS, &request)
    }

    fn prepare_compile(&self, code: &str) -> Result<Option<UnitCommand>> {
        let mut request = task_request(code, UnitTask::Transpile);
        request.typescript_module = self.runtime.typescript_module.clone();
        UnitCommand::from_runtime(&self.runtime, NODE_HARNESS, &request).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UnitRequest;
    use std::collections::BTreeMap;

    fn adapter() -> TypeScriptAdapter {
        TypeScriptAdapter::new(RuntimeConfig {
            command: "node".to_string(),
            args: vec!["-e".to_string()],
            env: BTreeMap::from([("NODE_PATH".to_string(), "/opt/ts/node_modules".to_string())]),
            typescript_module: Some("/opt/ts/node_modules/typescript".to_string()),
        })
    }

    #[test]
    fn test_compile_unit_asks_for_transpilation() {
        let unit = adapter()
            .prepare_compile("export function add(a: number, b: number) { return a + b; }")
            .unwrap()
            .unwrap();
        let request: UnitRequest = serde_json::from_slice(&unit.stdin).unwrap();

        assert_eq!(request.task, UnitTask::Transpile);
        assert_eq!(
            request.typescript_module.as_deref(),
            Some("/opt/ts/node_modules/typescript")
        );
        assert_eq!(unit.env, vec![("NODE_PATH".to_string(), "/opt/ts/node_modules".to_string())]);
        assert_eq!(unit.args.last().map(String::as_str), Some(NODE_HARNESS));
    }

    #[test]
    fn test_invocation_runs_already_compiled_code() {
        let unit = adapter()
            .prepare("exports.add = function (a, b) { return a + b; };", "add", &[])
            .unwrap();
        let request: UnitRequest = serde_json::from_slice(&unit.stdin).unwrap();

        assert_eq!(request.task, UnitTask::Invoke);
        assert_eq!(request.typescript_module, None);
        assert_eq!(request.candidates, vec!["add"]);
    }
}
