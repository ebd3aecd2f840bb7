use super::{task_request, unit_request, LanguageAdapter, UnitCommand};
use crate::normalizer::Value;
use crate::protocol::UnitTask;
use anyhow::Result;
use arbiter_common::config::RuntimeConfig;
use arbiter_common::types::Language;
use async_trait::async_trait;

const PYTHON_HARNESS: &str = include_str!("../../harness/python_harness.py");

/// Runs solutions with a fresh globals dict inside a `python3` child process
pub struct PythonAdapter {
    runtime: RuntimeConfig,
}

impl PythonAdapter {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn prepare(&self, code: &str, function_name: &str, args: &[Value]) -> Result<UnitCommand> {
        let request = unit_request(code, function_name, args);
        UnitCommand::from_runtime(&self.runtime, PYTHON_HARNESS, &request)
    }
    fn prepare_script(&self, code: &str) -> Result<UnitCommand> {
        let request = task_request(code, UnitTask::Script);
        UnitCommand::from_runtime(&self.runtime, PYTHON_HARNESS, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UnitRequest;

    #[test]
    fn test_script_request_has_no_entry_point() {
        let adapter = PythonAdapter::new(RuntimeConfig {
            command: "python3".to_string(),
            args: vec!["-I".to_string(), "-c".to_string()],
            env: Default::default(),
            typescript_module: None,
        });

        let unit = adapter.prepare_script("print('hi')").unwrap();
        let request: UnitRequest = serde_json::from_slice(&unit.stdin).unwrap();

        assert_eq!(request.task, UnitTask::Script);
        assert_eq!(request.code, "print('hi')");
        assert!(request.candidates.is_empty());
    }
}
