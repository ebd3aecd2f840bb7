use super::{task_request, unit_request, LanguageAdapter, UnitCommand};
use crate::normalizer::Value;
use crate::protocol::UnitTask;
use anyhow::Result;
use arbiter_common::config::RuntimeConfig;
use arbiter_common::types::Language;
use async_trait::async_trait;

/// Harness shared by the JavaScript and TypeScript adapters
pub(crate) const NODE_HARNESS: &str = include_str!("../../harness/node_harness.js");

/// Runs solutions in a fresh `vm` context inside a `node` child process
pub struct JavaScriptAdapter {
    runtime: RuntimeConfig,
}

impl JavaScriptAdapter {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn prepare(&self, code: &str, function_name: &str, args: &[Value]) -> Result<UnitCommand> {
        let request = unit_request(code, function_name, args);
        UnitCommand::from_runtime(&self.runtime, NODE_HARNESS, &request)
    }

    fn prepare_script(&self, code: &str) -> Result<UnitCommand> {
        let request = task_request(code, UnitTask::Script);
        UnitCommand::from_runtime(&self.runtime, NODE_HARNESS, &request)
    }
}
