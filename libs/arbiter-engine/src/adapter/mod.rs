/// Language Adapters - One Contract, Many Runtimes
///
/// **Core Responsibility:**
/// Describe how to start a fresh execution unit for a language and what to
/// send it. Running, timing and killing the unit is the monitor's job.
///
/// **Contract:**
/// - `compile(code, limits)` runs once per judge call, outside any test's time
///   limit; languages without a build step hand the source back unchanged
/// - `execute(code, function_name, args, limits) -> ExecutionResult` never
///   fails; every problem is folded into `error_message` / `timed_out`
/// - `run_script(code, limits)` runs free-form code with no entry function
///
/// **Adapter-local policy:**
/// - Function name candidates (verbatim, then snake_case → camelCase)
/// - Runtime command line and environment
/// - Whether the source needs transpiling

mod javascript;
mod python;
mod typescript;

pub use javascript::JavaScriptAdapter;
pub use python::PythonAdapter;
pub use typescript::TypeScriptAdapter;

use crate::monitor::{ResourceMonitor, UnitRun};
use crate::normalizer::{self, Value};
use crate::protocol::{UnitFrame, UnitRequest, UnitTask};
use anyhow::{Context, Result};
use arbiter_common::config::{EngineConfig, RuntimeConfig};
use arbiter_common::types::{ErrorPhase, ExecutionLimits, ExecutionResult, Language};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Process launch description for one execution unit
#[derive(Debug, Clone)]
pub struct UnitCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Written to the unit's stdin, then stdin is closed
    pub stdin: Vec<u8>,
}

impl UnitCommand {
    /// Build the command line `<command> <args..> <harness>` with the request on stdin
    pub fn from_runtime(runtime: &RuntimeConfig, harness: &str, request: &UnitRequest) -> Result<Self> {
        let mut args = runtime.args.clone();
        args.push(harness.to_string());

        let stdin = serde_json::to_vec(request).context("Failed to encode unit request")?;

        Ok(Self {
            program: runtime.command.clone(),
            args,
            env: runtime
                .env
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            stdin,
        })
    }
}

#[async_trait]
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Describe the unit that will run `function_name(args...)`
    fn prepare(&self, code: &str, function_name: &str, args: &[Value]) -> Result<UnitCommand>;

    /// Describe the unit that runs `code` top to bottom
    fn prepare_script(&self, code: &str) -> Result<UnitCommand>;

    /// Describe the unit that turns source into runnable code, if one is needed
    fn prepare_compile(&self, _code: &str) -> Result<Option<UnitCommand>> {
        Ok(None)
    }

    /// Produce the code every test of one judge call will load
    ///
    /// The `Err` result is already shaped like a test outcome and carries no
    /// runtime or memory of its own.
    async fn compile(
        &self,
        monitor: &ResourceMonitor,
        code: &str,
        limits: &ExecutionLimits,
    ) -> Result<String, ExecutionResult> {
        let unit = match self.prepare_compile(code) {
            Ok(Some(unit)) => unit,
            Ok(None) => return Ok(code.to_string()),
            Err(e) => {
                return Err(ExecutionResult::failure(
                    ErrorPhase::Runtime,
                    format!("Failed to prepare {} compilation: {:#}", self.language(), e),
                ))
            }
        };

        let failure = match monitor.run_unit(unit, limits).await {
            UnitRun::Frame {
                frame: UnitFrame::Transpiled { code },
                ..
            } => return Ok(code),
            UnitRun::Frame { frame, wall_ms } => ResourceMonitor::result_from_frame(frame, wall_ms),
            UnitRun::Failed(result) if result.timed_out => ExecutionResult::failure(
                ErrorPhase::Compile,
                format!(
                    "Compilation did not finish within {} ms",
                    limits.time_limit_ms
                ),
            ),
            UnitRun::Failed(result) => result,
        };

        Err(ExecutionResult {
            runtime_ms: 0.0,
            memory_kb: 0.0,
            ..failure
        })
    }

    /// Run one invocation inside a fresh unit under the monitor
    async fn execute(
        &self,
        monitor: &ResourceMonitor,
        code: &str,
        function_name: &str,
        args: &[Value],
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        match self.prepare(code, function_name, args) {
            Ok(unit) => monitor.run(unit, limits).await,
            Err(e) => ExecutionResult::failure(
                ErrorPhase::Runtime,
                format!("Failed to prepare {} execution: {:#}", self.language(), e),
            ),
        }
    }

    /// Run free-form code inside a fresh unit under the monitor
    async fn run_script(
        &self,
        monitor: &ResourceMonitor,
        code: &str,
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        match self.prepare_script(code) {
            Ok(unit) => monitor.run(unit, limits).await,
            Err(e) => ExecutionResult::failure(
                ErrorPhase::Runtime,
                format!("Failed to prepare {} script: {:#}", self.language(), e),
            ),
        }
    }
}

/// Build the invocation request shared by every harness
pub(crate) fn unit_request(code: &str, function_name: &str, args: &[Value]) -> UnitRequest {
    UnitRequest {
        code: code.to_string(),
        task: UnitTask::Invoke,
        candidates: function_candidates(function_name),
        args: normalizer::to_json_args(args),
        typescript_module: None,
    }
}

pub(crate) fn task_request(code: &str, task: UnitTask) -> UnitRequest {
    UnitRequest {
        code: code.to_string(),
        task,
        candidates: Vec::new(),
        args: Vec::new(),
        typescript_module: None,
    }
}

/// Lookup order for a stored function name: verbatim first, then camelCase
pub fn function_candidates(function_name: &str) -> Vec<String> {
    let mut candidates = vec![function_name.to_string()];
    let camel = snake_to_camel(function_name);
    if camel != function_name {
        candidates.push(camel);
    }
    candidates
}

/// `two_sum` → `twoSum`; an underscore is dropped only when a lowercase letter follows
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '_' {
            if let Some(next) = chars.peek().copied() {
                if next.is_ascii_lowercase() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Adapters for every configured language
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Language, Arc<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::default();
        for language in config.enabled_languages() {
            let Some(runtime) = config.runtime(language).cloned() else {
                continue;
            };
            let adapter: Arc<dyn LanguageAdapter> = match language {
                Language::JavaScript => Arc::new(JavaScriptAdapter::new(runtime)),
                Language::TypeScript => Arc::new(TypeScriptAdapter::new(runtime)),
                Language::Python => Arc::new(PythonAdapter::new(runtime)),
            };
            registry.register(adapter);
        }
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn LanguageAdapter>) {
        self.adapters.insert(adapter.language(), adapter);
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn LanguageAdapter>> {
        self.adapters.get(&language).cloned()
    }

    pub fn languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.adapters.contains_key(language))
            .collect()
    }
}
