/// Judge Orchestrator - High-Level Coordination
///
/// **Responsibility:**
/// Drive one judge call from request to [`SubmissionReport`], and one
/// free-form run from request to [`ExecuteReport`].
///
/// **Architecture:**
/// 1. Validate the request (the only way a call can fail)
/// 2. Compile once through the backend, outside every test's time limit
/// 3. For each test case, in order: normalize input (normalizer.rs), execute
///    through the backend (adapter + monitor), classify (evaluator.rs)
/// 4. Fold outcomes into the report
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (the backend's job)
/// - How outputs are compared (the evaluator's job)
///
/// **Iteration Policy:**
/// - Run mode executes every test case
/// - Submit mode stops after the first test case that does not pass
/// - Test cases never share an execution unit
/// - A failed compile stands in for every test case that would have run

use crate::adapter::AdapterRegistry;
use crate::error::JudgeError;
use crate::evaluator::{self, Comparator, VerdictAccumulator};
use crate::monitor::ResourceMonitor;
use crate::normalizer::{self, Value};
use arbiter_common::config::EngineConfig;
use arbiter_common::types::{
    ErrorPhase, ExecuteReport, ExecuteRequest, ExecutionLimits, ExecutionResult, JudgeMode,
    JudgeRequest, Language, SubmissionReport, TestCaseOutcome, Verdict,
    DEFAULT_MEMORY_LIMIT_KB,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Runs submissions in isolation
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn supports(&self, language: Language) -> bool;

    fn languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.supports(*language))
            .collect()
    }

    /// Turn source into the code every invocation loads
    ///
    /// `Err` holds the failure to report in place of test results.
    async fn compile(&self, _language: Language, code: &str) -> Result<String, ExecutionResult> {
        Ok(code.to_string())
    }

    async fn execute(
        &self,
        language: Language,
        code: &str,
        function_name: &str,
        args: &[Value],
        limits: &ExecutionLimits,
    ) -> ExecutionResult;

    /// Run already compiled code top to bottom with no entry function
    async fn run_script(
        &self,
        language: Language,
        code: &str,
        limits: &ExecutionLimits,
    ) -> ExecutionResult;
}

/// Production backend: one child process per invocation
pub struct ProcessBackend {
    registry: AdapterRegistry,
    monitor: ResourceMonitor,
    compile_limits: ExecutionLimits,
}

impl ProcessBackend {
    pub fn new(
        registry: AdapterRegistry,
        monitor: ResourceMonitor,
        compile_limits: ExecutionLimits,
    ) -> Self {
        Self {
            registry,
            monitor,
            compile_limits,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            AdapterRegistry::from_config(config),
            ResourceMonitor::new(config.max_output_bytes),
            ExecutionLimits {
                time_limit_ms: config.compile_time_limit_ms,
                memory_limit_kb: DEFAULT_MEMORY_LIMIT_KB,
            },
        )
    }

    fn unconfigured(language: Language) -> ExecutionResult {
        ExecutionResult::failure(
            ErrorPhase::Runtime,
            format!("No runtime configured for {}", language),
        )
    }
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    fn supports(&self, language: Language) -> bool {
        self.registry.get(language).is_some()
    }

    async fn compile(&self, language: Language, code: &str) -> Result<String, ExecutionResult> {
        match self.registry.get(language) {
            Some(adapter) => {
                adapter
                    .compile(&self.monitor, code, &self.compile_limits)
                    .await
            }
            None => Err(Self::unconfigured(language)),
        }
    }

    async fn execute(
        &self,
        language: Language,
        code: &str,
        function_name: &str,
        args: &[Value],
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        match self.registry.get(language) {
            Some(adapter) => {
                adapter
                    .execute(&self.monitor, code, function_name, args, limits)
                    .await
            }
            None => Self::unconfigured(language),
        }
    }

    async fn run_script(
        &self,
        language: Language,
        code: &str,
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        match self.registry.get(language) {
            Some(adapter) => adapter.run_script(&self.monitor, code, limits).await,
            None => Self::unconfigured(language),
        }
    }
}

pub struct Judge {
    backend: Arc<dyn ExecutionBackend>,
    comparator: Comparator,
    max_source_bytes: usize,
    max_time_limit_ms: u64,
}

impl Judge {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        comparator: Comparator,
        max_source_bytes: usize,
        max_time_limit_ms: u64,
    ) -> Self {
        Self {
            backend,
            comparator,
            max_source_bytes,
            max_time_limit_ms,
        }
    }

    /// Judge backed by child processes as described by `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_backend(Arc::new(ProcessBackend::from_config(config)), config)
    }

    /// Judge with configured policy and a caller-supplied backend
    pub fn with_backend(backend: Arc<dyn ExecutionBackend>, config: &EngineConfig) -> Self {
        Self::new(
            backend,
            Comparator::new(config.comparison),
            config.max_source_bytes,
            config.max_time_limit_ms,
        )
    }

    pub fn languages(&self) -> Vec<Language> {
        self.backend.languages()
    }

    /// Judge a submission against its test cases
    ///
    /// ## Arguments
    /// * `request` - Source, language, entry point, test cases, mode and limits
    ///
    /// ## Returns
    /// A complete report, or `InvalidRequest` when the request cannot be judged.
    /// Compile errors, crashes and timeouts of the submission are verdicts, not errors.
    #[instrument(
        skip(self, request),
        fields(
            language = %request.language,
            function = %request.function_name,
            mode = ?request.mode,
            test_count = request.test_cases.len()
        )
    )]
    pub async fn judge(&self, request: &JudgeRequest) -> Result<SubmissionReport, JudgeError> {
        self.validate(request)?;

        let limits = request.limits();
        let total = request.test_cases.len();
        let mut acc = VerdictAccumulator::new(total);

        info!(
            time_limit_ms = limits.time_limit_ms,
            memory_limit_kb = limits.memory_limit_kb,
            comparison = ?self.comparator.mode(),
            "Judging submission"
        );

        let compiled = self.backend.compile(request.language, &request.code).await;
        if let Err(failure) = &compiled {
            warn!(
                error = failure.error_message.as_deref().unwrap_or(""),
                "Compilation failed"
            );
        }

        for (index, test_case) in request.test_cases.iter().enumerate() {
            let execution = match &compiled {
                Ok(code) => {
                    let args = normalizer::normalize(&test_case.input);
                    self.backend
                        .execute(
                            request.language,
                            code,
                            &request.function_name,
                            &args,
                            &limits,
                        )
                        .await
                }
                Err(failure) => failure.clone(),
            };

            let verdict = evaluator::classify(
                &execution,
                &test_case.expected_output,
                &limits,
                &self.comparator,
            );
            let passed = verdict == Verdict::Accepted;

            if passed {
                debug!(test = index + 1, runtime_ms = execution.runtime_ms, "Test passed");
            } else if verdict.is_fatal() {
                warn!(
                    test = index + 1,
                    verdict = %verdict,
                    error = execution.error_message.as_deref().unwrap_or(""),
                    runtime_ms = execution.runtime_ms,
                    timed_out = execution.timed_out,
                    "Test failed"
                );
            } else {
                info!(
                    test = index + 1,
                    produced = execution.return_value.as_deref().unwrap_or(""),
                    expected = %test_case.expected_output,
                    "Wrong answer"
                );
            }

            acc.record(TestCaseOutcome {
                test_case: test_case.clone(),
                execution,
                passed,
                verdict,
            });

            if !passed && request.mode == JudgeMode::Submit {
                debug!(
                    executed = index + 1,
                    total, "Stopping at first failure in submit mode"
                );
                break;
            }
        }

        let report = acc.finish();
        info!(
            verdict = %report.verdict,
            passed = report.passed_count,
            total = report.total_count,
            runtime_ms = report.aggregate_runtime_ms,
            peak_memory_kb = report.peak_memory_kb,
            "Judging complete"
        );
        Ok(report)
    }

    /// Run a snippet with no entry function and report what it printed
    ///
    /// Errors raised by the snippet land in the report; only an unusable
    /// request is an `Err`.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteReport, JudgeError> {
        self.validate_source(&request.code, request.language, request.time_limit_ms)?;

        let limits = request.limits();
        let execution = match self.backend.compile(request.language, &request.code).await {
            Ok(code) => {
                self.backend
                    .run_script(request.language, &code, &limits)
                    .await
            }
            Err(failure) => failure,
        };

        let report = ExecuteReport::from_execution(execution);
        info!(
            succeeded = report.succeeded(),
            timed_out = report.timed_out,
            runtime_ms = report.runtime_ms,
            "Execution complete"
        );
        Ok(report)
    }

    fn validate(&self, request: &JudgeRequest) -> Result<(), JudgeError> {
        if request.test_cases.is_empty() {
            return Err(JudgeError::invalid("at least one test case is required"));
        }
        if !is_identifier(&request.function_name) {
            return Err(JudgeError::invalid(format!(
                "function name {:?} is not a valid identifier",
                request.function_name
            )));
        }
        if request.memory_limit_kb == 0 {
            return Err(JudgeError::invalid("memoryLimitKb must be positive"));
        }
        self.validate_source(&request.code, request.language, request.time_limit_ms)
    }

    fn validate_source(
        &self,
        code: &str,
        language: Language,
        time_limit_ms: u64,
    ) -> Result<(), JudgeError> {
        if code.trim().is_empty() {
            return Err(JudgeError::invalid("code is empty"));
        }
        if code.len() > self.max_source_bytes {
            return Err(JudgeError::invalid(format!(
                "code is {} bytes, the limit is {}",
                code.len(),
                self.max_source_bytes
            )));
        }
        if time_limit_ms == 0 || time_limit_ms > self.max_time_limit_ms {
            return Err(JudgeError::invalid(format!(
                "timeLimitMs must be between 1 and {}",
                self.max_time_limit_ms
            )));
        }
        if !self.backend.supports(language) {
            return Err(JudgeError::invalid(format!(
                "language {} is not configured",
                language
            )));
        }
        Ok(())
    }
}

/// `[A-Za-z_$][A-Za-z0-9_$]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}
