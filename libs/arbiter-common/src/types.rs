use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Default per-test time limit when a request omits one
pub const DEFAULT_TIME_LIMIT_MS: u64 = 5000;

/// Default memory limit when a request omits one (256 MiB)
pub const DEFAULT_MEMORY_LIMIT_KB: u64 = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "js")]
    JavaScript,
    #[serde(alias = "ts")]
    TypeScript,
    #[serde(alias = "py")]
    Python,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::TypeScript, Language::Python];
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::TypeScript => write!(f, "typescript"),
            Language::Python => write!(f, "python"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "python" | "py" => Ok(Language::Python),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

/// Visibility class of a test case
///
/// `Run` cases are the visible samples, `Submit` cases are hidden grading cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCaseKind {
    #[default]
    #[serde(alias = "RUN", alias = "Run")]
    Run,
    #[serde(alias = "SUBMIT", alias = "Submit")]
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(rename = "output", alias = "expectedOutput")]
    pub expected_output: String,
    #[serde(default)]
    pub kind: TestCaseKind,
}

/// Iteration policy of a judge call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeMode {
    /// Execute every test case
    #[default]
    #[serde(alias = "RUN")]
    Run,
    /// Stop at the first test case that does not pass
    #[serde(alias = "SUBMIT")]
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLimits {
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            memory_limit_kb: DEFAULT_MEMORY_LIMIT_KB,
        }
    }
}

/// A complete judge call as received from a collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRequest {
    pub code: String,
    pub language: Language,
    pub function_name: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub mode: JudgeMode,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(default = "default_memory_limit_kb")]
    pub memory_limit_kb: u64,
}

fn default_time_limit_ms() -> u64 {
    DEFAULT_TIME_LIMIT_MS
}

fn default_memory_limit_kb() -> u64 {
    DEFAULT_MEMORY_LIMIT_KB
}

impl JudgeRequest {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.time_limit_ms,
            memory_limit_kb: self.memory_limit_kb,
        }
    }
}

/// Stage at which an execution unit reported an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPhase {
    /// Syntax or transpilation failure before the function was invoked
    Compile,
    /// Anything raised while loading or invoking the solution
    Runtime,
}

/// Raw result of one execution unit for one test case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub return_value: Option<String>,
    pub stdout: Vec<String>,
    pub error_message: Option<String>,
    pub error_phase: Option<ErrorPhase>,
    pub error_detail: Option<String>,
    pub runtime_ms: f64,
    pub memory_kb: f64,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn failure(phase: ErrorPhase, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            error_phase: Some(phase),
            ..Default::default()
        }
    }

    /// Result of a unit killed at the time limit; the runtime is pinned to the limit
    pub fn time_limit_exceeded(time_limit_ms: u64) -> Self {
        Self {
            error_message: Some("Time Limit Exceeded".to_string()),
            error_phase: Some(ErrorPhase::Runtime),
            error_detail: Some(format!(
                "Your code exceeded the time limit of {} seconds",
                time_limit_ms as f64 / 1000.0
            )),
            runtime_ms: time_limit_ms as f64,
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.is_empty() {
            self.error_detail = Some(detail);
        }
        self
    }
}

/// Aggregate classification of a submission
///
/// Ordered by severity: Accepted < WrongAnswer < every fatal kind.
/// The fatal kinds share one severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
}

impl Verdict {
    pub fn severity(&self) -> u8 {
        match self {
            Verdict::Accepted => 0,
            Verdict::WrongAnswer => 1,
            Verdict::RuntimeError
            | Verdict::CompilationError
            | Verdict::TimeLimitExceeded
            | Verdict::MemoryLimitExceeded => 2,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == 2
    }

    pub fn outranks(&self, other: Verdict) -> bool {
        self.severity() > other.severity()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompilationError => "Compilation Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseOutcome {
    pub test_case: TestCase,
    pub execution: ExecutionResult,
    pub passed: bool,
    pub verdict: Verdict,
}

/// Flattened wire view of one outcome
impl Serialize for TestCaseOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TestCaseOutcome", 12)?;
        state.serialize_field("input", &self.test_case.input)?;
        state.serialize_field("expectedOutput", &self.test_case.expected_output)?;
        state.serialize_field("kind", &self.test_case.kind)?;
        state.serialize_field(
            "producedOutput",
            self.execution.return_value.as_deref().unwrap_or(""),
        )?;
        state.serialize_field("stdout", &self.execution.stdout)?;
        state.serialize_field("error", &self.execution.error_message)?;
        state.serialize_field(
            "stderr",
            self.execution.error_detail.as_deref().unwrap_or(""),
        )?;
        state.serialize_field("passed", &self.passed)?;
        state.serialize_field("verdict", &self.verdict)?;
        state.serialize_field("timedOut", &self.execution.timed_out)?;
        state.serialize_field("runtimeMs", &round_ms(self.execution.runtime_ms))?;
        state.serialize_field("memoryKb", &self.execution.memory_kb.round())?;
        state.end()
    }
}

/// Final result of one judge call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub outcomes: Vec<TestCaseOutcome>,
    pub passed_count: usize,
    pub total_count: usize,
    #[serde(serialize_with = "serialize_ms")]
    pub aggregate_runtime_ms: f64,
    #[serde(serialize_with = "serialize_kb")]
    pub peak_memory_kb: f64,
    pub verdict: Verdict,
}

/// Round to two decimals, matching what clients display
pub fn round_ms(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Free-form run of a snippet with no entry function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub code: String,
    pub language: Language,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
}

impl ExecuteRequest {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.time_limit_ms,
            memory_limit_kb: DEFAULT_MEMORY_LIMIT_KB,
        }
    }
}

pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully, but returned no output.";

/// What a free-form run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteReport {
    /// Printed text, else the completion value, else [`NO_OUTPUT_MESSAGE`]; absent on error
    pub result: Option<String>,
    pub stdout: Vec<String>,
    pub error: Option<String>,
    pub stderr: String,
    #[serde(serialize_with = "serialize_ms")]
    pub runtime_ms: f64,
    pub timed_out: bool,
}

impl ExecuteReport {
    pub fn from_execution(execution: ExecutionResult) -> Self {
        let result = if execution.error_message.is_some() {
            None
        } else {
            let printed = execution.stdout.join("\n").trim().to_string();
            let completion = execution.return_value.as_deref().unwrap_or("");
            Some(if !printed.is_empty() {
                printed
            } else if !completion.is_empty() {
                completion.to_string()
            } else {
                NO_OUTPUT_MESSAGE.to_string()
            })
        };

        Self {
            result,
            stdout: execution.stdout,
            error: execution.error_message,
            stderr: execution.error_detail.unwrap_or_default(),
            runtime_ms: execution.runtime_ms,
            timed_out: execution.timed_out,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_ms<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_ms(*value))
}

fn serialize_kb<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.round())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_ordering() {
        assert!(Verdict::WrongAnswer.outranks(Verdict::Accepted));
        assert!(Verdict::TimeLimitExceeded.outranks(Verdict::WrongAnswer));
        assert!(!Verdict::RuntimeError.outranks(Verdict::CompilationError));
        assert!(!Verdict::Accepted.outranks(Verdict::MemoryLimitExceeded));
        assert!(Verdict::MemoryLimitExceeded.is_fatal());
        assert!(!Verdict::WrongAnswer.is_fatal());
    }

    #[test]
    fn test_request_defaults_and_aliases() {
        let request: JudgeRequest = serde_json::from_str(
            r#"{
                "code": "function f() {}",
                "language": "js",
                "functionName": "f",
                "testCases": [
                    {"input": "1", "output": "1"},
                    {"input": "2", "expectedOutput": "2", "kind": "SUBMIT"}
                ],
                "mode": "submit"
            }"#,
        )
        .unwrap();

        assert_eq!(request.language, Language::JavaScript);
        assert_eq!(request.mode, JudgeMode::Submit);
        assert_eq!(request.time_limit_ms, DEFAULT_TIME_LIMIT_MS);
        assert_eq!(request.memory_limit_kb, DEFAULT_MEMORY_LIMIT_KB);
        assert_eq!(request.test_cases[0].kind, TestCaseKind::Run);
        assert_eq!(request.test_cases[1].kind, TestCaseKind::Submit);
        assert_eq!(request.test_cases[1].expected_output, "2");
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("Python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("ts".parse::<Language>().unwrap(), Language::TypeScript);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_outcome_wire_shape() {
        let outcome = TestCaseOutcome {
            test_case: TestCase {
                input: "[2,7,11,15], 9".to_string(),
                expected_output: "[0,1]".to_string(),
                kind: TestCaseKind::Run,
            },
            execution: ExecutionResult {
                return_value: Some("[0,1]".to_string()),
                stdout: vec!["checking".to_string()],
                runtime_ms: 1.23456,
                memory_kb: 12.6,
                ..Default::default()
            },
            passed: true,
            verdict: Verdict::Accepted,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["producedOutput"], "[0,1]");
        assert_eq!(json["expectedOutput"], "[0,1]");
        assert_eq!(json["stdout"][0], "checking");
        assert_eq!(json["error"], serde_json::Value::Null);
        assert_eq!(json["runtimeMs"], 1.23);
        assert_eq!(json["memoryKb"], 13.0);
        assert_eq!(json["verdict"], "Accepted");
    }

    #[test]
    fn test_timeout_outcome_mentions_limit() {
        let outcome = TestCaseOutcome {
            test_case: TestCase {
                input: String::new(),
                expected_output: "1".to_string(),
                kind: TestCaseKind::Submit,
            },
            execution: ExecutionResult::time_limit_exceeded(2000),
            passed: false,
            verdict: Verdict::TimeLimitExceeded,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"], "Time Limit Exceeded");
        assert_eq!(json["stderr"], "Your code exceeded the time limit of 2 seconds");
        assert_eq!(json["timedOut"], true);
        assert_eq!(json["runtimeMs"], 2000.0);
    }

    #[test]
    fn test_execute_report_prefers_printed_text() {
        let report = ExecuteReport::from_execution(ExecutionResult {
            return_value: Some("3".to_string()),
            stdout: vec!["hello".to_string(), "world  ".to_string()],
            runtime_ms: 0.456,
            ..Default::default()
        });
        assert_eq!(report.result.as_deref(), Some("hello\nworld"));
        assert!(report.succeeded());

        let completion_only = ExecuteReport::from_execution(ExecutionResult {
            return_value: Some("3".to_string()),
            ..Default::default()
        });
        assert_eq!(completion_only.result.as_deref(), Some("3"));

        let silent = ExecuteReport::from_execution(ExecutionResult {
            return_value: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(silent.result.as_deref(), Some(NO_OUTPUT_MESSAGE));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["runtimeMs"], 0.46);
        assert_eq!(json["timedOut"], false);
    }

    #[test]
    fn test_execute_report_carries_error() {
        let report = ExecuteReport::from_execution(
            ExecutionResult::failure(ErrorPhase::Runtime, "ZeroDivisionError: division by zero")
                .with_detail("Traceback (most recent call last):"),
        );
        assert_eq!(report.result, None);
        assert!(!report.succeeded());
        assert_eq!(report.error.as_deref(), Some("ZeroDivisionError: division by zero"));
        assert_eq!(report.stderr, "Traceback (most recent call last):");

        let request: ExecuteRequest =
            serde_json::from_str(r#"{"code": "print(1)", "language": "py"}"#).unwrap();
        assert_eq!(request.language, Language::Python);
        assert_eq!(request.limits().time_limit_ms, DEFAULT_TIME_LIMIT_MS);
    }
}
