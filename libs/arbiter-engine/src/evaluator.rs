/// Verdict Evaluator - Language-Agnostic Classification
///
/// **Core Responsibility:**
/// Turn one raw [`ExecutionResult`] into a [`Verdict`], and fold a sequence of
/// per-test outcomes into the aggregate report.
///
/// **Critical Properties:**
/// - Knows nothing about processes or language runtimes
/// - Pure: (execution result, expected output, limits) → verdict
///
/// **Classification Order (first match wins):**
/// 1. Timed out → TimeLimitExceeded
/// 2. `memory_kb` above the limit → MemoryLimitExceeded
/// 3. Compile-phase error → CompilationError
/// 4. Any other error → RuntimeError
/// 5. Output comparison → Accepted or WrongAnswer
///
/// **Aggregation Rules:**
/// - Running verdict starts at Accepted
/// - Replaced only by a candidate of strictly higher severity, so the first
///   fatal verdict sticks
/// - Runtime is summed, memory is the peak
///
/// **Comparison Modes:**
/// - Textual (default): trim both sides, then exact, case-sensitive match
/// - Exact: byte-for-byte
/// - Structural: JSON value equality with numeric comparison, textual fallback

use arbiter_common::config::ComparisonMode;
use arbiter_common::types::{
    ErrorPhase, ExecutionLimits, ExecutionResult, SubmissionReport, TestCaseOutcome, Verdict,
};
use serde_json::Value as Json;

/// Normalize output string for textual comparison
///
/// **Normalization Rules:**
/// - Trim leading and trailing whitespace (covers `\r\n` vs `\n` at the edges)
///
/// **Preserves:**
/// - Internal whitespace
/// - Case sensitivity
fn normalize_output(output: &str) -> &str {
    output.trim()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparator {
    mode: ComparisonMode,
}

impl Comparator {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// Compare a produced output with the expected output
    pub fn compare(&self, produced: &str, expected: &str) -> bool {
        match self.mode {
            ComparisonMode::Exact => produced == expected,
            ComparisonMode::Textual => normalize_output(produced) == normalize_output(expected),
            ComparisonMode::Structural => {
                let parsed = (
                    serde_json::from_str::<Json>(produced.trim()),
                    serde_json::from_str::<Json>(expected.trim()),
                );
                match parsed {
                    (Ok(produced), Ok(expected)) => json_equal(&produced, &expected),
                    _ => normalize_output(produced) == normalize_output(expected),
                }
            }
        }
    }
}

fn json_equal(left: &Json, right: &Json) -> bool {
    match (left, right) {
        (Json::Number(a), Json::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (Json::Object(a), Json::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| json_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Classify a single execution against its expected output
///
/// ## Arguments
/// * `execution` - Raw result from the execution unit
/// * `expected` - Expected output of the test case
/// * `limits` - Limits the unit ran under
/// * `comparator` - Output comparison policy
///
/// ## Returns
/// The per-test verdict; `Accepted` means the test passed
pub fn classify(
    execution: &ExecutionResult,
    expected: &str,
    limits: &ExecutionLimits,
    comparator: &Comparator,
) -> Verdict {
    if execution.timed_out {
        return Verdict::TimeLimitExceeded;
    }
    if execution.memory_kb > limits.memory_limit_kb as f64 {
        return Verdict::MemoryLimitExceeded;
    }
    if execution.error_message.is_some() {
        return match execution.error_phase {
            Some(ErrorPhase::Compile) => Verdict::CompilationError,
            _ => Verdict::RuntimeError,
        };
    }

    let produced = execution.return_value.as_deref().unwrap_or("");
    if comparator.compare(produced, expected) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

/// Running aggregate over the outcomes of one judge call
#[derive(Debug)]
pub struct VerdictAccumulator {
    outcomes: Vec<TestCaseOutcome>,
    total_count: usize,
    passed_count: usize,
    aggregate_runtime_ms: f64,
    peak_memory_kb: f64,
    verdict: Verdict,
}

impl VerdictAccumulator {
    /// `total_count` is the number of test cases supplied, not the number executed
    pub fn new(total_count: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(total_count),
            total_count,
            passed_count: 0,
            aggregate_runtime_ms: 0.0,
            peak_memory_kb: 0.0,
            verdict: Verdict::Accepted,
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn record(&mut self, outcome: TestCaseOutcome) {
        if outcome.passed {
            self.passed_count += 1;
        }
        if outcome.verdict.outranks(self.verdict) {
            self.verdict = outcome.verdict;
        }
        self.aggregate_runtime_ms += outcome.execution.runtime_ms;
        self.peak_memory_kb = self.peak_memory_kb.max(outcome.execution.memory_kb);
        self.outcomes.push(outcome);
    }

    pub fn finish(self) -> SubmissionReport {
        SubmissionReport {
            outcomes: self.outcomes,
            passed_count: self.passed_count,
            total_count: self.total_count,
            aggregate_runtime_ms: self.aggregate_runtime_ms,
            peak_memory_kb: self.peak_memory_kb,
            verdict: self.verdict,
        }
    }
}
