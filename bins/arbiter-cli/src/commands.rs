// CLI commands for running the Arbiter engine locally
use anyhow::{bail, Context, Result};
use arbiter_common::config::EngineConfig;
use arbiter_common::types::{
    ExecuteReport, ExecuteRequest, JudgeMode, JudgeRequest, Language, SubmissionReport,
    TestCase, TestCaseKind, Verdict, round_ms,
};
use arbiter_engine::normalizer;
use arbiter_engine::Judge;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JudgeArgs {
    pub language: Language,
    pub code: PathBuf,
    pub function: String,
    pub tests: PathBuf,
    pub mode: JudgeMode,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
    pub json: bool,
}

/// Load the engine configuration, preferring an explicit path
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    }
}

/// Load a JSON array of test cases
fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test file {}", path.display()))?;
    let test_cases: Vec<TestCase> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test file {}", path.display()))?;
    if test_cases.is_empty() {
        bail!("Test file {} contains no test cases", path.display());
    }
    Ok(test_cases)
}

/// Judge a solution file; returns whether it was accepted
pub async fn judge(config: &EngineConfig, args: JudgeArgs) -> Result<bool> {
    let code = fs::read_to_string(&args.code)
        .with_context(|| format!("Failed to read solution {}", args.code.display()))?;
    let test_cases = load_test_cases(&args.tests)?;

    let request = JudgeRequest {
        code,
        language: args.language,
        function_name: args.function,
        test_cases,
        mode: args.mode,
        time_limit_ms: args.time_limit_ms,
        memory_limit_kb: args.memory_limit_kb,
    };

    let report = Judge::from_config(config)
        .judge(&request)
        .await
        .context("Judge rejected the request")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_report(&report);
    }

    Ok(report.verdict == Verdict::Accepted)
}

fn print_report(report: &SubmissionReport) {
    println!(
        "{:<6} {:<24} {:<12} {:<12} {:<10} {:<10}",
        "Test", "Verdict", "Expected", "Produced", "Time (ms)", "Mem (KB)"
    );
    println!("{}", "─".repeat(80));

    for (index, outcome) in report.outcomes.iter().enumerate() {
        let mark = if outcome.passed { "✓" } else { "✗" };
        println!(
            "{:<6} {:<24} {:<12} {:<12} {:<10.2} {:<10.0}",
            index + 1,
            format!("{} {}", mark, outcome.verdict),
            truncate(&outcome.test_case.expected_output, 12),
            truncate(outcome.execution.return_value.as_deref().unwrap_or(""), 12),
            round_ms(outcome.execution.runtime_ms),
            outcome.execution.memory_kb.round(),
        );
        for line in &outcome.execution.stdout {
            println!("       │ {}", line);
        }
        if let Some(error) = &outcome.execution.error_message {
            println!("       ! {}", error);
        }
    }

    println!();
    let icon = if report.verdict == Verdict::Accepted { "✅" } else { "❌" };
    println!(
        "{} {} ({}/{} passed, {:.2} ms total, {:.0} KB peak)",
        icon,
        report.verdict,
        report.passed_count,
        report.total_count,
        round_ms(report.aggregate_runtime_ms),
        report.peak_memory_kb.round(),
    );
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Run a source file with no entry function; returns whether it finished cleanly
pub async fn run(
    config: &EngineConfig,
    language: Language,
    code: &Path,
    time_limit_ms: u64,
    json: bool,
) -> Result<bool> {
    let source = fs::read_to_string(code)
        .with_context(|| format!("Failed to read source {}", code.display()))?;

    let request = ExecuteRequest {
        code: source,
        language,
        time_limit_ms,
    };
    let report = Judge::from_config(config)
        .execute(&request)
        .await
        .context("Engine rejected the request")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_execution(&report);
    }

    Ok(report.succeeded())
}

fn print_execution(report: &ExecuteReport) {
    match (&report.result, &report.error) {
        (Some(result), _) => println!("{}", result),
        (None, Some(error)) => {
            for line in &report.stdout {
                println!("{}", line);
            }
            eprintln!("! {}", error);
            if !report.stderr.is_empty() {
                eprintln!("{}", report.stderr);
            }
        }
        (None, None) => {}
    }
    eprintln!("({:.2} ms)", round_ms(report.runtime_ms));
}

/// Print the normalized arguments of a raw input as JSON
pub fn normalize(input: &str) -> Result<()> {
    let args = normalizer::to_json_args(&normalizer::normalize(input));
    println!(
        "{}",
        serde_json::to_string(&args).context("Failed to serialize arguments")?
    );
    Ok(())
}

/// Trivial solution and entry point per language
fn probe_solution(language: Language) -> (&'static str, &'static str) {
    match language {
        Language::JavaScript => ("function ping(n) { return n + 1; }", "ping"),
        Language::TypeScript => ("function ping(n: number): number { return n + 1; }", "ping"),
        Language::Python => ("def ping(n):\n    return n + 1\n", "ping"),
    }
}

/// Judge a trivial solution in every configured language; returns whether all passed
pub async fn doctor(config: &EngineConfig) -> Result<bool> {
    let judge = Judge::from_config(config);
    let languages = config.enabled_languages();
    if languages.is_empty() {
        println!("No languages configured.");
        return Ok(false);
    }

    println!("🩺 Probing {} runtime(s)...\n", languages.len());

    let mut healthy = true;
    for language in languages {
        let (code, function_name) = probe_solution(language);
        let request = JudgeRequest {
            code: code.to_string(),
            language,
            function_name: function_name.to_string(),
            test_cases: vec![TestCase {
                input: "41".to_string(),
                expected_output: "42".to_string(),
                kind: TestCaseKind::Run,
            }],
            mode: JudgeMode::Submit,
            time_limit_ms: config.max_time_limit_ms.min(10_000),
            memory_limit_kb: arbiter_common::types::DEFAULT_MEMORY_LIMIT_KB,
        };

        let command = config
            .runtime(language)
            .map(|runtime| runtime.command.clone())
            .unwrap_or_default();

        let report = judge
            .judge(&request)
            .await
            .with_context(|| format!("Probe request for {} was rejected", language))?;

        if report.verdict == Verdict::Accepted {
            let runtime_ms = report
                .outcomes
                .first()
                .map(|outcome| outcome.execution.runtime_ms)
                .unwrap_or(0.0);
            println!(
                "  ✓ {:<12} {:<10} ok ({:.2} ms)",
                language,
                command,
                round_ms(runtime_ms)
            );
        } else {
            healthy = false;
            let reason = report
                .outcomes
                .first()
                .and_then(|outcome| outcome.execution.error_message.clone())
                .unwrap_or_else(|| report.verdict.to_string());
            println!("  ✗ {:<12} {:<10} {}", language, command, reason);
        }
    }

    println!();
    if healthy {
        println!("✅ All runtimes are working");
    } else {
        println!("⚠️  Some runtimes are unavailable; disable them in config/engine.json or install them");
    }

    Ok(healthy)
}

/// Print the configured languages as a table
pub fn list_languages(config: &EngineConfig) {
    let languages = config.enabled_languages();
    if languages.is_empty() {
        println!("No languages configured.");
        return;
    }

    println!("📋 Configured Languages:\n");
    println!("{:<12} {:<10} {:<30}", "Language", "Command", "Arguments");
    println!("{}", "─".repeat(60));

    for language in &languages {
        if let Some(runtime) = config.runtime(*language) {
            println!(
                "{:<12} {:<10} {:<30}",
                language,
                runtime.command,
                runtime.args.join(" ")
            );
        }
    }

    println!("\n✅ Total: {} language(s)", languages.len());
}
