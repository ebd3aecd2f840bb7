mod commands;

use anyhow::Result;
use arbiter_common::types::{JudgeMode, Language, DEFAULT_MEMORY_LIMIT_KB, DEFAULT_TIME_LIMIT_MS};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Judge solutions locally and inspect the engine setup", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to ARBITER_CONFIG, then config/engine.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Run,
    Submit,
}

impl From<ModeArg> for JudgeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Run => JudgeMode::Run,
            ModeArg::Submit => JudgeMode::Submit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a solution file against a JSON test file
    Judge {
        /// Language (javascript, typescript, python)
        #[arg(short, long)]
        language: Language,

        /// Path to the solution source
        #[arg(short, long)]
        code: PathBuf,

        /// Name of the function to call
        #[arg(short, long)]
        function: String,

        /// JSON array of {"input", "output", "kind"?}
        #[arg(short, long)]
        tests: PathBuf,

        /// run executes every test, submit stops at the first failure
        #[arg(short, long, value_enum, default_value = "run")]
        mode: ModeArg,

        /// Per-test time limit in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIME_LIMIT_MS)]
        time_limit: u64,

        /// Per-test memory limit in KB
        #[arg(long, default_value_t = DEFAULT_MEMORY_LIMIT_KB)]
        memory_limit: u64,

        /// Print the report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a source file top to bottom and print what it printed
    Run {
        /// Language (javascript, typescript, python)
        #[arg(short, long)]
        language: Language,

        /// Path to the source
        #[arg(short, long)]
        code: PathBuf,

        /// Time limit in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIME_LIMIT_MS)]
        time_limit: u64,

        /// Print the report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show how a raw test input is turned into arguments
    Normalize {
        /// Raw input, e.g. "[2,7,11,15], 9"
        input: String,
    },

    /// Check that every configured runtime can judge a trivial solution
    Doctor,

    /// List configured languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Judge {
            language,
            code,
            function,
            tests,
            mode,
            time_limit,
            memory_limit,
            json,
        } => {
            let accepted = commands::judge(
                &config,
                commands::JudgeArgs {
                    language,
                    code,
                    function,
                    tests,
                    mode: mode.into(),
                    time_limit_ms: time_limit,
                    memory_limit_kb: memory_limit,
                    json,
                },
            )
            .await?;
            if !accepted {
                std::process::exit(1);
            }
        }
        Commands::Run {
            language,
            code,
            time_limit,
            json,
        } => {
            if !commands::run(&config, language, &code, time_limit, json).await? {
                std::process::exit(1);
            }
        }
        Commands::Normalize { input } => {
            commands::normalize(&input)?;
        }
        Commands::Doctor => {
            if !commands::doctor(&config).await? {
                std::process::exit(1);
            }
        }
        Commands::Languages => {
            commands::list_languages(&config);
        }
    }

    Ok(())
}
