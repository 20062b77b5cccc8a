use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use harness_runner::{Engine, RunRequest, RunResult, RunStatus, Verdict};

#[derive(Debug, Parser)]
#[command(name = "harness-runner", about = "Run a solution against a problem's test harness")]
struct Cli {
    /// Directory holding one sub-directory per problem
    #[arg(long, env = "HARNESS_PROBLEMS_DIR", default_value = "problems", global = true)]
    problems_dir: PathBuf,

    /// Where per-run working directories are created (system temp dir by default)
    #[arg(long, env = "HARNESS_SCRATCH_DIR", global = true)]
    scratch_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a solution
    Run {
        #[arg(short, long)]
        problem: String,
        #[arg(short, long)]
        language: String,
        /// Path to the solution source file
        #[arg(short, long)]
        solution: PathBuf,
        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
        /// Seconds allowed for the setup command or the batch test command
        #[arg(long, default_value_t = 120)]
        timeout: u64,
        /// Run the whole suite as one command instead of one process per test
        #[arg(long)]
        batch: bool,
    },
    /// List the languages a problem has a harness for
    Languages {
        #[arg(short, long)]
        problem: String,
        /// Print names, solution files and stub sources as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let mut engine = Engine::native(&cli.problems_dir);
    if let Some(scratch_dir) = &cli.scratch_dir {
        engine = engine.with_scratch_dir(scratch_dir);
    }

    match cli.command {
        Commands::Run {
            problem,
            language,
            solution,
            json,
            timeout,
            batch,
        } => {
            let solution_code = match tokio::fs::read_to_string(&solution).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("Error: cannot read solution file {}: {}", solution.display(), e);
                    return Ok(ExitCode::FAILURE);
                }
            };

            let mut request = RunRequest::new(&problem, &language, &solution_code)
                .with_timeout(Duration::from_secs(timeout));
            if batch {
                request = request.batch();
            }
            let result = engine.run(&request).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result, &problem, &language);
            }

            Ok(if result.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Languages { problem, json } => {
            let languages = engine.languages(&problem).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&languages)?);
            } else {
                for language in &languages {
                    let stub = if language.stub.is_some() { "stub" } else { "-" };
                    println!(
                        "{}\t{}\t{}",
                        language.name,
                        language.solution_file.display(),
                        stub
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_result(result: &RunResult, problem: &str, language: &str) {
    let header = format!("{} ({})", problem.to_uppercase(), language);

    match result.status {
        RunStatus::Completed => {
            let summary = &result.summary;
            println!(
                "\n{} -- {}/{} passed ({}s)\n",
                header, summary.passed, summary.total, summary.time_seconds
            );
            for test in &result.tests {
                let label = match test.verdict {
                    Verdict::Passed => "PASS",
                    Verdict::Failed => "FAIL",
                    Verdict::TimeLimitExceeded => "TLE ",
                    Verdict::MemoryLimitExceeded => "MLE ",
                    Verdict::RuntimeError => "RTE ",
                };
                let mut message = test.message.clone().unwrap_or_default();
                if message.chars().count() > 120 {
                    message = message.chars().take(117).collect::<String>() + "...";
                }
                println!("  {} {}  ({}s)  {}", label, test.name, test.time_seconds, message);
            }
        }
        status => {
            let title = match status {
                RunStatus::Timeout => "TIMEOUT",
                RunStatus::BuildError => "BUILD ERROR",
                _ => "RUNTIME ERROR",
            };
            println!("\n{} -- {}\n", header, title);
            let lines: Vec<_> = result.stderr.trim().lines().collect();
            for line in &lines[lines.len().saturating_sub(20)..] {
                println!("  {}", line);
            }
        }
    }
    println!();
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
