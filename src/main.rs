use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use paw_tester::notify::{self, jira, teams, testrail, Dispatcher, ReqwestTransport};
use paw_tester::report::metadata::{ExecutionMetadataFile, MetadataSources};
use paw_tester::report::{self, checker, cleanup, PipelineOptions};
use paw_tester::utils::{Config, EnvSnapshot};

#[derive(Parser)]
#[command(name = "paw-tester")]
#[command(version)]
#[command(about = "Test report aggregation and notification for PAW BDD runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the HTML report and notify every configured integration
    Report {
        /// Runner JSON report (default: first report found in the reports dir)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Skip TestRail, Jira and Teams
        #[arg(long, default_value = "false")]
        no_notify: bool,
    },

    /// Check a runner report and exit 0 (passed), 1 (failed) or 2 (invalid)
    Check {
        /// Runner JSON report (default: first report found in the reports dir)
        report: Option<PathBuf>,
    },

    /// Remove stale JSON/HTML files from the reports dir
    Cleanup,

    /// Write the execution metadata sidecar
    Metadata {
        #[command(subcommand)]
        command: MetadataCommands,
    },

    /// Send a single notification
    Notify {
        #[command(subcommand)]
        target: NotifyTarget,
    },

    /// TestRail helpers
    Testrail {
        #[command(subcommand)]
        command: TestRailCommands,
    },
}

#[derive(Subcommand)]
enum MetadataCommands {
    /// Record the start of a run
    Start,
    /// Record the end of a run
    Finish {
        /// Number of executed scenarios
        #[arg(long, default_value = "0")]
        scenarios: u32,
    },
}

#[derive(Subcommand)]
enum NotifyTarget {
    Teams {
        /// Send a fixed sample summary to check the webhook
        #[arg(long, default_value = "false")]
        test: bool,
    },
    Jira,
    Testrail,
}

#[derive(Subcommand)]
enum TestRailCommands {
    /// List JSON report files
    ListFiles,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let env = EnvSnapshot::from_process();
    let config = Config::resolve(&env);

    match cli.command {
        Commands::Report { report, no_notify } => {
            println!(
                "{} Generating report for {} ({})",
                "📊".blue(),
                config.environment.to_uppercase().cyan(),
                config.browser.cyan()
            );
            let transport = Arc::new(ReqwestTransport::new()?);
            let options = PipelineOptions {
                report_path: report,
                notify: !no_notify,
            };
            let summary = report::run_pipeline(&config, &env, &options, transport).await;
            summary.print();
            if summary.rendered.is_none() {
                std::process::exit(1);
            }
        }

        Commands::Check { report } => {
            let path =
                report.unwrap_or_else(|| report::find_cucumber_report(&config.paths.reports_dir));
            let outcome = checker::check_results(&path, config.ci.is_ci);
            std::process::exit(outcome.exit_code);
        }

        Commands::Cleanup => {
            println!(
                "{} Cleaning reports in: {}",
                "🧹".blue(),
                config.paths.reports_dir.display()
            );
            let removed = cleanup::cleanup_reports(&config.paths.reports_dir)?;
            println!("{} Removed {} file(s)", "✓".green(), removed);
        }

        Commands::Metadata { command } => {
            let file = ExecutionMetadataFile::new(config.paths.metadata_file());
            let meta = match command {
                MetadataCommands::Start => {
                    file.record_start(Utc::now(), &config.browser, &config.environment)?
                }
                MetadataCommands::Finish { scenarios } => file.record_finish(Utc::now(), scenarios)?,
            };
            println!(
                "{} Execution metadata written to {}",
                "✓".green(),
                file.path().display()
            );
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }

        Commands::Notify { target } => {
            let transport = Arc::new(ReqwestTransport::new()?);
            let loaded = || {
                let sources = MetadataSources::gather(&config, &env);
                let path = report::find_cucumber_report(&config.paths.reports_dir);
                report::load_report(&path, &config, &sources, Utc::now())
            };

            let (dispatcher, report) = match target {
                NotifyTarget::Teams { test } => {
                    let report = if test {
                        println!("{} Sending sample Teams notification", "🧪".blue());
                        teams::sample_report(&config.environment, &config.browser)
                    } else {
                        loaded()
                    };
                    let dispatcher =
                        teams::TeamsDispatcher::new(config.teams.clone(), config.ci.clone(), transport);
                    (Box::new(dispatcher) as Box<dyn Dispatcher>, report)
                }
                NotifyTarget::Jira => (
                    Box::new(jira::JiraDispatcher::new(
                        config.jira.clone(),
                        config.ci.clone(),
                        transport,
                    )) as Box<dyn Dispatcher>,
                    loaded(),
                ),
                NotifyTarget::Testrail => (
                    Box::new(testrail::TestRailDispatcher::new(
                        config.testrail.clone(),
                        config.environment.clone(),
                        transport,
                    )) as Box<dyn Dispatcher>,
                    loaded(),
                ),
            };

            let outcome = notify::dispatch(dispatcher.as_ref(), &report).await;
            outcome.print(dispatcher.name());
            if matches!(outcome, notify::DispatchOutcome::Failed(_)) {
                std::process::exit(1);
            }
        }

        Commands::Testrail { command } => match command {
            TestRailCommands::ListFiles => {
                let dir = &config.paths.reports_dir;
                let files = report::list_report_files(dir)
                    .with_context(|| format!("Cannot read {}", dir.display()))?;
                if files.is_empty() {
                    println!("No JSON report files in {}", dir.display());
                }
                for file in files {
                    println!("  {}", file.display());
                }
            }
        },
    }

    Ok(())
}
