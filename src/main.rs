mod config;
mod engine;
mod error;
mod executor;
mod i18n;
mod storage;
mod store_manager;
mod tasks;
mod validator;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use config::Config;
use engine::ExecutionEngine;
use error::{ExecuteError, TaskError};
use executor::ShellRunner;
use i18n::I18n;
use storage::{Task, TaskExecution};
use store_manager::StoreManager;
use tasks::TaskService;

#[derive(Parser)]
#[command(name = "tk")]
#[command(about = "Register shell-command tasks, run them on demand, and keep their run history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new task
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: String,
        /// Shell command to run (wrap commands with pipes in quotes)
        #[arg(long)]
        command: String,
        /// Explicit id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// List all tasks
    List,
    /// Show one task and its latest run
    Show { id: String },
    /// Change a task's name, owner or command
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        command: Option<String>,
    },
    /// Delete a task and its history
    Delete { id: String },
    /// Find tasks whose name contains the given text
    Find { name: String },
    /// Run a task's command now and record the result
    Execute { id: String },
    /// Show a task's execution history, newest first
    History {
        id: String,
        /// Maximum number of executions to display [default: display.max_history_shown]
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let i18n = I18n::new(&config.get_effective_language());
    let store = StoreManager::new(config.data_dir()).context(i18n.t("error_open_store"))?;
    tracing::debug!(data_dir = %store.base_dir().display(), "Opened task store");

    run_command(cli.command, &store, &config, &i18n)
}

fn run_command(command: Commands, store: &StoreManager, config: &Config, i18n: &I18n) -> Result<()> {
    let validator = config.validator();
    let service = TaskService::new(store, &validator);

    match command {
        Commands::Execute { id } => {
            let engine = ExecutionEngine::new(
                store,
                validator.clone(),
                ShellRunner::new(config.deadline()),
            );
            println!("{}", i18n.t_format("executing", &[&id]).dimmed());
            match engine.execute(&id) {
                Ok(task) => {
                    if let Some(execution) = task.latest_execution() {
                        print_execution(i18n, 1, execution);
                    }
                    println!(
                        "{}",
                        i18n.t_format("execution_recorded", &[&task.executions().len().to_string()])
                            .green()
                            .bold()
                    );
                }
                Err(ExecuteError::NotFound(id)) => fail(&i18n.t_format("task_not_found", &[&id])),
                Err(ExecuteError::ValidationRejected(message)) => {
                    fail(&i18n.t_format("rejected", &[&message]))
                }
                Err(e @ ExecuteError::Persistence(_)) => return Err(e.into()),
            }
        }
        Commands::Create {
            name,
            owner,
            command,
            id,
        } => {
            let mut task = Task::new(name, owner, command);
            if let Some(id) = id {
                task = task.with_id(id);
            }
            let task = report(service.create(task), i18n)?;
            println!("{}", i18n.t_format("task_created", &[&task.id]).green().bold());
        }
        Commands::List => {
            let tasks = report(service.list(), i18n)?;
            if tasks.is_empty() {
                println!("{}", i18n.t("no_tasks").yellow());
            }
            for task in &tasks {
                print_task_line(i18n, task);
            }
        }
        Commands::Show { id } => {
            let task = report(service.get(&id), i18n)?;
            println!("{}  {}", task.id.cyan().bold(), task.name.bold());
            println!("  {}: {}", i18n.t("field_command").yellow(), task.command);
            println!("  {}: {}", i18n.t("field_owner").yellow(), task.owner);
            println!("  {}: {}", i18n.t("field_runs").yellow(), task.executions().len());
            match task.latest_execution() {
                Some(execution) => print_execution(i18n, 1, execution),
                None => println!("{}", i18n.t("no_executions").dimmed()),
            }
        }
        Commands::Update {
            id,
            name,
            owner,
            command,
        } => {
            let current = report(service.get(&id), i18n)?;
            let task = report(
                service.update(
                    &id,
                    name.unwrap_or(current.name),
                    owner.unwrap_or(current.owner),
                    command.unwrap_or(current.command),
                ),
                i18n,
            )?;
            println!("{}", i18n.t_format("task_updated", &[&task.id]).green().bold());
        }
        Commands::Delete { id } => {
            report(service.delete(&id), i18n)?;
            println!("{}", i18n.t_format("task_deleted", &[&id]).green().bold());
        }
        Commands::Find { name } => match service.find_by_name(&name) {
            Ok(tasks) => {
                for task in &tasks {
                    print_task_line(i18n, task);
                }
            }
            Err(TaskError::NotFound(_)) => fail(&i18n.t_format("no_name_match", &[&name])),
            Err(e) => return report(Err(e), i18n),
        },
        Commands::History { id, limit } => {
            let task = report(service.get(&id), i18n)?;
            let total = task.executions().len();
            if total == 0 {
                println!("{}", i18n.t("no_executions").dimmed());
                return Ok(());
            }
            let shown = limit.unwrap_or(config.display.max_history_shown).min(total);
            for (i, execution) in task.executions().iter().take(shown).enumerate() {
                print_execution(i18n, i + 1, execution);
            }
            if shown < total {
                println!(
                    "{}",
                    i18n.t_format("history_truncated", &[&shown.to_string(), &total.to_string()])
                        .dimmed()
                );
            }
        }
    }
    Ok(())
}

/// Prints not-found and rejection errors and exits; passes storage errors up.
fn report<T>(result: Result<T, TaskError>, i18n: &I18n) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TaskError::NotFound(what)) => fail(&i18n.t_format("task_not_found", &[&what])),
        Err(TaskError::ValidationRejected(message)) => {
            fail(&i18n.t_format("rejected", &[&message]))
        }
        Err(TaskError::Persistence(e)) => Err(e),
    }
}

fn print_task_line(i18n: &I18n, task: &Task) {
    println!(
        "{}",
        i18n.t_format(
            "task_line",
            &[
                &task.id.cyan().to_string(),
                &task.name,
                &task.owner,
                &task.executions().len().to_string(),
            ],
        )
    );
}

fn print_execution(i18n: &I18n, index: usize, execution: &TaskExecution) {
    let exit_code = execution
        .exit_code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| i18n.t("exit_code_none"));
    let start = execution.start_time().with_timezone(&chrono::Local);
    let end = execution.end_time().with_timezone(&chrono::Local);
    let header = i18n.t_format(
        "execution_header",
        &[
            &index.to_string(),
            &start.format("%Y-%m-%d %H:%M:%S").to_string(),
            &end.format("%H:%M:%S").to_string(),
            &execution.duration_ms().to_string(),
            &exit_code,
        ],
    );
    if execution.exit_code() == Some(0) {
        println!("{}", header.green());
    } else {
        println!("{}", header.red());
    }
    println!("{}", i18n.t("output").cyan().bold());
    print!("{}", execution.output());
    if !execution.output().ends_with('\n') {
        println!();
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message.red().bold());
    std::process::exit(1);
}
