use anyhow::Result;
use clap::Parser;
use colored::control as color_control;
use std::env;
use std::process;
use tavola::cli::command_context::CommandContext;
use tavola::cli::commands::add_environment::{
    AddEnvironmentCommand, AddEnvironmentCommandHandler,
};
use tavola::cli::commands::diff::{DiffCommand, DiffCommandHandler};
use tavola::cli::commands::init::{InitCommand, InitCommandHandler};
use tavola::cli::commands::lint::{LintCommand, LintCommandHandler};
use tavola::cli::commands::pull::{PullCommand, PullCommandHandler};
use tavola::cli::commands::push::{PushCommand, PushCommandHandler};
use tavola::cli::commands::{CommandResult, ErrorOutput};
use tavola::cli::{Cli, Commands, OutputFormat};
use tavola::core::error::{ExitCode, ExitValue};
use tracing_subscriber::EnvFilter;

fn main() {
    // CLIをパースして実行
    let cli = Cli::parse();

    // 非同期ランタイムを作成して実行
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Error: failed to create async runtime: {:#}", e);
        process::exit(ExitCode::FatalError.value());
    });

    let is_json = matches!(cli.format, OutputFormat::Json);
    let result = runtime.block_on(run_command(cli));

    match result {
        Ok(result) => {
            if !result.output.is_empty() {
                println!("{}", result.output);
            }
            process::exit(result.code.value());
        }
        Err(e) => {
            let code = e
                .downcast_ref::<ExitValue>()
                .map(|ev| ev.code)
                .unwrap_or(ExitCode::FatalError);
            if is_json {
                // JSON モードではエラーも構造化JSON形式で出力
                eprintln!("{}", ErrorOutput::new(format!("{:#}", e), code).to_json());
            } else {
                eprintln!("Error: {:#}", e);
            }
            process::exit(code.value());
        }
    }
}

/// コマンドを実行する
async fn run_command(cli: Cli) -> Result<CommandResult> {
    // --no-color フラグの処理
    if cli.no_color {
        color_control::set_override(false);
    }

    // --verbose フラグの処理: tracing subscriber を初期化
    // TAVOLA_LOG 環境変数が設定されている場合はそちらを優先する
    // 例: TAVOLA_LOG=info tavola diff
    let filter = if let Ok(env_filter) = env::var("TAVOLA_LOG") {
        EnvFilter::new(env_filter)
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    // try_init() を使用して二重登録時のパニックを防止
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    let context = CommandContext::new(cli.environment(), cli.cli_options(), cli.dir.clone());
    let format = cli.format.clone();

    match &cli.command {
        Commands::Init { .. } => {
            let command = InitCommand {
                context,
                dir_supplied: cli.dir.is_some(),
                format,
            };
            InitCommandHandler::new().execute(&command).await
        }
        Commands::AddEnvironment { .. } => {
            let command = AddEnvironmentCommand { context, format };
            AddEnvironmentCommandHandler::new().execute(&command).await
        }
        Commands::Pull { .. } => {
            let command = PullCommand { context, format };
            PullCommandHandler::new().execute(&command).await
        }
        Commands::Lint { .. } => {
            let command = LintCommand { context, format };
            LintCommandHandler::new().execute(&command).await
        }
        Commands::Diff { brief, .. } => {
            let command = DiffCommand {
                context,
                brief: *brief,
                format,
            };
            DiffCommandHandler::new().execute(&command).await
        }
        Commands::Push { dry_run, .. } => {
            let command = PushCommand {
                context,
                dry_run: *dry_run,
                force_allow_unsafe: false,
                brief: false,
                format,
            };
            PushCommandHandler::new().execute(&command).await
        }
    }
}
