// add-environmentコマンドハンドラー
//
// initで作成済みのホストレベルディレクトリの .tavola に、新しい環境
// セクションを追加します。オプションファイルの変更のみを行い、
// 接続確認は意図的に行いません。

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;

use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::naming::OPTION_FILE;
use tavola_core::core::option_file::validate_section_name;

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{render_output, CommandOutput, CommandResult};
use crate::cli::OutputFormat;

/// add-environmentコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct AddEnvironmentCommand {
    /// 共通コンテキスト（environmentは追加対象の環境名）
    pub context: CommandContext,
    /// 出力フォーマット
    pub format: OutputFormat,
}

/// add-environmentコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct AddEnvironmentOutput {
    /// メッセージ
    pub message: String,
    /// 追加された環境名
    pub environment: String,
    /// 変更されたオプションファイル
    pub option_file: String,
}

impl CommandOutput for AddEnvironmentOutput {
    fn to_text(&self) -> String {
        self.message.clone()
    }
}

/// add-environmentコマンドハンドラー
#[derive(Debug, Default)]
pub struct AddEnvironmentCommandHandler {}

impl AddEnvironmentCommandHandler {
    /// 新しいAddEnvironmentCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// add-environmentコマンドを実行
    pub async fn execute(&self, command: &AddEnvironmentCommand) -> Result<CommandResult> {
        let context = &command.context;
        let environment = &context.environment;

        if environment.is_empty() || validate_section_name(environment).is_err() {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!("Environment name \"{}\" is invalid", environment),
            )));
        }

        let dir = context.base_dir()?;
        if !dir.exists() {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                "In add-environment, --dir must refer to a directory that already exists",
            )));
        }
        if !dir.has_option_file() {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!(
                    "Directory {} does not have an existing {} file! Can only use `tavola add-environment` on a dir previously created by `tavola init`",
                    dir, OPTION_FILE
                ),
            )));
        }

        let mut option_file = dir.option_file()?;
        if option_file.has_section(environment) {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!(
                    "Environment name \"{}\" already defined in {}",
                    environment,
                    option_file.path().display()
                ),
            )));
        }
        if !option_file.some_section_has_option("host") {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                "This command should be run against a --dir whose option file already defines a host for another environment",
            )));
        }

        // 対象ホストのInstanceを組み立てる。オプションファイルの操作のみが
        // 目的なので、ここでは意図的に接続確認をしない
        if !context.cli_options.contains_key("host") {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                "`tavola add-environment` requires --host to be supplied on the command line",
            )));
        }
        let instances = dir.instances().await?;
        let instance = instances.first().ok_or_else(|| {
            anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                "Command line did not specify which instance to connect to",
            ))
        })?;

        option_file.set_value(environment, "host", &instance.host)?;
        if instance.host == "localhost" {
            if let Some(socket) = &instance.socket {
                option_file.set_value(environment, "socket", socket)?;
            } else {
                option_file.set_value(environment, "port", &instance.port.to_string())?;
            }
        } else {
            option_file.set_value(environment, "port", &instance.port.to_string())?;
        }
        if context.cli_options.contains_key("user") {
            option_file.set_value(environment, "user", &instance.user)?;
        }

        option_file
            .write()
            .with_context(|| format!("Unable to write {}", option_file.path().display()))?;
        info!(
            environment = %environment,
            file = %option_file.path().display(),
            "Added environment section"
        );

        let output = AddEnvironmentOutput {
            message: format!(
                "Added environment [{}] to {}",
                environment,
                option_file.path().display()
            ),
            environment: environment.clone(),
            option_file: option_file.path().display().to_string(),
        };
        Ok(CommandResult::success(render_output(
            &output,
            &command.format,
        )?))
    }
}
