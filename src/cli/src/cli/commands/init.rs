// initコマンドハンドラー
//
// 稼働中のインスタンスからファイルシステム表現を生成します。
// - ホストレベルディレクトリと .tavola の作成（[環境]セクションに接続情報）
// - スキーマごとのサブディレクトリと schema= オプションファイルの作成
// - テーブルごとの正準CREATE TABLE文の *.sql ファイル出力

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::naming::OPTION_FILE;
use tavola_core::core::option_file::{validate_section_name, OptionFile};
use tavola_core::core::schema::Schema;
use tavola_db::adapters::instance::Instance;
use tavola_db::adapters::introspector::Introspector;

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{render_output, CommandOutput, CommandResult};
use crate::cli::OutputFormat;

/// initコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct InitCommand {
    /// 共通コンテキスト
    pub context: CommandContext,
    /// CLIで --dir が明示されたか
    pub dir_supplied: bool,
    /// 出力フォーマット
    pub format: OutputFormat,
}

/// initコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct InitOutput {
    /// メッセージ
    pub message: String,
    /// ホストレベルディレクトリ
    pub base_dir: String,
    /// 生成されたスキーマディレクトリ
    pub schema_dirs: Vec<String>,
    /// 出力されたテーブルファイル数
    pub table_files: usize,
}

impl CommandOutput for InitOutput {
    fn to_text(&self) -> String {
        self.message.clone()
    }
}

/// initコマンドハンドラー
#[derive(Debug, Default)]
pub struct InitCommandHandler {}

impl InitCommandHandler {
    /// 新しいInitCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// initコマンドを実行
    pub async fn execute(&self, command: &InitCommand) -> Result<CommandResult> {
        let context = &command.context;
        validate_section_name(&context.environment)
            .map_err(|e| anyhow!(ExitValue::new(ExitCode::BadConfig, e.to_string())))?;

        if !context.cli_options.contains_key("host") {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                "`tavola init` requires --host to be supplied on the command line",
            )));
        }

        // --dir 未指定時は <host>:<port> をディレクトリ名にする
        let base_path = if command.dir_supplied {
            context.base_path.clone()
        } else {
            let host = context.cli_options.get("host").cloned().unwrap_or_default();
            let port = context
                .cli_options
                .get("port")
                .cloned()
                .unwrap_or_else(|| "3306".to_string());
            PathBuf::from(format!("{}:{}", host, port))
        };

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                anyhow!(ExitValue::new(
                    ExitCode::CantCreate,
                    format!("Unable to create directory {}: {}", base_path.display(), e),
                ))
            })?;
        }

        let dir = context.dir_at(&base_path)?;
        if dir.has_option_file() {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!(
                    "Directory {} already contains a {} file; cannot re-init",
                    dir, OPTION_FILE
                ),
            )));
        }

        let instance = dir.first_instance().await?;
        let (server_char_set, server_collation) =
            instance.default_char_set_and_collation().await?;

        // ホストレベルのオプションファイルを書き出す
        let mut host_file = OptionFile::new(dir.option_file_path());
        self.fill_connection_options(&mut host_file, context, &instance)?;
        host_file.write().with_context(|| {
            format!("Unable to write option file for {}", dir)
        })?;
        info!(dir = %dir, "Wrote {}", host_file.path().display());

        // 対象スキーマの決定: --schema 指定時はそれのみ、省略時は全スキーマ
        let schema_names: Vec<String> = match context.cli_options.get("schema") {
            Some(value) => value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => instance.schema_names().await?,
        };

        let introspector = Introspector::new();
        let include_auto_inc = dir
            .config
            .get_bool("include-auto-inc")
            .unwrap_or(false);

        let mut schema_dirs = Vec::new();
        let mut table_files = 0;
        for name in &schema_names {
            let Some(schema) = introspector.introspect_schema(&instance, name).await? else {
                return Err(anyhow!(ExitValue::new(
                    ExitCode::BadInput,
                    format!("Schema {} does not exist on {}", name, instance),
                )));
            };
            table_files += self
                .materialize_schema_dir(
                    &base_path,
                    &schema,
                    (&server_char_set, &server_collation),
                    include_auto_inc,
                )
                .await?;
            schema_dirs.push(name.clone());
        }

        let output = InitOutput {
            message: format!(
                "Initialized {} with {} schema dir(s), {} table file(s) from {}",
                base_path.display(),
                schema_dirs.len(),
                table_files,
                instance
            ),
            base_dir: base_path.display().to_string(),
            schema_dirs,
            table_files,
        };
        Ok(CommandResult::success(render_output(
            &output,
            &command.format,
        )?))
    }

    /// 接続情報を環境セクションへ書き込む
    fn fill_connection_options(
        &self,
        file: &mut OptionFile,
        context: &CommandContext,
        instance: &Instance,
    ) -> Result<()> {
        let section = &context.environment;
        file.set_value(section, "host", &instance.host)?;
        match &instance.socket {
            Some(socket) => file.set_value(section, "socket", socket)?,
            None => file.set_value(section, "port", &instance.port.to_string())?,
        }
        if context.cli_options.contains_key("user") {
            file.set_value(section, "user", &instance.user)?;
        }
        Ok(())
    }

    /// 1スキーマ分のディレクトリとファイルを出力
    async fn materialize_schema_dir(
        &self,
        base_path: &PathBuf,
        schema: &Schema,
        server_defaults: (&str, &str),
        include_auto_inc: bool,
    ) -> Result<usize> {
        let schema_path = base_path.join(&schema.name);
        fs::create_dir_all(&schema_path).map_err(|e| {
            anyhow!(ExitValue::new(
                ExitCode::CantCreate,
                format!(
                    "Unable to create directory {}: {}",
                    schema_path.display(),
                    e
                ),
            ))
        })?;

        // schema= はセクションなし領域に置き、全環境に適用する
        let mut option_file = OptionFile::new(schema_path.join(OPTION_FILE));
        option_file.set_value("", "schema", &schema.name)?;
        if schema.char_set != server_defaults.0 {
            option_file.set_value("", "default-character-set", &schema.char_set)?;
        }
        if schema.collation != server_defaults.1 {
            option_file.set_value("", "default-collation", &schema.collation)?;
        }
        option_file.write().with_context(|| {
            format!("Unable to write {}", option_file.path().display())
        })?;

        let mut count = 0;
        for table in &schema.tables {
            let file_path = schema_path.join(format!("{}.sql", table.name));
            let contents = format!("{}\n", table.create_statement_text(include_auto_inc));
            fs::write(&file_path, contents).map_err(|e| {
                anyhow!(ExitValue::new(
                    ExitCode::CantCreate,
                    format!("Unable to write {}: {}", file_path.display(), e),
                ))
            })?;
            debug!(file = %file_path.display(), "Wrote table file");
            count += 1;
        }
        Ok(count)
    }
}
