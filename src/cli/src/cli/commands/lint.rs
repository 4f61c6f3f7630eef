// lintコマンドハンドラー
//
// ベースディレクトリ以下の全 `*.sql` ファイルを正準形に書き直します。
// 単一の有効なCREATE TABLE文でないファイルは報告のうえ変更せず残し、
// コマンド全体はFatalErrorになります（他のファイルの整形は継続）。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use tavola_core::core::error::ExitCode;

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{render_output, CommandOutput, CommandResult};
use crate::cli::OutputFormat;

/// lintコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct LintCommand {
    /// 共通コンテキスト
    pub context: CommandContext,
    /// 出力フォーマット
    pub format: OutputFormat,
}

/// lintコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct LintOutput {
    /// メッセージ
    pub message: String,
    /// 正準形に書き直されたファイル
    pub reformatted: Vec<String>,
    /// 問題のあるファイルとその理由
    pub invalid: Vec<String>,
}

impl CommandOutput for LintOutput {
    fn to_text(&self) -> String {
        self.message.clone()
    }
}

/// lintコマンドハンドラー
#[derive(Debug, Default)]
pub struct LintCommandHandler {}

impl LintCommandHandler {
    /// 新しいLintCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// lintコマンドを実行
    pub async fn execute(&self, command: &LintCommand) -> Result<CommandResult> {
        let context = &command.context;
        let base_dir = context.base_dir()?;
        let include_auto_inc = base_dir
            .config
            .get_bool("include-auto-inc")
            .unwrap_or(false);

        let mut reformatted = Vec::new();
        let mut invalid = Vec::new();
        self.lint_dir_tree(&base_dir.path, include_auto_inc, &mut reformatted, &mut invalid)?;

        let code = if !invalid.is_empty() {
            ExitCode::FatalError
        } else if !reformatted.is_empty() {
            ExitCode::DifferencesFound
        } else {
            ExitCode::Success
        };

        let message = if reformatted.is_empty() && invalid.is_empty() {
            "All files are already in canonical format".to_string()
        } else {
            format!(
                "Reformatted {} file(s), {} file(s) invalid",
                reformatted.len(),
                invalid.len()
            )
        };
        let output = LintOutput {
            message,
            reformatted,
            invalid,
        };
        Ok(CommandResult::with_code(
            render_output(&output, &command.format)?,
            code,
        ))
    }

    /// ディレクトリツリーを辿って各 `*.sql` を整形
    fn lint_dir_tree(
        &self,
        path: &Path,
        include_auto_inc: bool,
        reformatted: &mut Vec<String>,
        invalid: &mut Vec<String>,
    ) -> Result<()> {
        for mut file in tavola_db::services::sql_file::sql_files_in(path)? {
            if let Some(err) = &file.error {
                error!(file = %file.path.display(), "{}", err);
                invalid.push(format!("{}: {}", file.path.display(), err));
                continue;
            }
            let table = file
                .parse()
                .with_context(|| format!("Unable to parse {}", file.path.display()))?;
            let canonical = format!("{}\n", table.create_statement_text(include_auto_inc));
            if canonical != file.contents {
                file.contents = canonical;
                file.write()
                    .with_context(|| format!("Unable to rewrite {}", file.path.display()))?;
                info!(file = %file.path.display(), "Reformatted");
                reformatted.push(file.path.display().to_string());
            }
        }

        let mut subdir_names: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() && !name.starts_with('.') {
                subdir_names.push(entry.path());
            }
        }
        subdir_names.sort();
        for subdir in subdir_names {
            self.lint_dir_tree(&subdir, include_auto_inc, reformatted, invalid)?;
        }
        Ok(())
    }
}
