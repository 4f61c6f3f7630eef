// pushコマンドハンドラー
//
// ターゲットを列挙し、差分をDDL文に落として実行します。diffコマンドは
// dry-runを強制した同じエンジンです。破壊的変更はallow-unsafe（または
// safe-below-size）がない限り拒否されます。

use std::collections::BTreeSet;
use std::fmt::Write as _;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tracing::error;

use tavola_db::services::executor::{combined_exit_code, Executor, TargetReport};
use tavola_db::services::target::TargetEnumerator;

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{render_output, CommandOutput, CommandResult};
use crate::cli::OutputFormat;

/// pushコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct PushCommand {
    /// 共通コンテキスト
    pub context: CommandContext,
    /// 実行せずに文を表示する
    pub dry_run: bool,
    /// allow-unsafeを強制する（diffの表示用）
    pub force_allow_unsafe: bool,
    /// 差分のあるインスタンス名のみ表示する（diff --brief）
    pub brief: bool,
    /// 出力フォーマット
    pub format: OutputFormat,
}

/// 1ターゲット分の表示用セクション
#[derive(Debug, Clone, Serialize)]
pub struct TargetSection {
    /// インスタンス表示名
    pub instance: String,
    /// スキーマ名
    pub schema: String,
    /// 文のリスト
    pub statements: Vec<String>,
    /// 終了コード
    pub exit_code: i32,
}

/// push / diff コマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct PushOutput {
    /// ターゲットごとのセクション
    pub targets: Vec<TargetSection>,
    /// briefモードか
    pub brief: bool,
}

impl CommandOutput for PushOutput {
    fn to_text(&self) -> String {
        if self.brief {
            let instances: BTreeSet<&str> = self
                .targets
                .iter()
                .filter(|t| !t.statements.is_empty() || t.exit_code != 0)
                .map(|t| t.instance.as_str())
                .collect();
            let mut out = String::new();
            for instance in instances {
                let _ = writeln!(out, "{}", instance);
            }
            return out.trim_end().to_string();
        }

        let mut out = String::new();
        for target in &self.targets {
            if target.statements.is_empty() {
                continue;
            }
            let header = format!(
                "-- instance: {} schema: {}",
                target.instance.cyan(),
                target.schema.cyan()
            );
            let _ = writeln!(out, "{}", header.bold());
            for stmt in &target.statements {
                let _ = writeln!(out, "{}", stmt);
            }
            let _ = writeln!(out);
        }
        out.trim_end().to_string()
    }
}

/// pushコマンドハンドラー
#[derive(Debug, Default)]
pub struct PushCommandHandler {}

impl PushCommandHandler {
    /// 新しいPushCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// pushコマンドを実行
    pub async fn execute(&self, command: &PushCommand) -> Result<CommandResult> {
        let context = &command.context;
        let base_dir = context.base_dir()?;

        let mut mods = context.statement_modifiers(&base_dir)?;
        if command.force_allow_unsafe {
            mods.allow_unsafe = true;
        }

        // dry-runはオプションファイルでも設定でき、--skip-dry-runで打ち消せる。
        // diff経由の場合（command.dry_run）は常に強制される
        let dry_run = command.dry_run
            || (base_dir.config.get_bool("dry-run").unwrap_or(false)
                && !base_dir.config.get_bool("skip-dry-run").unwrap_or(false));
        let concurrency = context.concurrent_instances(&base_dir)?;
        let timeout = context.statement_timeout(&base_dir)?;

        let enumerator = TargetEnumerator::new();
        let plans = enumerator.enumerate(&base_dir).await?;

        let executor = Executor::new(concurrency, timeout, dry_run);
        executor.install_sigint_handler();
        let reports = executor.run(plans, mods).await?;

        for report in &reports {
            for message in &report.messages {
                error!(
                    instance = %report.instance,
                    schema = %report.schema_name,
                    "{}",
                    message
                );
            }
        }

        let code = combined_exit_code(&reports);
        let output = PushOutput {
            targets: reports.iter().map(section_from_report).collect(),
            brief: command.brief,
        };
        Ok(CommandResult::with_code(
            render_output(&output, &command.format)?,
            code,
        ))
    }
}

fn section_from_report(report: &TargetReport) -> TargetSection {
    TargetSection {
        instance: report.instance.clone(),
        schema: report.schema_name.clone(),
        statements: report.statements.clone(),
        exit_code: report.code.value(),
    }
}
