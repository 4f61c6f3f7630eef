// diffコマンドハンドラー
//
// dry-runを強制したpushエンジンそのものです。表示のためにallow-unsafeを
// 強制し（実行しないため安全）、差分があれば終了コード1を返します。

use anyhow::Result;

use crate::cli::command_context::CommandContext;
use crate::cli::commands::push::{PushCommand, PushCommandHandler};
use crate::cli::commands::CommandResult;
use crate::cli::OutputFormat;

/// diffコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct DiffCommand {
    /// 共通コンテキスト
    pub context: CommandContext,
    /// 差分のあるインスタンス名のみ表示する
    pub brief: bool,
    /// 出力フォーマット
    pub format: OutputFormat,
}

/// diffコマンドハンドラー
#[derive(Debug, Default)]
pub struct DiffCommandHandler {}

impl DiffCommandHandler {
    /// 新しいDiffCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// diffコマンドを実行
    ///
    /// dry-runは常に強制され、--skip-dry-runでも解除できません。
    pub async fn execute(&self, command: &DiffCommand) -> Result<CommandResult> {
        let push = PushCommand {
            context: command.context.clone(),
            dry_run: true,
            force_allow_unsafe: true,
            brief: command.brief,
            format: command.format.clone(),
        };
        PushCommandHandler::new().execute(&push).await
    }
}
