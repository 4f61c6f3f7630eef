// コマンド共通コンテキスト
//
// 環境名とCLIオプションからのDir構築、エンジン系オプションの検証など、
// コマンド間の重複をCLI層で集約する。

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::schema_diff::{NextAutoInc, StatementModifiers};
use tavola_db::services::dir::Dir;

/// ALTER文に許可されるALGORITHM句
pub const ALTER_ALGORITHMS: &[&str] = &["INPLACE", "COPY", "INSTANT", "DEFAULT"];

/// ALTER文に許可されるLOCK句
pub const ALTER_LOCKS: &[&str] = &["NONE", "SHARED", "EXCLUSIVE", "DEFAULT"];

/// CLIコマンド共通の実行コンテキスト
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// 選択された環境名
    pub environment: String,
    /// CLIで明示されたオプション
    pub cli_options: HashMap<String, String>,
    /// 操作対象のベースディレクトリ
    pub base_path: PathBuf,
}

impl CommandContext {
    /// コンテキストを作成
    ///
    /// `--dir` 未指定時はカレントディレクトリを使用します。
    pub fn new(
        environment: String,
        cli_options: HashMap<String, String>,
        dir: Option<String>,
    ) -> Self {
        Self {
            environment,
            cli_options,
            base_path: PathBuf::from(dir.unwrap_or_else(|| ".".to_string())),
        }
    }

    /// ベースディレクトリのDirを構築
    pub fn base_dir(&self) -> Result<Dir> {
        Dir::new(&self.base_path, &self.environment, self.cli_options.clone())
    }

    /// 任意のパスのDirを構築
    pub fn dir_at(&self, path: impl Into<PathBuf>) -> Result<Dir> {
        Dir::new(path.into(), &self.environment, self.cli_options.clone())
    }

    /// エンジン系オプションを検証してStatementModifiersを構築
    ///
    /// 不正な値はBadConfig（ignore-tableのみBadInput）になります。
    pub fn statement_modifiers(&self, dir: &Dir) -> Result<StatementModifiers> {
        let config = &dir.config;

        let algorithm = config
            .require_enum("alter-algorithm", ALTER_ALGORITHMS)
            .map_err(config_err)?;
        let lock = config
            .require_enum("alter-lock", ALTER_LOCKS)
            .map_err(config_err)?;
        let ignore_table = config.get_regex("ignore-table").map_err(config_err)?;
        let allow_unsafe = config.get_bool("allow-unsafe").map_err(config_err)?;
        let include_auto_inc = config.get_bool("include-auto-inc").map_err(config_err)?;

        Ok(StatementModifiers {
            allow_unsafe,
            next_auto_inc: if include_auto_inc {
                NextAutoInc::Always
            } else {
                NextAutoInc::IfIncreased
            },
            algorithm_clause: algorithm,
            lock_clause: lock,
            ignore_table,
        })
    }

    /// concurrent-instances を検証して返す（1以上）
    pub fn concurrent_instances(&self, dir: &Dir) -> Result<usize> {
        let value = dir
            .config
            .get_int("concurrent-instances")
            .map_err(config_err)?;
        if value < 1 {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!("concurrent-instances must be at least 1, got {}", value),
            )));
        }
        Ok(value as usize)
    }

    /// statement-timeout を検証して返す（秒）
    pub fn statement_timeout(&self, dir: &Dir) -> Result<u64> {
        let value = dir
            .config
            .get_int("statement-timeout")
            .map_err(config_err)?;
        if value < 0 {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                "statement-timeout may not be negative".to_string(),
            )));
        }
        Ok(value as u64)
    }
}

fn config_err(e: tavola_core::core::error::ConfigError) -> anyhow::Error {
    anyhow!(ExitValue::new(e.exit_code(), e.to_string()))
}
