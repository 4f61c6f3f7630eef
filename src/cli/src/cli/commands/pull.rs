// pullコマンドハンドラー
//
// 稼働中のインスタンスからファイルシステム表現を更新します。
// - 正準形が変わったテーブルの *.sql を書き直す
// - 新しいテーブルのファイルを作成し、消えたテーブルのファイルを削除する
// - スキーマの文字セットが変わった場合はオプションファイルを更新する
// - インスタンスから消えたスキーマのディレクトリを（手作業の内容を含まない
//   場合に限り）削除し、新しいスキーマのディレクトリを作成する

use std::collections::HashSet;
use std::fs;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::naming::OPTION_FILE;
use tavola_core::core::option_file::OptionFile;
use tavola_core::core::schema::Schema;
use tavola_db::adapters::introspector::Introspector;
use tavola_db::services::target::TargetEnumerator;

use crate::cli::command_context::CommandContext;
use crate::cli::commands::{render_output, CommandOutput, CommandResult};
use crate::cli::OutputFormat;

/// pullコマンドの入力パラメータ
#[derive(Debug, Clone)]
pub struct PullCommand {
    /// 共通コンテキスト
    pub context: CommandContext,
    /// 出力フォーマット
    pub format: OutputFormat,
}

/// pullコマンドの出力構造体
#[derive(Debug, Clone, Serialize)]
pub struct PullOutput {
    /// メッセージ
    pub message: String,
    /// 書き換えられたファイル数
    pub updated: usize,
    /// 新規作成されたファイル数
    pub created: usize,
    /// 削除されたファイル数
    pub deleted: usize,
}

impl CommandOutput for PullOutput {
    fn to_text(&self) -> String {
        self.message.clone()
    }
}

/// pullコマンドハンドラー
#[derive(Debug, Default)]
pub struct PullCommandHandler {}

impl PullCommandHandler {
    /// 新しいPullCommandHandlerを作成
    pub fn new() -> Self {
        Self {}
    }

    /// pullコマンドを実行
    pub async fn execute(&self, command: &PullCommand) -> Result<CommandResult> {
        let context = &command.context;
        let base_dir = context.base_dir()?;
        let include_auto_inc = base_dir
            .config
            .get_bool("include-auto-inc")
            .unwrap_or(false);

        let enumerator = TargetEnumerator::new();
        let plans = enumerator.enumerate(&base_dir).await?;

        let mut updated = 0;
        let mut created = 0;
        let mut deleted = 0;

        let mut seen_schemas: HashSet<String> = HashSet::new();
        for plan in &plans {
            let target = plan.produce().await?;
            seen_schemas.insert(target.schema_name.clone());

            let Some(instance_schema) = &target.schema_from_instance else {
                self.remove_vanished_schema_dir(&target.dir.path, &target.schema_name)?;
                continue;
            };

            self.update_option_file_charset(&target.dir.path, instance_schema)?;

            // インスタンス側の各テーブルについてファイルを揃える
            let files = target.dir.sql_files()?;
            for table in &instance_schema.tables {
                let desired = format!("{}\n", table.create_statement_text(include_auto_inc));
                let file_name = format!("{}.sql", table.name);
                match files.iter().find(|f| f.file_name == file_name) {
                    Some(existing) => {
                        if existing.contents != desired {
                            let mut replacement = existing.clone();
                            replacement.contents = desired;
                            replacement.write().with_context(|| {
                                format!("Unable to rewrite {}", existing.path.display())
                            })?;
                            info!(file = %existing.path.display(), "Updated");
                            updated += 1;
                        }
                    }
                    None => {
                        let path = target.dir.path.join(&file_name);
                        fs::write(&path, desired).map_err(|e| {
                            anyhow!(ExitValue::new(
                                ExitCode::CantCreate,
                                format!("Unable to write {}: {}", path.display(), e),
                            ))
                        })?;
                        info!(file = %path.display(), "Created");
                        created += 1;
                    }
                }
            }

            // インスタンスに存在しないテーブルのファイルを削除
            for file in &files {
                if file.error.is_some() {
                    warn!(
                        file = %file.path.display(),
                        "File is not a single CREATE TABLE statement; leaving unchanged"
                    );
                    continue;
                }
                if !instance_schema.has_table(file.table_name()) {
                    file.delete().with_context(|| {
                        format!("Unable to delete {}", file.path.display())
                    })?;
                    info!(file = %file.path.display(), "Deleted");
                    deleted += 1;
                }
            }
        }

        // ホストレベルから実行された場合、新しいスキーマのディレクトリを作成
        if base_dir.is_host_level()? {
            created += self
                .materialize_new_schemas(&base_dir, &seen_schemas, include_auto_inc)
                .await?;
        }

        let output = PullOutput {
            message: format!(
                "Pull complete: {} updated, {} created, {} deleted",
                updated, created, deleted
            ),
            updated,
            created,
            deleted,
        };
        Ok(CommandResult::success(render_output(
            &output,
            &command.format,
        )?))
    }

    /// インスタンスから消えたスキーマのディレクトリを削除
    ///
    /// `*.sql` とオプションファイル以外を含むディレクトリは手作業の内容と
    /// みなし、削除せずに警告します。
    fn remove_vanished_schema_dir(
        &self,
        path: &std::path::Path,
        schema_name: &str,
    ) -> Result<()> {
        let mut removable = true;
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == OPTION_FILE || name.ends_with(".sql") {
                continue;
            }
            removable = false;
            break;
        }
        if removable {
            fs::remove_dir_all(path)
                .with_context(|| format!("Unable to remove {}", path.display()))?;
            info!(schema = schema_name, dir = %path.display(), "Removed dir for schema no longer on instance");
        } else {
            warn!(
                schema = schema_name,
                dir = %path.display(),
                "Schema no longer exists on instance, but dir contains manual content; not removing"
            );
        }
        Ok(())
    }

    /// スキーマの文字セット・照合順序のドリフトをオプションファイルに反映
    fn update_option_file_charset(
        &self,
        path: &std::path::Path,
        instance_schema: &Schema,
    ) -> Result<()> {
        let option_path = path.join(OPTION_FILE);
        if !option_path.is_file() {
            return Ok(());
        }
        let mut file = OptionFile::read(&option_path)?;
        let mut changed = false;
        if let Some(current) = file.option_value("", "default-character-set") {
            if current != instance_schema.char_set {
                file.set_value("", "default-character-set", &instance_schema.char_set)?;
                changed = true;
            }
        }
        if let Some(current) = file.option_value("", "default-collation") {
            if current != instance_schema.collation {
                file.set_value("", "default-collation", &instance_schema.collation)?;
                changed = true;
            }
        }
        if changed {
            file.write()
                .with_context(|| format!("Unable to write {}", option_path.display()))?;
            info!(file = %option_path.display(), "Updated schema-level character set options");
        }
        Ok(())
    }

    /// インスタンス上にあるがディレクトリのないスキーマを実体化
    async fn materialize_new_schemas(
        &self,
        base_dir: &tavola_db::services::dir::Dir,
        seen: &HashSet<String>,
        include_auto_inc: bool,
    ) -> Result<usize> {
        let instance = base_dir.first_instance().await?;
        let introspector = Introspector::new();
        let mut created = 0;

        for name in instance.schema_names().await? {
            if seen.contains(&name) {
                continue;
            }
            let Some(schema) = introspector.introspect_schema(&instance, &name).await? else {
                continue;
            };
            let schema_path = base_dir.path.join(&name);
            fs::create_dir_all(&schema_path).map_err(|e| {
                anyhow!(ExitValue::new(
                    ExitCode::CantCreate,
                    format!("Unable to create {}: {}", schema_path.display(), e),
                ))
            })?;
            let mut option_file = OptionFile::new(schema_path.join(OPTION_FILE));
            option_file.set_value("", "schema", &name)?;
            option_file.write()?;
            for table in &schema.tables {
                let path = schema_path.join(format!("{}.sql", table.name));
                fs::write(
                    &path,
                    format!("{}\n", table.create_statement_text(include_auto_inc)),
                )?;
                created += 1;
            }
            info!(dir = %schema_path.display(), "Created dir for new schema");
        }
        Ok(created)
    }
}
