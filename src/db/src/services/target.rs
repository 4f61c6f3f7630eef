// ターゲット列挙器
//
// ルートDirから (インスタンス × スキーマ) ごとの作業単位を展開します。
// 列挙はまず計画（TargetPlan）を作り、produce() 時に初めてファイル解析と
// イントロスペクションを行います（遅延I/O）。produce() は再実行可能で、
// 再実行時には再度イントロスペクションします。

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use tracing::debug;

use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::schema::Schema;

use crate::adapters::instance::Instance;
use crate::adapters::introspector::Introspector;
use crate::services::dir::Dir;
use crate::services::sql_file::SqlFile;

/// 1つの作業単位
///
/// DirとInstanceへの参照を持ちますが、逆方向の参照はありません。
/// 生成後は不変として扱います。
#[derive(Debug, Clone)]
pub struct Target {
    /// 対象インスタンス
    pub instance: Instance,
    /// 対象スキーマ名
    pub schema_name: String,
    /// ファイルシステム側のスキーマ
    pub schema_from_dir: Schema,
    /// インスタンス側のスキーマ（存在しない場合None）
    pub schema_from_instance: Option<Schema>,
    /// 由来のディレクトリ
    pub dir: Dir,
    /// 単一のCREATE TABLE文でなかったファイル
    pub bad_files: Vec<SqlFile>,
}

/// produce() 前の作業単位の計画
#[derive(Debug, Clone)]
pub struct TargetPlan {
    /// 対象インスタンス
    pub instance: Instance,
    /// 対象スキーマ名
    pub schema_name: String,
    /// 由来のディレクトリ
    pub dir: Dir,
}

impl TargetPlan {
    /// 計画を実体化する
    ///
    /// ファイル解析とイントロスペクションはこの時点で行われます。
    pub async fn produce(&self) -> Result<Target> {
        let introspector = Introspector::new();

        // インスタンス側
        let mut schema_from_instance = introspector
            .introspect_schema(&self.instance, &self.schema_name)
            .await?;

        // ファイル側: スキーマのデフォルト文字セットは設定、なければサーバー既定
        let mut char_set = self.dir.config.get("default-character-set").to_string();
        let mut collation = self.dir.config.get("default-collation").to_string();
        if char_set.is_empty() {
            let (server_cs, server_col) =
                self.instance.default_char_set_and_collation().await?;
            char_set = server_cs;
            if collation.is_empty() {
                collation = server_col;
            }
        }

        let mut schema_from_dir = Schema::new(&self.schema_name, char_set, collation);
        let mut bad_files = Vec::new();
        for file in self.dir.sql_files()? {
            if file.error.is_some() {
                bad_files.push(file);
                continue;
            }
            let mut table = file.parse().map_err(|e| anyhow!("{}: {}", file.file_name, e))?;
            if table.char_set.is_empty() {
                table.char_set = schema_from_dir.char_set.clone();
                if table.collation.is_empty() {
                    table.collation = schema_from_dir.collation.clone();
                }
            }
            schema_from_dir.add_table(table);
        }

        // ignore-table は両側に適用する
        if let Some(re) = self
            .dir
            .config
            .get_regex("ignore-table")
            .map_err(|e| anyhow!(ExitValue::new(e.exit_code(), e.to_string())))?
        {
            schema_from_dir.retain_tables(|t| !re.is_match(&t.name));
            if let Some(schema) = schema_from_instance.as_mut() {
                schema.retain_tables(|t| !re.is_match(&t.name));
            }
        }

        Ok(Target {
            instance: self.instance.clone(),
            schema_name: self.schema_name.clone(),
            schema_from_dir,
            schema_from_instance,
            dir: self.dir.clone(),
            bad_files,
        })
    }
}

/// ルートDirから作業単位を展開する
#[derive(Debug, Clone, Default)]
pub struct TargetEnumerator;

impl TargetEnumerator {
    /// 新しいTargetEnumeratorを作成
    pub fn new() -> Self {
        Self
    }

    /// スキーマレベルのディレクトリを再帰的に収集
    ///
    /// スキーマを定義するDirが葉になります。それ以外はサブディレクトリを辿ります。
    pub fn schema_dirs(&self, root: &Dir) -> Result<Vec<Dir>> {
        let mut result = Vec::new();
        self.collect_schema_dirs(root, &mut result)?;
        Ok(result)
    }

    fn collect_schema_dirs(&self, dir: &Dir, result: &mut Vec<Dir>) -> Result<()> {
        if dir.is_schema_level()? {
            result.push(dir.clone());
            return Ok(());
        }
        for subdir in dir.subdirs()? {
            self.collect_schema_dirs(&subdir, result)?;
        }
        Ok(())
    }

    /// 計画のリストを作成
    ///
    /// 葉ディレクトリ × インスタンス × スキーマ名 ごとに1計画。同一の
    /// (インスタンス, スキーマ) を複数のディレクトリが対象にする構成は
    /// BadConfigとして拒否します。
    pub async fn enumerate(&self, root: &Dir) -> Result<Vec<TargetPlan>> {
        let mut plans = Vec::new();
        let mut seen: HashSet<(String, String, String)> = HashSet::new();

        for dir in self.schema_dirs(root)? {
            let instances = dir.instances().await?;
            if instances.is_empty() {
                debug!(dir = %dir, "No instances defined; skipping");
                continue;
            }
            for instance in instances {
                for schema_name in dir.schema_names(&instance).await? {
                    let key = (
                        instance.host.clone(),
                        instance
                            .socket
                            .clone()
                            .unwrap_or_else(|| instance.port.to_string()),
                        schema_name.clone(),
                    );
                    if !seen.insert(key) {
                        return Err(anyhow!(ExitValue::new(
                            ExitCode::BadConfig,
                            format!(
                                "Multiple directories target schema {} on {}; conflicting definitions are not permitted",
                                schema_name, instance
                            ),
                        )));
                    }
                    plans.push(TargetPlan {
                        instance: instance.clone(),
                        schema_name,
                        dir: dir.clone(),
                    });
                }
            }
        }

        Ok(plans)
    }
}
