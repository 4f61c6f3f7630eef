// DDL文ビルダー
//
// 1つのTableDiffから実行可能なDDL文を構築します。直接SQLとして実行するか、
// ラッパーコマンド経由のシェルアウトになるかはオプションで決まります。
//
// エラーで早期returnしない点が特徴です。構築中のエラーは最初の1件を
// set_errで記録し、構築自体は最後まで進めます。diffコマンドが全ターゲットの
// 問題を1回の実行でまとめて表示できるようにするためです。errが設定された
// 文は決して実行されず、dry-run出力では /* ... */ でコメントアウトされます。

use std::collections::HashMap;

use anyhow::anyhow;
use tracing::debug;

use tavola_core::core::error::DiffError;
use tavola_core::core::schema_diff::{StatementModifiers, TableDiff};

use crate::adapters::instance::Instance;
use crate::adapters::shellout::ShellOut;
use crate::services::target::Target;

/// 実行を待つDDL文
#[derive(Debug)]
pub struct DdlStatement {
    /// 構築中または実行時に発生した最初のエラー
    pub err: Option<anyhow::Error>,

    stmt: String,
    shell_out: Option<ShellOut>,
    instance: Instance,
    schema_name: String,
}

impl DdlStatement {
    /// TableDiffからDDL文を構築
    ///
    /// 修飾子の結果出力すべき文がない場合（no-op）はNoneを返します。
    /// 構築エラーの場合もNoneにはならず、errを持つDdlStatementを返します。
    pub async fn build(
        diff: &TableDiff,
        mut mods: StatementModifiers,
        target: &Target,
    ) -> Option<DdlStatement> {
        let mut ddl = DdlStatement {
            err: None,
            stmt: String::new(),
            shell_out: None,
            instance: target.instance.clone(),
            schema_name: target.schema_name.clone(),
        };
        let config = &target.dir.config;

        // 対象テーブルのサイズを取得。CREATEでは常に0
        let table_name = diff.table_name().to_string();
        let table_size = match diff {
            TableDiff::AlterTable { .. } | TableDiff::DropTable { .. } => {
                match target
                    .instance
                    .table_size(&target.schema_name, &table_name)
                    .await
                {
                    Ok(size) => size,
                    Err(e) => {
                        ddl.set_err(anyhow!(e));
                        0
                    }
                }
            }
            _ => 0,
        };

        // safe-below-size: 指定サイズ未満のテーブルには破壊的変更を許可する
        match config.get_bytes("safe-below-size") {
            Ok(safe_below_size) => {
                if table_size < safe_below_size {
                    mods.allow_unsafe = true;
                    debug!(
                        table = %table_name,
                        size = table_size,
                        threshold = safe_below_size,
                        "Allowing unsafe operations for table below safe-below-size"
                    );
                }
            }
            Err(e) => ddl.set_err(anyhow!(e)),
        }

        // ラッパー選択。alter-wrapperはALTERのみ、かつmin-sizeに達した場合
        let mut wrapper = config.get("ddl-wrapper").to_string();
        if matches!(diff, TableDiff::AlterTable { .. }) && config.changed("alter-wrapper") {
            match config.get_bytes("alter-wrapper-min-size") {
                Ok(min_size) => {
                    if table_size >= min_size {
                        wrapper = config.get("alter-wrapper").to_string();
                        if min_size > 0 {
                            debug!(
                                table = %table_name,
                                size = table_size,
                                min_size,
                                "Using alter-wrapper for table"
                            );
                            // 外部OSCツールはALGORITHM/LOCKを自前で管理する
                            if !mods.algorithm_clause.is_empty() || !mods.lock_clause.is_empty() {
                                debug!("Ignoring alter-algorithm and alter-lock for alter-wrapper");
                                mods.algorithm_clause = String::new();
                                mods.lock_clause = String::new();
                            }
                        }
                    } else {
                        debug!(
                            table = %table_name,
                            size = table_size,
                            min_size,
                            "Skipping alter-wrapper for table below alter-wrapper-min-size"
                        );
                    }
                }
                Err(e) => ddl.set_err(anyhow!(e)),
            }
        }

        // DDL本文を生成
        match diff.statement(&mods) {
            Ok(Some(stmt)) => ddl.stmt = stmt,
            Ok(None) => {
                // 出すべき文がない（AUTO_INCREMENTのみの差分を無視する設定など）
                if ddl.err.is_none() {
                    return None;
                }
            }
            Err(e) => {
                // 破壊的差分はコメントアウト表示できるよう文面を保持する
                if let DiffError::UnsafeDiff { statement } = &e {
                    ddl.stmt = statement.clone();
                }
                ddl.set_err(anyhow!(e));
            }
        }

        // ラッパー適用
        if !wrapper.is_empty() && !ddl.stmt.is_empty() {
            let mut vars: HashMap<String, String> = HashMap::from([
                ("HOST".to_string(), ddl.instance.host.clone()),
                ("SCHEMA".to_string(), ddl.schema_name.clone()),
                ("DDL".to_string(), ddl.stmt.clone()),
                ("TABLE".to_string(), table_name.clone()),
                ("SIZE".to_string(), table_size.to_string()),
                ("TYPE".to_string(), diff.kind().to_string()),
            ]);
            match &ddl.instance.socket {
                Some(socket) => {
                    vars.insert("SOCKET".to_string(), socket.clone());
                }
                None => {
                    vars.insert("PORT".to_string(), ddl.instance.port.to_string());
                }
            }
            vars.insert("CLAUSES".to_string(), clauses_text(diff, &ddl.stmt));

            match ShellOut::interpolated(&wrapper, &vars) {
                Ok(shell_out) => ddl.shell_out = Some(shell_out),
                Err(e) => ddl.set_err(anyhow!(e)),
            }
        }

        Some(ddl)
    }

    /// シェルアウトで実行されるか
    pub fn is_shell_out(&self) -> bool {
        self.shell_out.is_some()
    }

    /// dry-run表示用の文字列
    ///
    /// 直接SQLは `<stmt>;`、シェルアウトは `\! <command>`。errを持つ文は
    /// /* ... */ でコメントアウトされます。
    pub fn render(&self) -> String {
        let mut text = match &self.shell_out {
            Some(shell_out) => format!("\\! {}", shell_out),
            None if self.stmt.is_empty() => String::new(),
            None => format!("{};", self.stmt),
        };
        if let Some(err) = &self.err {
            if text.is_empty() {
                text = format!("/* {} */", err);
            } else {
                text = format!("/* {} */", text);
            }
        }
        text
    }

    /// DDLを実行
    ///
    /// errが設定されている文は実行を拒否してそのエラーを返します。
    pub async fn execute(&mut self, timeout_secs: u64) -> anyhow::Result<()> {
        if let Some(err) = &self.err {
            return Err(anyhow!("{}", err));
        }
        let result = match &self.shell_out {
            Some(shell_out) => shell_out.run(timeout_secs).await.map_err(|e| anyhow!(e)),
            None => {
                if self.stmt.is_empty() {
                    return Err(anyhow!("Attempted to execute empty DDL statement"));
                }
                self.instance
                    .execute_ddl(&self.schema_name, &self.stmt, timeout_secs)
                    .await
            }
        };
        if let Err(e) = result {
            let message = e.to_string();
            self.set_err(e);
            return Err(anyhow!("{}", message));
        }
        Ok(())
    }

    /// 構築エラーが破壊的変更の拒否によるものか
    pub fn is_unsafe_denied(&self) -> bool {
        self.err
            .as_ref()
            .and_then(|e| e.downcast_ref::<DiffError>())
            .is_some_and(|e| matches!(e, DiffError::UnsafeDiff { .. }))
    }

    /// 構築エラーがunsupportedテーブルのALTERによるものか
    pub fn is_unsupported(&self) -> bool {
        self.err
            .as_ref()
            .and_then(|e| e.downcast_ref::<DiffError>())
            .is_some_and(|e| matches!(e, DiffError::UnsupportedAlter { .. }))
    }

    /// 最初のエラーのみを記録する
    ///
    /// 構築中のエラーは早期returnせず、この規約で文に吸収されます。
    fn set_err(&mut self, err: anyhow::Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

/// {CLAUSES} 変数: DDL本文から先頭のCREATE/ALTER TABLE句を除いたもの
fn clauses_text(diff: &TableDiff, stmt: &str) -> String {
    match diff {
        TableDiff::AlterTable { table, .. } => {
            let prefix = format!("{} ", table.alter_statement());
            stmt.strip_prefix(&prefix).unwrap_or(stmt).to_string()
        }
        TableDiff::CreateTable { table } => {
            let prefix = format!(
                "CREATE TABLE {} ",
                tavola_core::core::schema::escape_identifier(&table.name)
            );
            stmt.strip_prefix(&prefix).unwrap_or(stmt).to_string()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use tavola_core::core::schema::{Column, Schema, Table};
    use tempfile::TempDir;

    use crate::services::dir::Dir;

    fn make_target(tmp: &TempDir, cli: &[(&str, &str)]) -> Target {
        std::fs::write(tmp.path().join(".tavola"), "host=db.example.com\nschema=product\n")
            .unwrap();
        let cli: StdHashMap<String, String> = cli
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let dir = Dir::new(tmp.path(), "production", cli).unwrap();
        Target {
            instance: Instance::new("db.example.com", 3306, None, "root", ""),
            schema_name: "product".to_string(),
            schema_from_dir: Schema::new("product", "utf8mb4", "utf8mb4_general_ci"),
            schema_from_instance: None,
            dir,
            bad_files: Vec::new(),
        }
    }

    fn create_diff() -> TableDiff {
        let mut table = Table::new("widgets");
        table.char_set = "utf8mb4".to_string();
        table.add_column(Column::new("id", "int(11)", false));
        TableDiff::CreateTable { table }
    }

    #[tokio::test]
    async fn test_build_direct_create() {
        let tmp = TempDir::new().unwrap();
        let target = make_target(&tmp, &[]);
        let ddl = DdlStatement::build(&create_diff(), StatementModifiers::default(), &target)
            .await
            .unwrap();
        assert!(ddl.err.is_none());
        assert!(!ddl.is_shell_out());
        let rendered = ddl.render();
        assert!(rendered.starts_with("CREATE TABLE `widgets`"), "{}", rendered);
        assert!(rendered.ends_with(';'));
    }

    #[tokio::test]
    async fn test_build_with_ddl_wrapper() {
        let tmp = TempDir::new().unwrap();
        let target = make_target(
            &tmp,
            &[("ddl-wrapper", "deploy --host={HOST} --port={PORT} -d{SCHEMA} '{DDL}'")],
        );
        let ddl = DdlStatement::build(&create_diff(), StatementModifiers::default(), &target)
            .await
            .unwrap();
        assert!(ddl.err.is_none());
        assert!(ddl.is_shell_out());
        let rendered = ddl.render();
        assert!(rendered.starts_with("\\! deploy --host=db.example.com --port=3306 -dproduct"));
    }

    #[tokio::test]
    async fn test_wrapper_interpolation_error_is_deferred() {
        let tmp = TempDir::new().unwrap();
        let target = make_target(&tmp, &[("ddl-wrapper", "deploy {NOSUCH}")]);
        let mut ddl =
            DdlStatement::build(&create_diff(), StatementModifiers::default(), &target)
                .await
                .unwrap();
        assert!(ddl.err.is_some());
        // errを持つ文はコメントアウト表示され、実行は拒否される
        assert!(ddl.render().starts_with("/*"));
        assert!(ddl.execute(0).await.is_err());
    }

    #[tokio::test]
    async fn test_wrapper_type_and_clauses_variables() {
        let tmp = TempDir::new().unwrap();
        let target = make_target(&tmp, &[("ddl-wrapper", "log {TYPE}: {CLAUSES}")]);
        let ddl = DdlStatement::build(&create_diff(), StatementModifiers::default(), &target)
            .await
            .unwrap();
        let rendered = ddl.render();
        assert!(rendered.starts_with("\\! log CREATE: ("), "{}", rendered);
    }
}
