// スキーマ差分検出サービス
//
// ファイル側スキーマとインスタンス側スキーマを比較し、順序付きの
// SchemaDiffを生成します。テーブル、カラム、インデックス、テーブル
// オプションの追加・削除・変更を検出します。
//
// 出力順序は決定的です: 削除（インスタンス側の逆順）→ 変更（ファイル側の
// 順）→ 作成（ファイル側の順）。ALTER内のサブ句の順序はtable_comparator
// を参照。

mod column_comparator;
mod index_comparator;
mod table_comparator;

use tavola_core::core::schema::Schema;
use tavola_core::core::schema_diff::{SchemaCharSetChange, SchemaDiff, TableDiff};

/// スキーマ差分検出サービス
#[derive(Debug, Clone, Default)]
pub struct SchemaDiffDetector;

impl SchemaDiffDetector {
    /// 新しいSchemaDiffDetectorを作成
    pub fn new() -> Self {
        Self
    }

    /// スキーマ差分を検出
    ///
    /// # Arguments
    ///
    /// * `from_instance` - インスタンス側のスキーマ（存在しない場合None）
    /// * `from_dir` - ファイル側のスキーマ
    ///
    /// インスタンス側がNoneの場合、呼び出し側がCREATE DATABASEを発行する
    /// 前提で、全テーブルがCreateTableになります。スキーマの削除は決して
    /// 生成しません。
    pub fn detect_diff(&self, from_instance: Option<&Schema>, from_dir: &Schema) -> SchemaDiff {
        let mut diff = SchemaDiff::new();

        let Some(instance_schema) = from_instance else {
            for table in &from_dir.tables {
                diff.table_diffs.push(TableDiff::CreateTable {
                    table: table.clone(),
                });
            }
            return diff;
        };

        // スキーマ単位の文字セット・照合順序
        if instance_schema.char_set != from_dir.char_set
            || (!instance_schema.collation.is_empty()
                && !from_dir.collation.is_empty()
                && instance_schema.collation != from_dir.collation)
        {
            diff.char_set_change = Some(SchemaCharSetChange {
                char_set: from_dir.char_set.clone(),
                collation: from_dir.collation.clone(),
            });
        }

        // 削除: インスタンス側の挿入順の逆
        for table in instance_schema.tables.iter().rev() {
            if !from_dir.has_table(&table.name) {
                diff.table_diffs.push(TableDiff::DropTable {
                    table: table.clone(),
                });
            }
        }

        // 変更: ファイル側の挿入順
        for dir_table in &from_dir.tables {
            if let Some(instance_table) = instance_schema.get_table(&dir_table.name) {
                if let Some(alter) =
                    table_comparator::compare_tables(instance_table, dir_table)
                {
                    diff.table_diffs.push(alter);
                }
            }
        }

        // 作成: ファイル側の挿入順
        for table in &from_dir.tables {
            if !instance_schema.has_table(&table.name) {
                diff.table_diffs.push(TableDiff::CreateTable {
                    table: table.clone(),
                });
            }
        }

        diff
    }
}
