// テーブル比較
//
// 1テーブルのALTER句を組み立てます。サブ句は決定的な順序で並びます:
// 1. カラム変更を妨げるインデックスの削除
// 2. カラム削除
// 3. カラム変更（リネーム・型変更・並び替え）
// 4. カラム追加
// 5. インデックス追加
// 6. テーブルオプション変更
// 7. AUTO_INCREMENT変更（常に最後）

use tavola_core::core::schema::Table;
use tavola_core::core::schema_diff::{TableAlterClause, TableDiff};

use super::column_comparator::compare_columns;
use super::index_comparator::compare_indexes;

/// 2つのテーブル定義を比較し、差分があればAlterTableを返す
pub(super) fn compare_tables(old: &Table, new: &Table) -> Option<TableDiff> {
    // 正準形が一致するなら差分なし（AUTO_INCREMENT値は別扱い）
    if old.generated_create_statement(false) == new.generated_create_statement(false)
        && auto_increment_clause(old, new).is_none()
    {
        return None;
    }

    let mut clauses: Vec<TableAlterClause> = Vec::new();

    let (index_drops, index_adds) = compare_indexes(old, new);
    let (column_drops, column_modifies, column_adds) = compare_columns(old, new);

    clauses.extend(index_drops);
    clauses.extend(column_drops);
    clauses.extend(column_modifies);
    clauses.extend(column_adds);
    clauses.extend(index_adds);
    clauses.extend(option_clauses(old, new));
    clauses.extend(auto_increment_clause(old, new));

    if clauses.is_empty() {
        return None;
    }

    Some(TableDiff::AlterTable {
        table: new.clone(),
        clauses,
        supported: old.supported && new.supported,
    })
}

/// テーブルオプションの差分句を生成
fn option_clauses(old: &Table, new: &Table) -> Vec<TableAlterClause> {
    let mut clauses = Vec::new();

    if !old.engine.eq_ignore_ascii_case(&new.engine) {
        clauses.push(TableAlterClause::ChangeEngine {
            engine: new.engine.clone(),
        });
    }

    let charset_differs = old.char_set != new.char_set;
    let collation_differs = !old.collation.is_empty()
        && !new.collation.is_empty()
        && old.collation != new.collation;
    if charset_differs || collation_differs {
        let collation = if new.collation.is_empty() {
            // ファイル側が照合順序を明示しない場合は文字セットの既定に任せる
            String::new()
        } else {
            new.collation.clone()
        };
        clauses.push(TableAlterClause::ChangeCharSet {
            char_set: new.char_set.clone(),
            collation,
        });
    }

    if old.row_format != new.row_format {
        clauses.push(TableAlterClause::ChangeRowFormat {
            row_format: new
                .row_format
                .clone()
                .unwrap_or_else(|| "DEFAULT".to_string()),
        });
    }

    if old.comment != new.comment {
        clauses.push(TableAlterClause::ChangeComment {
            comment: new.comment.clone().unwrap_or_default(),
        });
    }

    if old.create_options != new.create_options {
        if let Some(options) = &new.create_options {
            clauses.push(TableAlterClause::ChangeCreateOptions {
                options: options.clone(),
            });
        }
    }

    clauses
}

/// AUTO_INCREMENT差分の句を生成（値が異なる場合のみ）
///
/// 最終的に出力するかどうかはStatementModifiersが決めます。
fn auto_increment_clause(old: &Table, new: &Table) -> Option<TableAlterClause> {
    let new_value = new.auto_increment?;
    if old.auto_increment == Some(new_value) {
        return None;
    }
    Some(TableAlterClause::ChangeAutoIncrement {
        new_value,
        instance_value: old.auto_increment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavola_core::core::schema::{Column, ColumnDefault};

    fn base_table() -> Table {
        let mut table = Table::new("t");
        table.char_set = "utf8mb4".to_string();
        table.collation = "utf8mb4_general_ci".to_string();
        let mut col = Column::new("id", "int(11)", true);
        col.default = ColumnDefault::Null;
        table.add_column(col);
        table
    }

    #[test]
    fn test_identical_tables_no_diff() {
        assert!(compare_tables(&base_table(), &base_table()).is_none());
    }

    #[test]
    fn test_engine_change() {
        let old = base_table();
        let mut new = base_table();
        new.engine = "MyISAM".to_string();
        let Some(TableDiff::AlterTable { clauses, .. }) = compare_tables(&old, &new) else {
            panic!("expected AlterTable");
        };
        assert!(matches!(
            clauses[0],
            TableAlterClause::ChangeEngine { ref engine } if engine == "MyISAM"
        ));
    }

    #[test]
    fn test_comment_change_and_removal() {
        let mut old = base_table();
        old.comment = Some("legacy".to_string());
        let new = base_table();
        let Some(TableDiff::AlterTable { clauses, .. }) = compare_tables(&old, &new) else {
            panic!("expected AlterTable");
        };
        assert!(matches!(
            clauses[0],
            TableAlterClause::ChangeComment { ref comment } if comment.is_empty()
        ));
    }

    #[test]
    fn test_charset_change() {
        let mut old = base_table();
        old.char_set = "latin1".to_string();
        old.collation = "latin1_swedish_ci".to_string();
        let new = base_table();
        let Some(TableDiff::AlterTable { clauses, .. }) = compare_tables(&old, &new) else {
            panic!("expected AlterTable");
        };
        assert!(matches!(clauses[0], TableAlterClause::ChangeCharSet { .. }));
    }

    #[test]
    fn test_row_format_removal_renders_default() {
        let mut old = base_table();
        old.row_format = Some("COMPRESSED".to_string());
        let new = base_table();
        let Some(TableDiff::AlterTable { clauses, .. }) = compare_tables(&old, &new) else {
            panic!("expected AlterTable");
        };
        assert!(matches!(
            clauses[0],
            TableAlterClause::ChangeRowFormat { ref row_format } if row_format == "DEFAULT"
        ));
    }
}
