// インデックス比較
//
// インデックスは名前で対応付け、定義が一致しないものは削除+再追加として
// 扱います。PRIMARY KEYも同じ枠組みで比較されます（削除は破壊的判定）。

use tavola_core::core::schema::Table;
use tavola_core::core::schema_diff::TableAlterClause;

/// インデックス関連のALTER句を生成
///
/// 返り値は (DropIndex句, AddIndex句)。
pub(super) fn compare_indexes(
    old: &Table,
    new: &Table,
) -> (Vec<TableAlterClause>, Vec<TableAlterClause>) {
    let mut drops = Vec::new();
    let mut adds = Vec::new();

    for index in &old.indexes {
        match new.get_index(&index.name) {
            Some(new_index) if new_index.definition() == index.definition() => {}
            _ => drops.push(TableAlterClause::DropIndex {
                index: index.clone(),
            }),
        }
    }

    for index in &new.indexes {
        match old.get_index(&index.name) {
            Some(old_index) if old_index.definition() == index.definition() => {}
            _ => adds.push(TableAlterClause::AddIndex {
                index: index.clone(),
            }),
        }
    }

    (drops, adds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavola_core::core::schema::{Column, Index, IndexColumn};

    fn table_with_index(index: Option<Index>) -> Table {
        let mut table = Table::new("t");
        table.add_column(Column::new("a", "int(11)", true));
        table.add_column(Column::new("b", "int(11)", true));
        if let Some(index) = index {
            table.add_index(index);
        }
        table
    }

    #[test]
    fn test_identical_indexes_no_diff() {
        let idx = Index::new("a_idx", vec![IndexColumn::new("a")], false);
        let old = table_with_index(Some(idx.clone()));
        let new = table_with_index(Some(idx));
        let (drops, adds) = compare_indexes(&old, &new);
        assert!(drops.is_empty() && adds.is_empty());
    }

    #[test]
    fn test_changed_index_is_drop_and_add() {
        let old = table_with_index(Some(Index::new(
            "a_idx",
            vec![IndexColumn::new("a")],
            false,
        )));
        let new = table_with_index(Some(Index::new(
            "a_idx",
            vec![IndexColumn::new("a"), IndexColumn::new("b")],
            false,
        )));
        let (drops, adds) = compare_indexes(&old, &new);
        assert_eq!(drops.len(), 1);
        assert_eq!(adds.len(), 1);
    }

    #[test]
    fn test_unique_flip_is_drop_and_add() {
        let old = table_with_index(Some(Index::new(
            "a_idx",
            vec![IndexColumn::new("a")],
            false,
        )));
        let new = table_with_index(Some(Index::new(
            "a_idx",
            vec![IndexColumn::new("a")],
            true,
        )));
        let (drops, adds) = compare_indexes(&old, &new);
        assert_eq!(drops.len(), 1);
        assert_eq!(adds.len(), 1);
    }

    #[test]
    fn test_primary_key_change() {
        let old = table_with_index(Some(Index::primary(vec![IndexColumn::new("a")])));
        let new = table_with_index(Some(Index::primary(vec![IndexColumn::new("b")])));
        let (drops, adds) = compare_indexes(&old, &new);
        assert_eq!(drops.len(), 1);
        assert!(drops[0].is_unsafe());
        assert_eq!(adds.len(), 1);
    }
}
