// カラム比較
//
// 2テーブル間のカラムの削除・変更・追加を検出します。並び替えの検出は
// 旧定義での位置が単調増加になっているかで判定し、順序から外れたカラムに
// ターゲット側の並びで解決したAFTER/FIRSTアンカーを付けます。

use tavola_core::core::schema::{Column, Table};
use tavola_core::core::schema_diff::{ColumnPosition, TableAlterClause};

/// カラム関連のALTER句を生成
///
/// 返り値は (DropColumn句, ModifyColumn句, AddColumn句) の3グループ。
pub(super) fn compare_columns(
    old: &Table,
    new: &Table,
) -> (
    Vec<TableAlterClause>,
    Vec<TableAlterClause>,
    Vec<TableAlterClause>,
) {
    let mut drops = Vec::new();
    let mut modifies = Vec::new();
    let mut adds = Vec::new();

    // 削除: 旧側にのみ存在
    for column in &old.columns {
        if new.get_column(&column.name).is_none() {
            drops.push(TableAlterClause::DropColumn {
                column: column.clone(),
            });
        }
    }

    // 変更・並び替え: 両側に存在するカラムを新側の順で走査し、
    // 旧側での位置が後退したものを移動とみなす
    let mut max_old_position: Option<usize> = None;
    let mut previous_common: Option<String> = None;
    for (new_idx, new_column) in new.columns.iter().enumerate() {
        let Some(old_column) = old.get_column(&new_column.name) else {
            continue;
        };
        let old_position = old.column_position(&new_column.name).unwrap();

        let moved = match max_old_position {
            Some(max) => old_position < max,
            None => false,
        };
        if !moved {
            max_old_position = Some(old_position);
        }

        let definition_changed = old_column.definition() != new_column.definition();
        if definition_changed || moved {
            let position = moved.then(|| anchor_for(new_idx, previous_common.as_deref()));
            modifies.push(TableAlterClause::ModifyColumn {
                old: old_column.clone(),
                new: new_column.clone(),
                position,
            });
        }
        previous_common = Some(new_column.name.clone());
    }

    // 追加: 新側にのみ存在。アンカーは新側の並びで直前のカラム
    let mut previous: Option<&Column> = None;
    for (idx, column) in new.columns.iter().enumerate() {
        if old.get_column(&column.name).is_none() {
            adds.push(TableAlterClause::AddColumn {
                column: column.clone(),
                position: Some(anchor_for(idx, previous.map(|c| c.name.as_str()))),
            });
        }
        previous = Some(column);
    }

    (drops, modifies, adds)
}

/// ターゲット側の位置からアンカーを決める
fn anchor_for(index: usize, previous: Option<&str>) -> ColumnPosition {
    if index == 0 {
        ColumnPosition::First
    } else {
        match previous {
            Some(name) => ColumnPosition::After(name.to_string()),
            None => ColumnPosition::First,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavola_core::core::schema::ColumnDefault;

    fn table_with(names: &[&str]) -> Table {
        let mut table = Table::new("t");
        for name in names {
            let mut col = Column::new(*name, "int(11)", true);
            col.default = ColumnDefault::Null;
            table.add_column(col);
        }
        table
    }

    #[test]
    fn test_no_changes() {
        let old = table_with(&["a", "b"]);
        let new = table_with(&["a", "b"]);
        let (drops, modifies, adds) = compare_columns(&old, &new);
        assert!(drops.is_empty() && modifies.is_empty() && adds.is_empty());
    }

    #[test]
    fn test_drop_and_add() {
        let old = table_with(&["a", "gone"]);
        let new = table_with(&["a", "fresh"]);
        let (drops, modifies, adds) = compare_columns(&old, &new);
        assert_eq!(drops.len(), 1);
        assert!(modifies.is_empty());
        assert_eq!(adds.len(), 1);
        let TableAlterClause::AddColumn { position, .. } = &adds[0] else {
            panic!()
        };
        assert_eq!(*position, Some(ColumnPosition::After("a".to_string())));
    }

    #[test]
    fn test_add_at_first_position() {
        let old = table_with(&["b"]);
        let new = table_with(&["a", "b"]);
        let (_, _, adds) = compare_columns(&old, &new);
        let TableAlterClause::AddColumn { position, .. } = &adds[0] else {
            panic!()
        };
        assert_eq!(*position, Some(ColumnPosition::First));
    }

    #[test]
    fn test_type_change_detected() {
        let old = table_with(&["a"]);
        let mut new = Table::new("t");
        let mut col = Column::new("a", "bigint(20)", true);
        col.default = ColumnDefault::Null;
        new.add_column(col);

        let (_, modifies, _) = compare_columns(&old, &new);
        assert_eq!(modifies.len(), 1);
        let TableAlterClause::ModifyColumn { position, .. } = &modifies[0] else {
            panic!()
        };
        // 型変更のみなら位置アンカーは付かない
        assert!(position.is_none());
    }

    #[test]
    fn test_reorder_detected_with_anchor() {
        // 旧: a, b, c → 新: b, c, a （aが末尾へ移動）
        let old = table_with(&["a", "b", "c"]);
        let new = table_with(&["b", "c", "a"]);
        let (drops, modifies, adds) = compare_columns(&old, &new);
        assert!(drops.is_empty() && adds.is_empty());
        assert_eq!(modifies.len(), 1);
        let TableAlterClause::ModifyColumn { new: col, position, .. } = &modifies[0] else {
            panic!()
        };
        assert_eq!(col.name, "a");
        assert_eq!(*position, Some(ColumnPosition::After("c".to_string())));
    }

    #[test]
    fn test_move_to_first() {
        let old = table_with(&["a", "b"]);
        let new = table_with(&["b", "a"]);
        let (_, modifies, _) = compare_columns(&old, &new);
        assert_eq!(modifies.len(), 1);
        let TableAlterClause::ModifyColumn { new: col, position, .. } = &modifies[0] else {
            panic!()
        };
        assert_eq!(col.name, "a");
        assert_eq!(*position, Some(ColumnPosition::After("b".to_string())));
    }
}
