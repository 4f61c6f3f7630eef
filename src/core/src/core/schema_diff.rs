// スキーマ差分型
//
// 2つのスキーマ間の差分を型付きで表現します。TableDiff と TableAlterClause は
// タグ付きユニオンで、各バリアントはフォーマッタ・実行器が必要とするデータのみを
// 保持します。差分からのSQL生成は StatementModifiers の影響を受けます。

use crate::core::error::DiffError;
use crate::core::schema::{escape_identifier, escape_string, Column, Index, Table};
use regex::Regex;
use std::fmt::Write as _;

/// AUTO_INCREMENT差分の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextAutoInc {
    /// 差分を出さない（pull / lint のデフォルト）
    #[default]
    Ignore,
    /// ファイル側の値がインスタンス側を上回る場合のみ（diff / push のデフォルト）
    IfIncreased,
    /// インスタンス側が既に初期値以外の場合のみ
    IfAlready,
    /// 常に出す
    Always,
}

/// DDL生成を調整する修飾子
///
/// 差分そのものは不変で、どうSQLに落とすかだけをこの値オブジェクトが決めます。
#[derive(Debug, Clone, Default)]
pub struct StatementModifiers {
    /// 破壊的変更を許可するか
    pub allow_unsafe: bool,
    /// AUTO_INCREMENT差分の扱い
    pub next_auto_inc: NextAutoInc,
    /// ALTER文に付与するALGORITHM句（空なら付与しない）
    pub algorithm_clause: String,
    /// ALTER文に付与するLOCK句（空なら付与しない）
    pub lock_clause: String,
    /// 一致するテーブル名を差分から除外する正規表現
    pub ignore_table: Option<Regex>,
}

/// カラムの挿入位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnPosition {
    /// 先頭
    First,
    /// 指定カラムの直後
    After(String),
}

impl ColumnPosition {
    fn suffix(&self) -> String {
        match self {
            ColumnPosition::First => " FIRST".to_string(),
            ColumnPosition::After(col) => format!(" AFTER {}", escape_identifier(col)),
        }
    }
}

/// ALTER TABLEのサブ句
///
/// 列挙順は生成時の決定的な出力順に対応します: インデックス削除 → カラム削除 →
/// カラム変更 → カラム追加 → インデックス追加 → テーブルオプション →
/// AUTO_INCREMENT。
#[derive(Debug, Clone)]
pub enum TableAlterClause {
    /// インデックス削除
    DropIndex { index: Index },
    /// カラム削除
    DropColumn { column: Column },
    /// カラム変更（リネーム・型変更・並び替え）
    ModifyColumn {
        old: Column,
        new: Column,
        position: Option<ColumnPosition>,
    },
    /// カラム追加
    AddColumn {
        column: Column,
        position: Option<ColumnPosition>,
    },
    /// インデックス追加
    AddIndex { index: Index },
    /// テーブルの文字セット・照合順序変更
    ChangeCharSet { char_set: String, collation: String },
    /// ストレージエンジン変更
    ChangeEngine { engine: String },
    /// ROW_FORMAT変更
    ChangeRowFormat { row_format: String },
    /// テーブルコメント変更
    ChangeComment { comment: String },
    /// その他のテーブルオプション変更
    ChangeCreateOptions { options: String },
    /// AUTO_INCREMENT値の変更
    ChangeAutoIncrement {
        new_value: u64,
        instance_value: Option<u64>,
    },
}

impl TableAlterClause {
    /// この句が破壊的（データ損失の可能性あり）か
    ///
    /// 判定は句の種類ごとに固定: カラム削除、PRIMARY KEY削除、
    /// 縮小方向の型変更、損失し得る文字セット変更が該当します。
    pub fn is_unsafe(&self) -> bool {
        match self {
            TableAlterClause::DropColumn { .. } => true,
            TableAlterClause::DropIndex { index } => index.primary_key,
            TableAlterClause::ModifyColumn { old, new, .. } => {
                !type_change_is_safe(&old.type_def, &new.type_def)
                    || !charset_change_is_safe(
                        old.char_set.as_deref(),
                        new.char_set.as_deref(),
                    )
            }
            TableAlterClause::ChangeCharSet { .. } => false,
            _ => false,
        }
    }

    /// SQL句テキストを生成
    ///
    /// AUTO_INCREMENT句のみ修飾子に応じてNoneになり得ます。
    pub fn clause_text(&self, mods: &StatementModifiers) -> Option<String> {
        match self {
            TableAlterClause::DropIndex { index } => Some(if index.primary_key {
                "DROP PRIMARY KEY".to_string()
            } else {
                format!("DROP KEY {}", escape_identifier(&index.name))
            }),
            TableAlterClause::DropColumn { column } => {
                Some(format!("DROP COLUMN {}", escape_identifier(&column.name)))
            }
            TableAlterClause::ModifyColumn { old, new, position } => {
                let suffix = position.as_ref().map(|p| p.suffix()).unwrap_or_default();
                if old.name != new.name {
                    Some(format!(
                        "CHANGE COLUMN {} {}{}",
                        escape_identifier(&old.name),
                        new.definition(),
                        suffix
                    ))
                } else {
                    Some(format!("MODIFY COLUMN {}{}", new.definition(), suffix))
                }
            }
            TableAlterClause::AddColumn { column, position } => {
                let suffix = position.as_ref().map(|p| p.suffix()).unwrap_or_default();
                Some(format!("ADD COLUMN {}{}", column.definition(), suffix))
            }
            TableAlterClause::AddIndex { index } => Some(index.add_clause()),
            TableAlterClause::ChangeCharSet { char_set, collation } => Some(format!(
                "DEFAULT CHARACTER SET = {} COLLATE = {}",
                char_set, collation
            )),
            TableAlterClause::ChangeEngine { engine } => Some(format!("ENGINE={}", engine)),
            TableAlterClause::ChangeRowFormat { row_format } => {
                Some(format!("ROW_FORMAT={}", row_format))
            }
            TableAlterClause::ChangeComment { comment } => {
                Some(format!("COMMENT='{}'", escape_string(comment)))
            }
            TableAlterClause::ChangeCreateOptions { options } => Some(options.clone()),
            TableAlterClause::ChangeAutoIncrement {
                new_value,
                instance_value,
            } => {
                let include = match mods.next_auto_inc {
                    NextAutoInc::Ignore => false,
                    NextAutoInc::IfIncreased => {
                        instance_value.map_or(true, |current| *new_value > current)
                    }
                    NextAutoInc::IfAlready => instance_value.map_or(false, |current| current > 1),
                    NextAutoInc::Always => true,
                };
                include.then(|| format!("AUTO_INCREMENT = {}", new_value))
            }
        }
    }
}

/// スキーマ単位の文字セット・照合順序変更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCharSetChange {
    pub char_set: String,
    pub collation: String,
}

impl SchemaCharSetChange {
    /// ALTER DATABASE文を生成
    pub fn statement(&self, schema_name: &str) -> String {
        format!(
            "ALTER DATABASE {} CHARACTER SET {} COLLATE {}",
            escape_identifier(schema_name),
            self.char_set,
            self.collation
        )
    }
}

/// テーブル単位の差分
///
/// タグ付きユニオン。RenameTableは予約のみで、検出器が生成することはありません。
#[derive(Debug, Clone)]
pub enum TableDiff {
    /// テーブル作成
    CreateTable { table: Table },
    /// テーブル削除
    DropTable { table: Table },
    /// テーブル変更
    AlterTable {
        table: Table,
        clauses: Vec<TableAlterClause>,
        supported: bool,
    },
    /// テーブルリネーム（予約。生成されない）
    RenameTable { from: String, to: String },
}

impl TableDiff {
    /// 対象テーブル名
    pub fn table_name(&self) -> &str {
        match self {
            TableDiff::CreateTable { table }
            | TableDiff::DropTable { table }
            | TableDiff::AlterTable { table, .. } => &table.name,
            TableDiff::RenameTable { from, .. } => from,
        }
    }

    /// 差分の種類（ラッパー変数 {TYPE} で使用）
    pub fn kind(&self) -> &'static str {
        match self {
            TableDiff::CreateTable { .. } => "CREATE",
            TableDiff::DropTable { .. } => "DROP",
            TableDiff::AlterTable { .. } => "ALTER",
            TableDiff::RenameTable { .. } => "RENAME",
        }
    }

    /// この差分が破壊的か
    pub fn is_unsafe(&self) -> bool {
        match self {
            TableDiff::DropTable { .. } => true,
            TableDiff::AlterTable { clauses, .. } => clauses.iter().any(|c| c.is_unsafe()),
            _ => false,
        }
    }

    /// ALTERを生成できないテーブルの差分か
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TableDiff::AlterTable { supported: false, .. })
    }

    /// 修飾子を適用してDDL文を生成
    ///
    /// `Ok(None)` は出力すべき文がないことを表します（AUTO_INCREMENTのみの
    /// 差分を無視する設定など）。破壊的差分は `allow_unsafe` がない限り
    /// `DiffError::UnsafeDiff` になります。
    pub fn statement(&self, mods: &StatementModifiers) -> Result<Option<String>, DiffError> {
        if let Some(re) = &mods.ignore_table {
            if re.is_match(self.table_name()) {
                return Ok(None);
            }
        }

        match self {
            TableDiff::CreateTable { table } => {
                let include_auto_inc = mods.next_auto_inc != NextAutoInc::Ignore;
                Ok(Some(table.create_statement_text(include_auto_inc)))
            }
            TableDiff::DropTable { table } => {
                let stmt = format!("DROP TABLE {}", escape_identifier(&table.name));
                if !mods.allow_unsafe {
                    return Err(DiffError::UnsafeDiff { statement: stmt });
                }
                Ok(Some(stmt))
            }
            TableDiff::AlterTable {
                table,
                clauses,
                supported,
            } => {
                if !supported {
                    return Err(DiffError::UnsupportedAlter {
                        table: table.name.clone(),
                    });
                }
                let texts: Vec<String> = clauses
                    .iter()
                    .filter_map(|c| c.clause_text(mods))
                    .collect();
                if texts.is_empty() {
                    return Ok(None);
                }

                let mut stmt = format!("{} {}", table.alter_statement(), texts.join(", "));
                if !mods.algorithm_clause.is_empty() {
                    write!(stmt, ", ALGORITHM={}", mods.algorithm_clause).unwrap();
                }
                if !mods.lock_clause.is_empty() {
                    write!(stmt, ", LOCK={}", mods.lock_clause).unwrap();
                }

                // 出力される句に破壊的なものが残っている場合のみ拒否する
                let rendered_unsafe = clauses
                    .iter()
                    .filter(|c| c.clause_text(mods).is_some())
                    .any(|c| c.is_unsafe());
                if rendered_unsafe && !mods.allow_unsafe {
                    return Err(DiffError::UnsafeDiff { statement: stmt });
                }
                Ok(Some(stmt))
            }
            TableDiff::RenameTable { .. } => Err(DiffError::UnsupportedDiffType {
                kind: "RenameTable",
            }),
        }
    }
}

/// スキーマ全体の差分
///
/// テーブル差分は 削除 → 変更 → 作成 の順に整列済み。
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    /// スキーマ単位の文字セット変更
    pub char_set_change: Option<SchemaCharSetChange>,
    /// テーブル差分（出力順）
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// 新しい空の差分を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 差分が空か
    pub fn is_empty(&self) -> bool {
        self.char_set_change.is_none() && self.table_diffs.is_empty()
    }

    /// 人間向けの要約
    pub fn summary(&self) -> String {
        let mut drops = 0;
        let mut alters = 0;
        let mut creates = 0;
        for diff in &self.table_diffs {
            match diff {
                TableDiff::DropTable { .. } => drops += 1,
                TableDiff::AlterTable { .. } => alters += 1,
                TableDiff::CreateTable { .. } => creates += 1,
                TableDiff::RenameTable { .. } => {}
            }
        }
        let mut parts = Vec::new();
        if drops > 0 {
            parts.push(format!("Drop {} tables", drops));
        }
        if alters > 0 {
            parts.push(format!("Alter {} tables", alters));
        }
        if creates > 0 {
            parts.push(format!("Create {} tables", creates));
        }
        if self.char_set_change.is_some() {
            parts.push("Change schema charset".to_string());
        }
        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// 整数型ファミリのサイズ順位
fn int_rank(base: &str) -> Option<u8> {
    match base {
        "tinyint" => Some(1),
        "smallint" => Some(2),
        "mediumint" => Some(3),
        "int" | "integer" => Some(4),
        "bigint" => Some(5),
        _ => None,
    }
}

/// TEXT/BLOBファミリのサイズ順位
fn lob_rank(base: &str) -> Option<u8> {
    match base {
        "tinytext" | "tinyblob" => Some(1),
        "text" | "blob" => Some(2),
        "mediumtext" | "mediumblob" => Some(3),
        "longtext" | "longblob" => Some(4),
        _ => None,
    }
}

/// 型定義テキストを (基本型, 引数リスト, unsigned) に分解
fn split_type(type_def: &str) -> (String, Vec<u32>, bool) {
    let lower = type_def.trim().to_ascii_lowercase();
    let unsigned = lower.contains("unsigned");
    let (base, args) = match lower.split_once('(') {
        Some((base, rest)) => {
            let args = rest
                .split(')')
                .next()
                .unwrap_or("")
                .split(',')
                .filter_map(|a| a.trim().parse::<u32>().ok())
                .collect();
            (base.trim().to_string(), args)
        }
        None => (
            lower.split_whitespace().next().unwrap_or("").to_string(),
            Vec::new(),
        ),
    };
    (base, args, unsigned)
}

/// 型変更が安全（データ損失なし）か
///
/// 同一型、整数ファミリ内の同符号での拡大、VARCHAR/CHAR/VARBINARYの長さ拡大、
/// TEXT/BLOBファミリ内の拡大、DECIMALの精度拡大のみ安全と判定します。
/// それ以外はすべて縮小とみなします。
pub fn type_change_is_safe(old_def: &str, new_def: &str) -> bool {
    if old_def.eq_ignore_ascii_case(new_def) {
        return true;
    }
    let (old_base, old_args, old_unsigned) = split_type(old_def);
    let (new_base, new_args, new_unsigned) = split_type(new_def);

    if let (Some(old_rank), Some(new_rank)) = (int_rank(&old_base), int_rank(&new_base)) {
        // 表示幅の違いは無視し、符号が一致して順位が下がらなければ安全
        return old_unsigned == new_unsigned && new_rank >= old_rank;
    }

    if old_base == new_base
        && matches!(old_base.as_str(), "varchar" | "char" | "varbinary")
    {
        return new_args.first() >= old_args.first();
    }

    if let (Some(old_rank), Some(new_rank)) = (lob_rank(&old_base), lob_rank(&new_base)) {
        // text→blob のような系統間の変更は文字セット変換を伴うため除外
        let old_is_text = old_base.ends_with("text");
        let new_is_text = new_base.ends_with("text");
        return old_is_text == new_is_text && new_rank >= old_rank;
    }

    if old_base == "decimal" && new_base == "decimal" {
        let old_p = old_args.first().copied().unwrap_or(10);
        let old_s = old_args.get(1).copied().unwrap_or(0);
        let new_p = new_args.first().copied().unwrap_or(10);
        let new_s = new_args.get(1).copied().unwrap_or(0);
        return new_p >= old_p && new_s >= old_s && (new_p - new_s) >= (old_p - old_s);
    }

    false
}

/// 文字セット変更が安全か
///
/// utf8/utf8mb3 から utf8mb4 への変更のみ上位互換として安全と判定します。
pub fn charset_change_is_safe(old: Option<&str>, new: Option<&str>) -> bool {
    match (old, new) {
        (None, None) => true,
        (Some(o), Some(n)) if o == n => true,
        (Some(o), Some(n)) => matches!(o, "utf8" | "utf8mb3") && n == "utf8mb4",
        // 片側のみ明示されている場合はテーブルデフォルトへの変更なので安全側に倒さない
        _ => false,
    }
}
