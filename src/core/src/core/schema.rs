// スキーマドメインモデル
//
// MySQL系データベースのスキーマ定義を表現する型システム。
// Schema, Table, Column, Index を提供し、テーブルの正準CREATE TABLE文の
// 生成を担います。テーブルの並び順は挿入順を保持します（差分の出力順序が
// これに依存するため、マップではなくVecを使用）。

use serde::Serialize;
use std::fmt::Write as _;

/// 識別子をバッククォートでエスケープ
///
/// 識別子中のバッククォートは二重化されます。
pub fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// 文字列リテラルをシングルクォートでエスケープ
pub fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// スキーマ定義
///
/// 1つのインスタンス上の名前付きデータベース、またはディレクトリの
/// `*.sql` ファイル群から合成された論理スキーマを表現します。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// スキーマ名
    pub name: String,

    /// デフォルト文字セット
    pub char_set: String,

    /// デフォルト照合順序
    pub collation: String,

    /// テーブル定義（挿入順を保持）
    pub tables: Vec<Table>,
}

impl Schema {
    /// 新しいスキーマを作成
    pub fn new(name: impl Into<String>, char_set: impl Into<String>, collation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            char_set: char_set.into(),
            collation: collation.into(),
            tables: Vec::new(),
        }
    }

    /// テーブルを追加
    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// 指定されたテーブルを取得
    pub fn get_table(&self, table_name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == table_name)
    }

    /// 指定されたテーブルが存在するか確認
    pub fn has_table(&self, table_name: &str) -> bool {
        self.get_table(table_name).is_some()
    }

    /// 条件に一致しないテーブルのみ残す
    pub fn retain_tables<F: FnMut(&Table) -> bool>(&mut self, keep: F) {
        self.tables.retain(keep);
    }
}

/// カラムのデフォルト値
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnDefault {
    /// DEFAULT句なし
    None,
    /// DEFAULT NULL
    Null,
    /// リテラル値（クォートして出力）
    Value(String),
    /// 式（CURRENT_TIMESTAMPなど。そのまま出力）
    Expression(String),
}

/// カラム定義
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// カラム名
    pub name: String,

    /// 型定義のテキスト（例: "int(10) unsigned", "varchar(100)"）
    pub type_def: String,

    /// NULL許容か
    pub nullable: bool,

    /// デフォルト値
    pub default: ColumnDefault,

    /// AUTO_INCREMENTカラムか
    pub auto_increment: bool,

    /// カラム単位の文字セット（テーブルデフォルトと同じ場合はNone）
    pub char_set: Option<String>,

    /// カラム単位の照合順序
    pub collation: Option<String>,

    /// ON UPDATE句（CURRENT_TIMESTAMPなど）
    pub on_update: Option<String>,

    /// コメント
    pub comment: Option<String>,
}

impl Column {
    /// 新しいカラムを作成
    pub fn new(name: impl Into<String>, type_def: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_def: type_def.into(),
            nullable,
            default: ColumnDefault::None,
            auto_increment: false,
            char_set: None,
            collation: None,
            on_update: None,
            comment: None,
        }
    }

    /// CREATE TABLE / ALTER TABLE 内で使用するカラム定義句を生成
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", escape_identifier(&self.name), self.type_def);
        if let Some(cs) = &self.char_set {
            write!(def, " CHARACTER SET {}", cs).unwrap();
        }
        if let Some(col) = &self.collation {
            write!(def, " COLLATE {}", col).unwrap();
        }
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        match &self.default {
            ColumnDefault::None => {}
            ColumnDefault::Null => def.push_str(" DEFAULT NULL"),
            ColumnDefault::Value(v) => {
                write!(def, " DEFAULT '{}'", escape_string(v)).unwrap();
            }
            ColumnDefault::Expression(e) => {
                write!(def, " DEFAULT {}", e).unwrap();
            }
        }
        if let Some(expr) = &self.on_update {
            write!(def, " ON UPDATE {}", expr).unwrap();
        }
        if self.auto_increment {
            def.push_str(" AUTO_INCREMENT");
        }
        if let Some(comment) = &self.comment {
            write!(def, " COMMENT '{}'", escape_string(comment)).unwrap();
        }
        def
    }
}

/// インデックスを構成するカラム参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexColumn {
    /// カラム名
    pub name: String,
    /// プレフィックス長（`col(20)` 形式）
    pub sub_part: Option<u32>,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub_part: None,
        }
    }

    fn definition(&self) -> String {
        match self.sub_part {
            Some(len) => format!("{}({})", escape_identifier(&self.name), len),
            None => escape_identifier(&self.name),
        }
    }
}

/// インデックス定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    /// インデックス名（PRIMARY KEYは "PRIMARY"）
    pub name: String,

    /// 構成カラム
    pub columns: Vec<IndexColumn>,

    /// PRIMARY KEYか
    pub primary_key: bool,

    /// UNIQUEか
    pub unique: bool,

    /// コメント
    pub comment: Option<String>,
}

impl Index {
    /// 新しいセカンダリインデックスを作成
    pub fn new(name: impl Into<String>, columns: Vec<IndexColumn>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: false,
            unique,
            comment: None,
        }
    }

    /// 新しいPRIMARY KEYを作成
    pub fn primary(columns: Vec<IndexColumn>) -> Self {
        Self {
            name: "PRIMARY".to_string(),
            columns,
            primary_key: true,
            unique: true,
            comment: None,
        }
    }

    /// CREATE TABLE 内で使用するインデックス定義句を生成
    pub fn definition(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(IndexColumn::definition)
            .collect::<Vec<_>>()
            .join(",");
        let mut def = if self.primary_key {
            format!("PRIMARY KEY ({})", cols)
        } else if self.unique {
            format!("UNIQUE KEY {} ({})", escape_identifier(&self.name), cols)
        } else {
            format!("KEY {} ({})", escape_identifier(&self.name), cols)
        };
        if let Some(comment) = &self.comment {
            write!(def, " COMMENT '{}'", escape_string(comment)).unwrap();
        }
        def
    }

    /// ALTER TABLE の ADD 句を生成
    pub fn add_clause(&self) -> String {
        format!("ADD {}", self.definition())
    }
}

/// テーブル定義
///
/// パーサが正準形を再現できるテーブルは supported となり ALTER の対象に
/// なります。再現できないテーブルは CREATE / DROP のみ可能です。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// テーブル名
    pub name: String,

    /// カラム定義（定義順）
    pub columns: Vec<Column>,

    /// インデックス定義（PRIMARY KEYを先頭に、定義順）
    pub indexes: Vec<Index>,

    /// ストレージエンジン
    pub engine: String,

    /// デフォルト文字セット
    pub char_set: String,

    /// デフォルト照合順序
    pub collation: String,

    /// ROW_FORMAT句
    pub row_format: Option<String>,

    /// 次のAUTO_INCREMENT値
    pub auto_increment: Option<u64>,

    /// その他のテーブルオプション（そのまま保持）
    pub create_options: Option<String>,

    /// テーブルコメント
    pub comment: Option<String>,

    /// 出自のCREATE TABLE文（ファイル内容またはSHOW CREATE TABLEの結果）
    pub create_statement: String,

    /// パーサが正準形を再現できるか
    pub supported: bool,
}

impl Table {
    /// 新しいテーブルを作成
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            engine: "InnoDB".to_string(),
            char_set: String::new(),
            collation: String::new(),
            row_format: None,
            auto_increment: None,
            create_options: None,
            comment: None,
            create_statement: String::new(),
            supported: true,
        }
    }

    /// カラムを追加
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// インデックスを追加
    pub fn add_index(&mut self, index: Index) {
        self.indexes.push(index);
    }

    /// 指定されたカラムを取得
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// カラムの位置（定義順、0始まり）
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// PRIMARY KEYを取得
    pub fn primary_key(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.primary_key)
    }

    /// 指定されたインデックスを取得
    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// `ALTER TABLE `name`` プレフィックス
    pub fn alter_statement(&self) -> String {
        format!("ALTER TABLE {}", escape_identifier(&self.name))
    }

    /// 正準形のCREATE TABLE文を生成
    ///
    /// SHOW CREATE TABLE と同じ体裁（2スペースインデント、行末カンマ、
    /// オプション句は1行）で出力します。セミコロンは含みません。
    pub fn generated_create_statement(&self, include_auto_inc: bool) -> String {
        let mut lines = Vec::with_capacity(self.columns.len() + self.indexes.len());
        for column in &self.columns {
            lines.push(format!("  {}", column.definition()));
        }
        for index in &self.indexes {
            lines.push(format!("  {}", index.definition()));
        }

        let mut stmt = format!(
            "CREATE TABLE {} (\n{}\n)",
            escape_identifier(&self.name),
            lines.join(",\n")
        );

        write!(stmt, " ENGINE={}", self.engine).unwrap();
        if include_auto_inc {
            if let Some(next) = self.auto_increment {
                write!(stmt, " AUTO_INCREMENT={}", next).unwrap();
            }
        }
        if !self.char_set.is_empty() {
            write!(stmt, " DEFAULT CHARSET={}", self.char_set).unwrap();
        }
        if !self.collation.is_empty() {
            write!(stmt, " COLLATE={}", self.collation).unwrap();
        }
        if let Some(rf) = &self.row_format {
            write!(stmt, " ROW_FORMAT={}", rf).unwrap();
        }
        if let Some(opts) = &self.create_options {
            write!(stmt, " {}", opts).unwrap();
        }
        if let Some(comment) = &self.comment {
            write!(stmt, " COMMENT='{}'", escape_string(comment)).unwrap();
        }
        stmt
    }

    /// CREATE実行用のテキスト
    ///
    /// supportedなら正準形、unsupportedなら出自のテキストをそのまま返す。
    pub fn create_statement_text(&self, include_auto_inc: bool) -> String {
        if self.supported {
            self.generated_create_statement(include_auto_inc)
        } else {
            self.create_statement.trim_end_matches([';', '\n', ' ']).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut table = Table::new("users");
        table.char_set = "utf8mb4".to_string();
        table.collation = "utf8mb4_general_ci".to_string();

        let mut id = Column::new("id", "int(10) unsigned", false);
        id.auto_increment = true;
        table.add_column(id);

        let mut name = Column::new("name", "varchar(100)", true);
        name.default = ColumnDefault::Null;
        table.add_column(name);

        table.add_index(Index::primary(vec![IndexColumn::new("id")]));
        table.add_index(Index::new(
            "name_idx",
            vec![IndexColumn {
                name: "name".to_string(),
                sub_part: Some(20),
            }],
            false,
        ));
        table
    }

    #[test]
    fn test_escape_identifier_doubles_backticks() {
        assert_eq!(escape_identifier("users"), "`users`");
        assert_eq!(escape_identifier("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_generated_create_statement() {
        let table = sample_table();
        let expected = "CREATE TABLE `users` (\n  `id` int(10) unsigned NOT NULL AUTO_INCREMENT,\n  `name` varchar(100) DEFAULT NULL,\n  PRIMARY KEY (`id`),\n  KEY `name_idx` (`name`(20))\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_general_ci";
        assert_eq!(table.generated_create_statement(false), expected);
    }

    #[test]
    fn test_auto_increment_included_only_on_request() {
        let mut table = sample_table();
        table.auto_increment = Some(42);
        assert!(table
            .generated_create_statement(true)
            .contains("AUTO_INCREMENT=42"));
        assert!(!table
            .generated_create_statement(false)
            .contains("AUTO_INCREMENT=42"));
    }

    #[test]
    fn test_column_definition_variants() {
        let mut col = Column::new("created_at", "timestamp", false);
        col.default = ColumnDefault::Expression("CURRENT_TIMESTAMP".to_string());
        col.on_update = Some("CURRENT_TIMESTAMP".to_string());
        assert_eq!(
            col.definition(),
            "`created_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP"
        );

        let mut col = Column::new("status", "varchar(10)", false);
        col.default = ColumnDefault::Value("new".to_string());
        col.comment = Some("it's a state".to_string());
        assert_eq!(
            col.definition(),
            "`status` varchar(10) NOT NULL DEFAULT 'new' COMMENT 'it''s a state'"
        );
    }

    #[test]
    fn test_unsupported_table_create_uses_original_text() {
        let mut table = sample_table();
        table.supported = false;
        table.create_statement = "CREATE TABLE `users` (\n  `id` int\n) PARTITION BY HASH(id);\n".to_string();
        assert_eq!(
            table.create_statement_text(false),
            "CREATE TABLE `users` (\n  `id` int\n) PARTITION BY HASH(id)"
        );
    }

    #[test]
    fn test_schema_lookup_preserves_order() {
        let mut schema = Schema::new("product", "utf8mb4", "utf8mb4_general_ci");
        schema.add_table(Table::new("b"));
        schema.add_table(Table::new("a"));
        assert!(schema.has_table("a"));
        assert_eq!(schema.tables[0].name, "b");
    }
}
