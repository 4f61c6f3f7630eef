// CREATE TABLE パーサ
//
// `*.sql` ファイルおよび SHOW CREATE TABLE の出力をトークナイズして
// Table モデルへ変換します。キーワードの大文字小文字、バッククォートの有無、
// 改行位置には依存しません。
//
// モデルで表現できない構文（外部キー、CHECK、生成カラム、パーティション等）に
// 遭遇した場合、テーブルは unsupported になります。unsupported なテーブルは
// CREATE / DROP のみ可能で、ALTER は生成されません。未知の語は構文エラーとして
// 扱います（タイポを黙って無視しないため）。

use tavola_core::core::error::SqlFileError;
use tavola_core::core::schema::{
    Column, ColumnDefault, Index, IndexColumn, Table,
};

/// SQLトークン
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// 識別子または語（クォートの有無を保持）
    Word { text: String, quoted: bool },
    /// 数値リテラル
    Number(String),
    /// 文字列リテラル（クォートは除去済み、エスケープ解決済み）
    Str(String),
    /// ヘキサ/ビットリテラル（b'0' など。そのまま保持）
    BitLit(String),
    /// 記号1文字
    Symbol(char),
}

impl Token {
    fn is_word(&self, keyword: &str) -> bool {
        matches!(self, Token::Word { text, quoted: false } if text.eq_ignore_ascii_case(keyword))
    }

    fn is_symbol(&self, symbol: char) -> bool {
        matches!(self, Token::Symbol(c) if *c == symbol)
    }
}

/// SQLテキストをトークン列に分解
fn tokenize(sql: &str) -> Result<Vec<Token>, SqlFileError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = sql.chars().collect();
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        match ch {
            c if c.is_whitespace() => idx += 1,
            '`' => {
                let mut name = String::new();
                idx += 1;
                loop {
                    match chars.get(idx) {
                        Some('`') if chars.get(idx + 1) == Some(&'`') => {
                            name.push('`');
                            idx += 2;
                        }
                        Some('`') => {
                            idx += 1;
                            break;
                        }
                        Some(c) => {
                            name.push(*c);
                            idx += 1;
                        }
                        None => {
                            return Err(SqlFileError::ParseFailure(
                                "unterminated quoted identifier".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Word {
                    text: name,
                    quoted: true,
                });
            }
            '\'' | '"' => {
                let quote = ch;
                let mut value = String::new();
                idx += 1;
                loop {
                    match chars.get(idx) {
                        Some(c) if *c == quote && chars.get(idx + 1) == Some(&quote) => {
                            value.push(quote);
                            idx += 2;
                        }
                        Some('\\') if chars.get(idx + 1).is_some() => {
                            let next = chars[idx + 1];
                            value.push(match next {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '0' => '\0',
                                other => other,
                            });
                            idx += 2;
                        }
                        Some(c) if *c == quote => {
                            idx += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(*c);
                            idx += 1;
                        }
                        None => {
                            return Err(SqlFileError::ParseFailure(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            'b' | 'B' | 'x' | 'X' if chars.get(idx + 1) == Some(&'\'') => {
                // b'0' / x'ff' 形式のリテラル
                let prefix = ch.to_ascii_lowercase();
                let mut value = String::new();
                idx += 2;
                while let Some(c) = chars.get(idx) {
                    if *c == '\'' {
                        break;
                    }
                    value.push(*c);
                    idx += 1;
                }
                if chars.get(idx) != Some(&'\'') {
                    return Err(SqlFileError::ParseFailure(
                        "unterminated bit literal".to_string(),
                    ));
                }
                idx += 1;
                tokens.push(Token::BitLit(format!("{}'{}'", prefix, value)));
            }
            '0'..='9' => {
                let mut number = String::new();
                while let Some(c) = chars.get(idx) {
                    if c.is_ascii_digit() || *c == '.' {
                        number.push(*c);
                        idx += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            '(' | ')' | ',' | '=' | ';' | '.' => {
                tokens.push(Token::Symbol(ch));
                idx += 1;
            }
            '-' if chars.get(idx + 1) == Some(&'-') => {
                // 行コメント
                while idx < chars.len() && chars[idx] != '\n' {
                    idx += 1;
                }
            }
            '-' if chars.get(idx + 1).is_some_and(|c| c.is_ascii_digit()) => {
                let mut number = String::from("-");
                idx += 1;
                while let Some(c) = chars.get(idx) {
                    if c.is_ascii_digit() || *c == '.' {
                        number.push(*c);
                        idx += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            '#' => {
                while idx < chars.len() && chars[idx] != '\n' {
                    idx += 1;
                }
            }
            '/' if chars.get(idx + 1) == Some(&'*') => {
                idx += 2;
                while idx + 1 < chars.len() && !(chars[idx] == '*' && chars[idx + 1] == '/') {
                    idx += 1;
                }
                if idx + 1 >= chars.len() {
                    return Err(SqlFileError::ParseFailure(
                        "unterminated comment".to_string(),
                    ));
                }
                idx += 2;
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let mut word = String::new();
                while let Some(c) = chars.get(idx) {
                    if c.is_alphanumeric() || *c == '_' || *c == '$' {
                        word.push(*c);
                        idx += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word {
                    text: word,
                    quoted: false,
                });
            }
            other => {
                return Err(SqlFileError::ParseFailure(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

/// トークン列のカーソル
struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_word(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SqlFileError> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", keyword)))
        }
    }

    fn accept_symbol(&mut self, symbol: char) -> bool {
        if self.peek().is_some_and(|t| t.is_symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), SqlFileError> {
        if self.accept_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", symbol)))
        }
    }

    /// 識別子（クォート有無問わず）を取得
    fn expect_identifier(&mut self) -> Result<String, SqlFileError> {
        match self.next() {
            Some(Token::Word { text, .. }) => Ok(text),
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    /// 現在の句の残り（カンマまたは閉じ括弧まで、ネスト考慮）を読み飛ばす
    fn skip_clause(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Symbol('(') => depth += 1,
                Token::Symbol(')') if depth == 0 => return,
                Token::Symbol(')') => depth -= 1,
                Token::Symbol(',') if depth == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn unexpected(&self, expectation: &str) -> SqlFileError {
        let found = match self.peek() {
            Some(Token::Word { text, .. }) => format!("'{}'", text),
            Some(Token::Number(n)) => format!("'{}'", n),
            Some(Token::Str(_)) => "string literal".to_string(),
            Some(Token::BitLit(lit)) => format!("'{}'", lit),
            Some(Token::Symbol(c)) => format!("'{}'", c),
            None => "end of statement".to_string(),
        };
        SqlFileError::ParseFailure(format!("{}, found {}", expectation, found))
    }
}

/// カラムオプションとして認識するが、モデル化しない語
///
/// これらに出会ったテーブルは unsupported になります。
const UNMODELED_COLUMN_KEYWORDS: &[&str] = &[
    "generated", "as", "virtual", "stored", "references", "check", "srid", "invisible",
    "column_format", "storage",
];

/// CREATE TABLE 文を Table モデルへ解析
///
/// 入力は単一の CREATE TABLE 文であること（末尾セミコロンは許容）。
pub fn parse_create_table(sql: &str) -> Result<Table, SqlFileError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlFileError::Empty);
    }

    let mut cursor = Cursor::new(tokenize(trimmed)?);
    if !cursor.accept_keyword("create") {
        return Err(SqlFileError::NotCreateTable);
    }
    if !cursor.accept_keyword("table") {
        return Err(SqlFileError::NotCreateTable);
    }
    if cursor.accept_keyword("if") {
        cursor.expect_keyword("not")?;
        cursor.expect_keyword("exists")?;
    }

    let name = cursor.expect_identifier()?;
    let mut table = Table::new(name);
    table.engine = "InnoDB".to_string();
    table.create_statement = trimmed.to_string();

    cursor.expect_symbol('(')?;

    // カラム・インデックス定義
    loop {
        parse_definition(&mut cursor, &mut table)?;
        if cursor.accept_symbol(',') {
            continue;
        }
        cursor.expect_symbol(')')?;
        break;
    }

    parse_table_options(&mut cursor, &mut table)?;

    cursor.accept_symbol(';');
    if cursor.peek().is_some() {
        return Err(SqlFileError::MultipleStatements);
    }

    if table.columns.is_empty() {
        return Err(SqlFileError::ParseFailure(
            "table has no columns".to_string(),
        ));
    }

    // SHOW CREATE TABLE と同様、PRIMARY KEYを先頭へ
    table.indexes.sort_by_key(|i| !i.primary_key);

    Ok(table)
}

/// カラム定義またはインデックス定義を1つ解析
fn parse_definition(cursor: &mut Cursor, table: &mut Table) -> Result<(), SqlFileError> {
    let is_plain = |cursor: &Cursor, kw: &str| cursor.peek().is_some_and(|t| t.is_word(kw));

    if is_plain(cursor, "primary") {
        cursor.pos += 1;
        cursor.expect_keyword("key")?;
        let columns = parse_key_parts(cursor)?;
        table.add_index(Index::primary(columns));
        return Ok(());
    }

    if is_plain(cursor, "unique") {
        cursor.pos += 1;
        // UNIQUE KEY / UNIQUE INDEX / UNIQUE。名前省略時は先頭カラム名を使う
        let _ = cursor.accept_keyword("key") || cursor.accept_keyword("index");
        let name = if cursor.peek().is_some_and(|t| t.is_symbol('(')) {
            None
        } else {
            Some(cursor.expect_identifier()?)
        };
        let columns = parse_key_parts(cursor)?;
        let name = name.unwrap_or_else(|| columns[0].name.clone());
        let mut index = Index::new(name, columns, true);
        parse_index_trailer(cursor, &mut index, table)?;
        table.add_index(index);
        return Ok(());
    }

    if is_plain(cursor, "key") || is_plain(cursor, "index") {
        cursor.pos += 1;
        let name = cursor.expect_identifier()?;
        let columns = parse_key_parts(cursor)?;
        let mut index = Index::new(name, columns, false);
        parse_index_trailer(cursor, &mut index, table)?;
        table.add_index(index);
        return Ok(());
    }

    if is_plain(cursor, "constraint")
        || is_plain(cursor, "foreign")
        || is_plain(cursor, "fulltext")
        || is_plain(cursor, "spatial")
        || is_plain(cursor, "check")
    {
        // 外部キー・CHECK・全文/空間インデックスはモデル化しない
        table.supported = false;
        cursor.skip_clause();
        return Ok(());
    }

    parse_column(cursor, table)
}

/// `(col, col(10), ...)` 形式のキー構成を解析
fn parse_key_parts(cursor: &mut Cursor) -> Result<Vec<IndexColumn>, SqlFileError> {
    cursor.expect_symbol('(')?;
    let mut parts = Vec::new();
    loop {
        let name = cursor.expect_identifier()?;
        let mut part = IndexColumn::new(name);
        if cursor.accept_symbol('(') {
            match cursor.next() {
                Some(Token::Number(n)) => match n.parse::<u32>() {
                    Ok(len) => part.sub_part = Some(len),
                    Err(_) => return Err(cursor.unexpected("expected prefix length")),
                },
                _ => return Err(cursor.unexpected("expected prefix length")),
            }
            cursor.expect_symbol(')')?;
        }
        parts.push(part);
        if cursor.accept_symbol(',') {
            continue;
        }
        cursor.expect_symbol(')')?;
        break;
    }
    Ok(parts)
}

/// インデックス定義の後続句（USING / COMMENT）を解析
fn parse_index_trailer(
    cursor: &mut Cursor,
    index: &mut Index,
    table: &mut Table,
) -> Result<(), SqlFileError> {
    loop {
        if cursor.accept_keyword("using") {
            // BTREE / HASH。モデルでは保持せず、デフォルトのBTREE以外はunsupported
            let kind = cursor.expect_identifier()?;
            if !kind.eq_ignore_ascii_case("btree") {
                table.supported = false;
            }
        } else if cursor.accept_keyword("comment") {
            match cursor.next() {
                Some(Token::Str(text)) => index.comment = Some(text),
                _ => return Err(cursor.unexpected("expected index comment string")),
            }
        } else {
            return Ok(());
        }
    }
}

/// カラム定義を解析
fn parse_column(cursor: &mut Cursor, table: &mut Table) -> Result<(), SqlFileError> {
    let name = match cursor.next() {
        Some(Token::Word { text, .. }) => text,
        _ => return Err(cursor.unexpected("expected column name")),
    };
    let type_def = parse_type(cursor)?;
    let mut column = Column::new(name, type_def, true);
    let mut explicit_default = false;
    let mut inline_primary = false;
    let mut inline_unique = false;

    loop {
        let Some(token) = cursor.peek() else { break };
        match token {
            Token::Symbol(',') | Token::Symbol(')') => break,
            Token::Word { text, quoted: false } => {
                let word = text.to_ascii_lowercase();
                match word.as_str() {
                    "not" => {
                        cursor.pos += 1;
                        cursor.expect_keyword("null")?;
                        column.nullable = false;
                    }
                    "null" => {
                        cursor.pos += 1;
                        column.nullable = true;
                    }
                    "default" => {
                        cursor.pos += 1;
                        column.default = parse_default_value(cursor)?;
                        explicit_default = true;
                    }
                    "on" => {
                        cursor.pos += 1;
                        cursor.expect_keyword("update")?;
                        column.on_update = Some(parse_current_timestamp(cursor)?);
                    }
                    "auto_increment" => {
                        cursor.pos += 1;
                        column.auto_increment = true;
                    }
                    "comment" => {
                        cursor.pos += 1;
                        match cursor.next() {
                            Some(Token::Str(text)) => column.comment = Some(text),
                            _ => return Err(cursor.unexpected("expected comment string")),
                        }
                    }
                    "character" => {
                        cursor.pos += 1;
                        cursor.expect_keyword("set")?;
                        column.char_set = Some(cursor.expect_identifier()?);
                    }
                    "charset" => {
                        cursor.pos += 1;
                        column.char_set = Some(cursor.expect_identifier()?);
                    }
                    "collate" => {
                        cursor.pos += 1;
                        column.collation = Some(cursor.expect_identifier()?);
                    }
                    "primary" => {
                        cursor.pos += 1;
                        let _ = cursor.accept_keyword("key");
                        inline_primary = true;
                    }
                    "unique" => {
                        cursor.pos += 1;
                        let _ = cursor.accept_keyword("key");
                        inline_unique = true;
                    }
                    _ if UNMODELED_COLUMN_KEYWORDS.contains(&word.as_str()) => {
                        table.supported = false;
                        cursor.skip_clause();
                    }
                    _ => return Err(cursor.unexpected("unexpected column attribute")),
                }
            }
            _ => return Err(cursor.unexpected("unexpected token in column definition")),
        }
    }

    // SHOW CREATE TABLE と同じく、NULL許容かつDEFAULT未指定ならDEFAULT NULLを補う。
    // ただしTEXT/BLOB系はデフォルトを持てないため補わない
    let base_type = column
        .type_def
        .split(['(', ' '])
        .next()
        .unwrap_or("")
        .to_string();
    let defaultless_type = matches!(
        base_type.as_str(),
        "tinytext"
            | "text"
            | "mediumtext"
            | "longtext"
            | "tinyblob"
            | "blob"
            | "mediumblob"
            | "longblob"
            | "json"
            | "geometry"
    );
    if column.nullable && !explicit_default && !column.auto_increment && !defaultless_type {
        column.default = ColumnDefault::Null;
    }

    if inline_primary {
        table.add_index(Index::primary(vec![IndexColumn::new(column.name.clone())]));
        column.nullable = false;
        column.default = ColumnDefault::None;
    } else if inline_unique {
        table.add_index(Index::new(
            column.name.clone(),
            vec![IndexColumn::new(column.name.clone())],
            true,
        ));
    }

    table.add_column(column);
    Ok(())
}

/// 型定義を正準テキストへ解析
///
/// 基本型は小文字化し、引数リスト・unsigned/zerofill修飾を保持します。
fn parse_type(cursor: &mut Cursor) -> Result<String, SqlFileError> {
    let base = match cursor.next() {
        Some(Token::Word { text, quoted: false }) => text.to_ascii_lowercase(),
        _ => return Err(cursor.unexpected("expected column type")),
    };

    let mut type_def = base;
    if cursor.accept_symbol('(') {
        let mut args = Vec::new();
        loop {
            match cursor.next() {
                Some(Token::Number(n)) => args.push(n),
                Some(Token::Str(s)) => {
                    args.push(format!("'{}'", s.replace('\'', "''")))
                }
                _ => return Err(cursor.unexpected("expected type argument")),
            }
            if cursor.accept_symbol(',') {
                continue;
            }
            cursor.expect_symbol(')')?;
            break;
        }
        type_def.push('(');
        type_def.push_str(&args.join(","));
        type_def.push(')');
    }
    if cursor.accept_keyword("unsigned") {
        type_def.push_str(" unsigned");
    }
    if cursor.accept_keyword("zerofill") {
        type_def.push_str(" zerofill");
    }
    Ok(type_def)
}

/// DEFAULT句の値を解析
fn parse_default_value(cursor: &mut Cursor) -> Result<ColumnDefault, SqlFileError> {
    match cursor.peek().cloned() {
        Some(Token::Word { ref text, quoted: false }) if text.eq_ignore_ascii_case("null") => {
            cursor.pos += 1;
            Ok(ColumnDefault::Null)
        }
        Some(Token::Word { ref text, quoted: false })
            if text.eq_ignore_ascii_case("current_timestamp") =>
        {
            Ok(ColumnDefault::Expression(parse_current_timestamp(cursor)?))
        }
        Some(Token::Str(value)) => {
            cursor.pos += 1;
            Ok(ColumnDefault::Value(value))
        }
        Some(Token::Number(value)) => {
            cursor.pos += 1;
            Ok(ColumnDefault::Value(value))
        }
        Some(Token::BitLit(lit)) => {
            cursor.pos += 1;
            Ok(ColumnDefault::Expression(lit))
        }
        _ => Err(cursor.unexpected("expected default value")),
    }
}

/// CURRENT_TIMESTAMP[(n)] を解析してテキストで返す
fn parse_current_timestamp(cursor: &mut Cursor) -> Result<String, SqlFileError> {
    if !cursor.accept_keyword("current_timestamp") {
        return Err(cursor.unexpected("expected CURRENT_TIMESTAMP"));
    }
    let mut text = "CURRENT_TIMESTAMP".to_string();
    if cursor.accept_symbol('(') {
        match cursor.next() {
            Some(Token::Number(n)) => {
                text.push('(');
                text.push_str(&n);
                text.push(')');
            }
            _ => return Err(cursor.unexpected("expected fractional seconds precision")),
        }
        cursor.expect_symbol(')')?;
    }
    Ok(text)
}

/// ストレージエンジン名をSHOW CREATE TABLEと同じ表記に正規化
fn canonical_engine_name(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "innodb" => "InnoDB".to_string(),
        "myisam" => "MyISAM".to_string(),
        "memory" => "MEMORY".to_string(),
        "csv" => "CSV".to_string(),
        "archive" => "ARCHIVE".to_string(),
        "blackhole" => "BLACKHOLE".to_string(),
        "rocksdb" => "ROCKSDB".to_string(),
        _ => name.to_string(),
    }
}

/// テーブルオプション（ENGINE= など）を解析
fn parse_table_options(cursor: &mut Cursor, table: &mut Table) -> Result<(), SqlFileError> {
    loop {
        let Some(token) = cursor.peek() else {
            return Ok(());
        };
        if token.is_symbol(';') {
            return Ok(());
        }

        let word = match token {
            Token::Word { text, quoted: false } => text.to_ascii_lowercase(),
            _ => return Err(cursor.unexpected("expected table option")),
        };

        match word.as_str() {
            "engine" => {
                cursor.pos += 1;
                cursor.accept_symbol('=');
                table.engine = canonical_engine_name(&cursor.expect_identifier()?);
            }
            "auto_increment" => {
                cursor.pos += 1;
                cursor.accept_symbol('=');
                match cursor.next() {
                    Some(Token::Number(n)) => {
                        table.auto_increment = n.parse::<u64>().ok();
                        if table.auto_increment.is_none() {
                            return Err(cursor.unexpected("expected auto_increment value"));
                        }
                    }
                    _ => return Err(cursor.unexpected("expected auto_increment value")),
                }
            }
            "default" => {
                cursor.pos += 1;
                // DEFAULT CHARSET= / DEFAULT CHARACTER SET= / DEFAULT COLLATE=
                if cursor.accept_keyword("charset") {
                    cursor.accept_symbol('=');
                    table.char_set = cursor.expect_identifier()?;
                } else if cursor.accept_keyword("character") {
                    cursor.expect_keyword("set")?;
                    cursor.accept_symbol('=');
                    table.char_set = cursor.expect_identifier()?;
                } else if cursor.accept_keyword("collate") {
                    cursor.accept_symbol('=');
                    table.collation = cursor.expect_identifier()?;
                } else {
                    return Err(cursor.unexpected("expected CHARSET or COLLATE"));
                }
            }
            "charset" => {
                cursor.pos += 1;
                cursor.accept_symbol('=');
                table.char_set = cursor.expect_identifier()?;
            }
            "character" => {
                cursor.pos += 1;
                cursor.expect_keyword("set")?;
                cursor.accept_symbol('=');
                table.char_set = cursor.expect_identifier()?;
            }
            "collate" => {
                cursor.pos += 1;
                cursor.accept_symbol('=');
                table.collation = cursor.expect_identifier()?;
            }
            "row_format" => {
                cursor.pos += 1;
                cursor.accept_symbol('=');
                table.row_format = Some(cursor.expect_identifier()?.to_ascii_uppercase());
            }
            "comment" => {
                cursor.pos += 1;
                cursor.accept_symbol('=');
                match cursor.next() {
                    Some(Token::Str(text)) => table.comment = Some(text),
                    _ => return Err(cursor.unexpected("expected table comment string")),
                }
            }
            "partition" => {
                // PARTITION BY ... はモデル化しない。以降は読み捨て
                table.supported = false;
                cursor.pos = cursor.tokens.len();
                return Ok(());
            }
            _ => {
                // KEY_BLOCK_SIZE等の未知オプションはcreate_optionsへ退避しつつunsupported
                table.supported = false;
                cursor.pos += 1;
                cursor.accept_symbol('=');
                let _ = cursor.next();
            }
        }
    }
}
