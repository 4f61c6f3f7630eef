// SQLファイルサービス
//
// 管理ディレクトリ内の `*.sql` ファイルを表現します。内容は列挙時に
// 即時読み込みされ、単一のCREATE TABLE文でないファイルにはErrorが
// 設定されます。その状態のファイルは実行やALTERの対象になりません。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tavola_core::core::error::SqlFileError;
use tavola_core::core::schema::Table;

use crate::services::schema_parser::parse_create_table;

/// 1つの `*.sql` ファイル
#[derive(Debug, Clone)]
pub struct SqlFile {
    /// ファイルのフルパス
    pub path: PathBuf,
    /// ファイル名（ディレクトリ部なし）
    pub file_name: String,
    /// ファイル内容
    pub contents: String,
    /// 内容が単一のCREATE TABLE文でない場合の理由
    pub error: Option<SqlFileError>,
}

impl SqlFile {
    /// ファイルを読み込んで分類
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let contents = fs::read_to_string(&path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let error = parse_create_table(&contents).err();
        Ok(Self {
            path,
            file_name,
            contents,
            error,
        })
    }

    /// 内容から直接構築（書き出し用）
    pub fn from_contents(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let path = path.into();
        let contents = contents.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let error = parse_create_table(&contents).err();
        Self {
            path,
            file_name,
            contents,
            error,
        }
    }

    /// ファイル名から期待されるテーブル名（拡張子を除いた部分）
    pub fn table_name(&self) -> &str {
        self.file_name
            .strip_suffix(".sql")
            .unwrap_or(&self.file_name)
    }

    /// 内容をTableモデルへ解析
    pub fn parse(&self) -> Result<Table, SqlFileError> {
        parse_create_table(&self.contents)
    }

    /// ファイルをアトミックに書き換え
    ///
    /// 同一ディレクトリの一時ファイルに書いてからrenameします。
    pub fn write(&self) -> io::Result<()> {
        let tmp = self.path.with_extension("sql.tavola-tmp");
        fs::write(&tmp, &self.contents)?;
        fs::rename(&tmp, &self.path)
    }

    /// ファイルを削除
    pub fn delete(&self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

/// テーブルの正準形をファイル内容として整形
///
/// 末尾セミコロンなし・改行終端（initが生成する形式）。
pub fn canonical_file_contents(table: &Table, include_auto_inc: bool) -> String {
    format!("{}\n", table.generated_create_statement(include_auto_inc))
}

/// ディレクトリ内の `*.sql` ファイルをファイル名順に列挙
pub fn sql_files_in(dir: &Path) -> io::Result<Vec<SqlFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".sql") && !name.starts_with('.') {
            files.push(SqlFile::load(path)?);
        }
    }
    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = "CREATE TABLE `users` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB\n";

    #[test]
    fn test_load_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.sql");
        fs::write(&path, VALID).unwrap();

        let file = SqlFile::load(&path).unwrap();
        assert!(file.error.is_none());
        assert_eq!(file.table_name(), "users");
        assert_eq!(file.parse().unwrap().name, "users");
    }

    #[test]
    fn test_load_classifies_bad_files() {
        let dir = TempDir::new().unwrap();

        let empty = dir.path().join("empty.sql");
        fs::write(&empty, "\n").unwrap();
        assert_eq!(
            SqlFile::load(&empty).unwrap().error,
            Some(SqlFileError::Empty)
        );

        let insert = dir.path().join("insert.sql");
        fs::write(&insert, "INSERT INTO foo (a) VALUES (1);\n").unwrap();
        assert_eq!(
            SqlFile::load(&insert).unwrap().error,
            Some(SqlFileError::NotCreateTable)
        );

        let multi = dir.path().join("multi.sql");
        fs::write(&multi, format!("{};\nCREATE TABLE `t2` (`id` int NOT NULL)\n", VALID.trim()))
            .unwrap();
        assert_eq!(
            SqlFile::load(&multi).unwrap().error,
            Some(SqlFileError::MultipleStatements)
        );

        let typo = dir.path().join("typo.sql");
        fs::write(&typo, VALID.replace("NOT NULL", "NOT NULLL")).unwrap();
        assert!(matches!(
            SqlFile::load(&typo).unwrap().error,
            Some(SqlFileError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_write_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.sql");
        fs::write(&path, VALID).unwrap();

        let mut file = SqlFile::load(&path).unwrap();
        file.contents = VALID.to_lowercase();
        file.write().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), VALID.to_lowercase());
        // 一時ファイルが残らないこと
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sql_files_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.sql"), VALID).unwrap();
        fs::write(dir.path().join("a.sql"), VALID).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = sql_files_in(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.sql", "b.sql"]);
    }
}
