// サービス層
// ディレクトリ走査、解析、差分検出、DDL構築、実行のビジネスロジック

pub mod ddl_statement;
pub mod dir;
pub mod executor;
pub mod schema_diff_detector;
pub mod schema_parser;
pub mod sql_file;
pub mod target;
