// 差分検出からSQL生成までの統合テスト
//
// ファイルのCREATE TABLE文を解析した2つのスキーマを比較し、
// 生成されるDDLのテキストと安全性の扱いを検証します。

use tavola::core::error::DiffError;
use tavola::core::schema::Schema;
use tavola::core::schema_diff::{NextAutoInc, StatementModifiers, TableDiff};
use tavola::services::schema_diff_detector::SchemaDiffDetector;
use tavola::services::schema_parser::parse_create_table;

fn schema_of(statements: &[&str]) -> Schema {
    let mut schema = Schema::new("analytics", "utf8mb4", "utf8mb4_general_ci");
    for sql in statements {
        let mut table = parse_create_table(sql).unwrap();
        if table.char_set.is_empty() {
            table.char_set = schema.char_set.clone();
        }
        schema.add_table(table);
    }
    schema
}

const PAGEVIEWS_FULL: &str = "CREATE TABLE `pageviews` (\n  `id` bigint(20) unsigned NOT NULL AUTO_INCREMENT,\n  `url` varchar(500) NOT NULL,\n  `domain` varchar(100) NOT NULL,\n  `hits` int(10) unsigned NOT NULL DEFAULT '0',\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

const PAGEVIEWS_DROPPED: &str = "CREATE TABLE `pageviews` (\n  `id` bigint(20) unsigned NOT NULL AUTO_INCREMENT,\n  `url` varchar(500) NOT NULL,\n  `hits` int(10) unsigned NOT NULL DEFAULT '0',\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

#[test]
fn test_column_dropped_on_server_is_readded_by_diff() {
    // サーバー側でカラムがDROPされた場合、ファイル側に合わせるALTERは
    // ADD COLUMNになる（シナリオ: ALTER TABLE pageviews DROP COLUMN domain）
    let instance = schema_of(&[PAGEVIEWS_DROPPED]);
    let dir = schema_of(&[PAGEVIEWS_FULL]);

    let diff = SchemaDiffDetector::new().detect_diff(Some(&instance), &dir);
    assert_eq!(diff.table_diffs.len(), 1);

    let stmt = diff.table_diffs[0]
        .statement(&StatementModifiers::default())
        .unwrap()
        .unwrap();
    assert!(
        stmt.contains("ALTER TABLE `pageviews` ADD COLUMN `domain` varchar(100) NOT NULL AFTER `url`"),
        "unexpected statement: {}",
        stmt
    );
}

#[test]
fn test_file_side_drop_is_refused_without_allow_unsafe() {
    // ファイル側がカラムを削除した状態でのpush相当: DROP COLUMNは拒否される
    let instance = schema_of(&[PAGEVIEWS_FULL]);
    let dir = schema_of(&[PAGEVIEWS_DROPPED]);

    let diff = SchemaDiffDetector::new().detect_diff(Some(&instance), &dir);
    let result = diff.table_diffs[0].statement(&StatementModifiers::default());
    assert!(matches!(result, Err(DiffError::UnsafeDiff { .. })));

    // allow_unsafeで同じ差分が実行可能になる
    let mods = StatementModifiers {
        allow_unsafe: true,
        ..Default::default()
    };
    let stmt = diff.table_diffs[0].statement(&mods).unwrap().unwrap();
    assert!(stmt.contains("DROP COLUMN `domain`"));
}

#[test]
fn test_identical_sides_produce_no_statements() {
    let instance = schema_of(&[PAGEVIEWS_FULL]);
    let dir = schema_of(&[PAGEVIEWS_FULL]);
    let diff = SchemaDiffDetector::new().detect_diff(Some(&instance), &dir);
    assert!(diff.is_empty());
}

#[test]
fn test_table_only_on_instance_requires_unsafe_drop() {
    let instance = schema_of(&[PAGEVIEWS_FULL]);
    let dir = schema_of(&[]);
    let diff = SchemaDiffDetector::new().detect_diff(Some(&instance), &dir);

    assert_eq!(diff.table_diffs.len(), 1);
    assert!(diff.table_diffs[0].is_unsafe());
    let result = diff.table_diffs[0].statement(&StatementModifiers::default());
    assert!(matches!(result, Err(DiffError::UnsafeDiff { .. })));
}

#[test]
fn test_create_statement_round_trips_from_file_text() {
    let dir = schema_of(&[PAGEVIEWS_FULL]);
    let diff = SchemaDiffDetector::new().detect_diff(None, &dir);

    let TableDiff::CreateTable { .. } = &diff.table_diffs[0] else {
        panic!("expected CreateTable");
    };
    let stmt = diff.table_diffs[0]
        .statement(&StatementModifiers::default())
        .unwrap()
        .unwrap();
    assert_eq!(stmt, PAGEVIEWS_FULL);
}

#[test]
fn test_auto_inc_drift_requires_increase() {
    let mut instance_table = parse_create_table(PAGEVIEWS_FULL).unwrap();
    instance_table.auto_increment = Some(100);
    let mut dir_table = parse_create_table(PAGEVIEWS_FULL).unwrap();
    dir_table.auto_increment = Some(50);

    let mut instance = Schema::new("analytics", "utf8mb4", "utf8mb4_general_ci");
    instance.add_table(instance_table);
    let mut dir = Schema::new("analytics", "utf8mb4", "utf8mb4_general_ci");
    dir.add_table(dir_table);

    let diff = SchemaDiffDetector::new().detect_diff(Some(&instance), &dir);
    assert_eq!(diff.table_diffs.len(), 1);

    // ファイル側の値がインスタンス側以下なら、IfIncreasedでは文にならない
    let mods = StatementModifiers {
        next_auto_inc: NextAutoInc::IfIncreased,
        ..Default::default()
    };
    assert_eq!(diff.table_diffs[0].statement(&mods).unwrap(), None);

    // Alwaysなら常に出力される
    let mods = StatementModifiers {
        next_auto_inc: NextAutoInc::Always,
        ..Default::default()
    };
    assert_eq!(
        diff.table_diffs[0].statement(&mods).unwrap().unwrap(),
        "ALTER TABLE `pageviews` AUTO_INCREMENT = 50"
    );
}
