// CLIテスト共通ヘルパー
//
// テスト全体で共有されるユーティリティ関数を集約する。
// テストファイルから `mod common;` で利用可能。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tavola::cli::command_context::CommandContext;
use tempfile::TempDir;

/// 正準形のCREATE TABLE文（usersテーブル）
pub const USERS_SQL: &str = "CREATE TABLE `users` (\n  `id` int(10) unsigned NOT NULL AUTO_INCREMENT,\n  `name` varchar(100) DEFAULT NULL,\n  `credits` decimal(9,2) DEFAULT '10.00',\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4\n";

/// 正準形のCREATE TABLE文（postsテーブル）
pub const POSTS_SQL: &str = "CREATE TABLE `posts` (\n  `id` bigint(20) unsigned NOT NULL AUTO_INCREMENT,\n  `user_id` bigint(20) unsigned NOT NULL,\n  `body` text,\n  PRIMARY KEY (`id`),\n  KEY `user_created` (`user_id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4\n";

/// ホストレベル + スキーマレベルのディレクトリ構成を作成
///
/// 返り値は (TempDir, ホストレベルのパス, スキーマレベルのパス)。
#[allow(dead_code)]
pub fn setup_managed_tree(schema_name: &str) -> Result<(TempDir, PathBuf, PathBuf)> {
    let tmp = TempDir::new()?;
    let base = tmp.path().to_path_buf();
    fs::write(
        base.join(".tavola"),
        "[production]\nhost=db.example.com\nport=3306\n",
    )?;

    let schema_dir = base.join(schema_name);
    fs::create_dir(&schema_dir)?;
    fs::write(
        schema_dir.join(".tavola"),
        format!("schema={}\n", schema_name),
    )?;
    fs::write(schema_dir.join("users.sql"), USERS_SQL)?;
    fs::write(schema_dir.join("posts.sql"), POSTS_SQL)?;

    Ok((tmp, base, schema_dir))
}

/// テスト用のCommandContextを作成
#[allow(dead_code)]
pub fn context_for(
    dir: &Path,
    environment: &str,
    cli: &[(&str, &str)],
) -> CommandContext {
    let options: HashMap<String, String> = cli
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CommandContext::new(
        environment.to_string(),
        options,
        Some(dir.display().to_string()),
    )
}

/// ファイル内容を読み取る
#[allow(dead_code)]
pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("unable to read {}: {}", path.display(), e))
}
