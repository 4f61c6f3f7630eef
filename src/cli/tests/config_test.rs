// 設定チェーンの統合テスト
//
// グローバル/ディレクトリ/CLIのレイヤー合成と環境セクション選択を、
// 実ファイルを使って検証します。

use std::collections::HashMap;
use std::fs;

use tavola::core::config::Source;
use tavola::services::dir::Dir;
use tempfile::TempDir;

fn cli(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_directory_chain_overrides_in_order() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".tavola"),
        "host=outer.example.com\nuser=outer\nignore-table=^_\n",
    )
    .unwrap();
    let inner = tmp.path().join("product");
    fs::create_dir(&inner).unwrap();
    fs::write(inner.join(".tavola"), "schema=product\nuser=inner\n").unwrap();

    let dir = Dir::new(&inner, "production", cli(&[])).unwrap();
    assert_eq!(dir.config.get("host"), "outer.example.com");
    assert_eq!(dir.config.get("user"), "inner");
    assert_eq!(dir.config.get("ignore-table"), "^_");
    // 組み込みデフォルトはチェーンの最下層
    assert_eq!(dir.config.get("port"), "3306");
}

#[test]
fn test_cli_layer_has_highest_precedence() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".tavola"), "host=file.example.com\nport=3310\n").unwrap();

    let dir = Dir::new(
        tmp.path(),
        "production",
        cli(&[("host", "cli.example.com")]),
    )
    .unwrap();
    assert_eq!(dir.config.get("host"), "cli.example.com");
    assert_eq!(dir.config.get("port"), "3310");

    assert!(dir.config.on_cli("host"));
    assert!(!dir.config.on_cli("port"));
    assert!(dir.config.changed("port"));
    assert_eq!(*dir.config.source("host"), Source::Cli);
}

#[test]
fn test_environment_sections_and_top_region() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".tavola"),
        "# shared across environments\nuser=shared\n\n[production]\nhost=prod.example.com\n\n[staging]\nhost=staging.example.com\nuser=staging_rw\n",
    )
    .unwrap();

    let prod = Dir::new(tmp.path(), "production", cli(&[])).unwrap();
    assert_eq!(prod.config.get("host"), "prod.example.com");
    assert_eq!(prod.config.get("user"), "shared");

    let staging = Dir::new(tmp.path(), "staging", cli(&[])).unwrap();
    assert_eq!(staging.config.get("host"), "staging.example.com");
    assert_eq!(staging.config.get("user"), "staging_rw");

    // どのセクションにも一致しない環境はtop領域のみを見る
    let other = Dir::new(tmp.path(), "qa", cli(&[])).unwrap();
    assert_eq!(other.config.get("host"), "");
    assert_eq!(other.config.get("user"), "shared");
}

#[test]
fn test_typed_accessors_through_chain() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".tavola"),
        "safe-below-size=10M\nconcurrent-instances=4\ninclude-auto-inc\n",
    )
    .unwrap();

    let dir = Dir::new(tmp.path(), "production", cli(&[])).unwrap();
    assert_eq!(
        dir.config.get_bytes("safe-below-size").unwrap(),
        10 * 1024 * 1024
    );
    assert_eq!(dir.config.get_int("concurrent-instances").unwrap(), 4);
    // 値なしの裸のキーは真として扱われる
    assert!(dir.config.get_bool("include-auto-inc").unwrap());
}

#[test]
fn test_unknown_cli_option_rejected() {
    let tmp = TempDir::new().unwrap();
    let result = Dir::new(tmp.path(), "production", cli(&[("no-such-thing", "1")]));
    assert!(result.is_err());
}
