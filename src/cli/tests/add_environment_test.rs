// add-environmentコマンドのテスト
//
// データベース接続なしで完結するオプションファイル操作を検証します。

mod common;

use common::{context_for, read_file, setup_managed_tree};
use tavola::cli::commands::add_environment::{
    AddEnvironmentCommand, AddEnvironmentCommandHandler,
};
use tavola::cli::OutputFormat;
use tavola::core::error::{ExitCode, ExitValue};

fn command(
    dir: &std::path::Path,
    environment: &str,
    cli: &[(&str, &str)],
) -> AddEnvironmentCommand {
    AddEnvironmentCommand {
        context: context_for(dir, environment, cli),
        format: OutputFormat::Text,
    }
}

fn expect_bad_config(result: anyhow::Result<tavola::cli::commands::CommandResult>) {
    let err = result.unwrap_err();
    let exit = err
        .downcast_ref::<ExitValue>()
        .unwrap_or_else(|| panic!("expected ExitValue, got: {:#}", err));
    assert_eq!(exit.code, ExitCode::BadConfig);
}

#[tokio::test]
async fn test_add_environment_success() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(&base, "staging", &[("host", "my.staging.db.com")]);
    let result = handler.execute(&cmd).await.unwrap();
    assert_eq!(result.code, ExitCode::Success);

    let contents = read_file(&base.join(".tavola"));
    assert!(contents.contains("[staging]\nhost=my.staging.db.com\nport=3306\n"));
    // 既存セクションは保持される
    assert!(contents.starts_with("[production]\nhost=db.example.com\n"));
}

#[tokio::test]
async fn test_add_environment_nonstandard_port_and_user() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(
        &base,
        "ci",
        &[("host", "my.ci.db.com"), ("port", "3307"), ("user", "foobar")],
    );
    handler.execute(&cmd).await.unwrap();

    let contents = read_file(&base.join(".tavola"));
    assert!(contents.contains("[ci]\nhost=my.ci.db.com\nport=3307\nuser=foobar\n"));
}

#[tokio::test]
async fn test_add_environment_localhost_socket() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(
        &base,
        "development",
        &[("host", "localhost"), ("socket", "/var/lib/mysql/mysql.sock")],
    );
    handler.execute(&cmd).await.unwrap();

    let contents = read_file(&base.join(".tavola"));
    assert!(contents.contains("[development]\nhost=localhost\nsocket=/var/lib/mysql/mysql.sock\n"));
    assert!(!contents.contains("[development]\nhost=localhost\nport="));
}

#[tokio::test]
async fn test_add_environment_missing_dir_fails() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let missing = base.join("does/not/exist");
    let cmd = command(&missing, "staging", &[("host", "my.staging.db.com")]);
    expect_bad_config(handler.execute(&cmd).await);
}

#[tokio::test]
async fn test_add_environment_requires_existing_option_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(tmp.path(), "staging", &[("host", "my.staging.db.com")]);
    expect_bad_config(handler.execute(&cmd).await);
}

#[tokio::test]
async fn test_add_environment_invalid_name_fails() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(&base, "[staging]", &[("host", "my.staging.db.com")]);
    expect_bad_config(handler.execute(&cmd).await);
}

#[tokio::test]
async fn test_add_environment_existing_name_fails() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(&base, "production", &[("host", "my.staging.db.com")]);
    expect_bad_config(handler.execute(&cmd).await);
}

#[tokio::test]
async fn test_add_environment_requires_host_on_cli() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();

    let cmd = command(&base, "staging", &[]);
    expect_bad_config(handler.execute(&cmd).await);
}

#[tokio::test]
async fn test_failed_commands_leave_file_untouched() {
    let (_tmp, base, _) = setup_managed_tree("product").unwrap();
    let handler = AddEnvironmentCommandHandler::new();
    let before = read_file(&base.join(".tavola"));

    let cmd = command(&base, "production", &[("host", "x")]);
    let _ = handler.execute(&cmd).await;
    let cmd = command(&base, "[bad]", &[("host", "x")]);
    let _ = handler.execute(&cmd).await;
    let cmd = command(&base, "staging", &[]);
    let _ = handler.execute(&cmd).await;

    assert_eq!(read_file(&base.join(".tavola")), before);
}
