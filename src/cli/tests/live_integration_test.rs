// 稼働中のMySQLサーバーに対する統合テスト
//
// TAVOLA_TEST_DSN 環境変数（例: mysql://root:pw@127.0.0.1:3306）が
// 設定されている場合のみ実行されます。未設定時は黙ってスキップします。

use tavola::adapters::instance::Instance;
use tavola::adapters::introspector::Introspector;

/// TAVOLA_TEST_DSNからInstanceを構築（未設定ならNone）
fn test_instance() -> Option<Instance> {
    let dsn = std::env::var("TAVOLA_TEST_DSN").ok()?;
    let rest = dsn.strip_prefix("mysql://")?;
    let (auth, host_part) = rest.rsplit_once('@')?;
    let (user, password) = auth.split_once(':').unwrap_or((auth, ""));
    let (host, port) = match host_part.rsplit_once(':') {
        Some((h, p)) => (h.to_string(), p.parse::<u16>().ok()?),
        None => (host_part.to_string(), 3306),
    };
    Some(Instance::new(host, port, None, user, password))
}

#[tokio::test]
async fn test_connect_and_introspect_round_trip() {
    let Some(instance) = test_instance() else {
        eprintln!("TAVOLA_TEST_DSN is not set; skipping live integration test");
        return;
    };

    instance.check_connect().await.unwrap();

    let pool = instance.pool("").await.unwrap();
    sqlx::query("DROP DATABASE IF EXISTS tavola_it")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("CREATE DATABASE tavola_it")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE tavola_it.widgets (\
           id int unsigned NOT NULL AUTO_INCREMENT, \
           name varchar(50) NOT NULL, \
           PRIMARY KEY (id))",
    )
    .execute(&pool)
    .await
    .unwrap();

    // イントロスペクトしたテーブルはSHOW CREATE TABLEの出力を正準形として
    // 再現できる（supported）こと
    let schema = Introspector::new()
        .introspect_schema(&instance, "tavola_it")
        .await
        .unwrap()
        .expect("schema should exist");
    assert_eq!(schema.tables.len(), 1);
    let table = &schema.tables[0];
    assert_eq!(table.name, "widgets");
    assert!(table.supported, "create: {}", table.create_statement);

    // サイズは空テーブルで常に0
    let size = instance.table_size("tavola_it", "widgets").await.unwrap();
    assert_eq!(size, 0);

    sqlx::query("DROP DATABASE tavola_it")
        .execute(&pool)
        .await
        .unwrap();
    instance.close_pools().await;
}
