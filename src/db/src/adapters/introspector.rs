// スキーマイントロスペクター
//
// 稼働中のインスタンスからスキーマモデルを構築します。テーブル定義の
// 正としてSHOW CREATE TABLEのテキストを使用し、それを解析したモデルの
// 再出力が元テキストと一致しない場合、そのテーブルはunsupportedに
// なります（モデル化できない構文の取りこぼし防止）。

use anyhow::{Context, Result};
use sqlx::Row;
use tracing::debug;

use tavola_core::core::schema::{escape_identifier, Schema, Table};

use crate::adapters::instance::Instance;
use crate::services::schema_parser::parse_create_table;

/// インスタンスからスキーマを読み取る
#[derive(Debug, Clone, Default)]
pub struct Introspector;

impl Introspector {
    /// 新しいIntrospectorを作成
    pub fn new() -> Self {
        Self
    }

    /// 指定スキーマのモデルを構築
    ///
    /// スキーマが存在しない場合は `Ok(None)` を返します。
    pub async fn introspect_schema(
        &self,
        instance: &Instance,
        name: &str,
    ) -> Result<Option<Schema>> {
        let Some((char_set, collation)) = instance
            .schema_char_set_and_collation(name)
            .await
            .with_context(|| format!("Unable to introspect schema {} on {}", name, instance))?
        else {
            return Ok(None);
        };

        let mut schema = Schema::new(name, char_set, collation);
        for table_name in self.table_names(instance, name).await? {
            let table = self.introspect_table(instance, name, &table_name).await?;
            schema.add_table(table);
        }
        Ok(Some(schema))
    }

    /// スキーマ内のベーステーブル名を列挙
    async fn table_names(&self, instance: &Instance, schema: &str) -> Result<Vec<String>> {
        let pool = instance.pool("").await?;
        let rows = sqlx::query(
            "SELECT TABLE_NAME FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
        )
        .bind(schema)
        .fetch_all(&pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(Into::into))
            .collect()
    }

    /// 1テーブルのモデルを構築
    async fn introspect_table(
        &self,
        instance: &Instance,
        schema: &str,
        table_name: &str,
    ) -> Result<Table> {
        let pool = instance.pool(schema).await?;
        let stmt = format!(
            "SHOW CREATE TABLE {}.{}",
            escape_identifier(schema),
            escape_identifier(table_name)
        );
        let row = sqlx::query(&stmt).fetch_one(&pool).await?;
        let create_text: String = row.try_get(1)?;

        let mut table = match parse_create_table(&create_text) {
            Ok(table) => table,
            Err(e) => {
                debug!(table = table_name, error = %e, "Table definition not parseable; treating as unsupported");
                let mut table = Table::new(table_name);
                table.create_statement = create_text.clone();
                table.supported = false;
                return Ok(table);
            }
        };

        // 再出力が元テキストと一致しなければALTER生成の対象にしない
        if table.supported {
            let regenerated = table.generated_create_statement(true);
            if regenerated != create_text.trim_end_matches(';').trim_end() {
                debug!(
                    table = table_name,
                    "SHOW CREATE TABLE output does not round-trip; treating as unsupported"
                );
                table.supported = false;
            }
        }
        table.create_statement = create_text;
        Ok(table)
    }
}
