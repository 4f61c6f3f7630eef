// 実行器
//
// ターゲットごとのDDL文リストを §差分順序のまま対象インスタンスに適用し、
// ターゲット単位の結果を最悪値で集約します。並列度はターゲット粒度で、
// concurrent-instances が同時に動くインスタンス数を制限します。
// 1インスタンス内のターゲット、および1ターゲット内の文は直列です。
//
// SIGINTで起動されるキャンセルフラグは新規ディスパッチのみを止め、
// 実行中の文は完走させます。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::schema::Schema;
use tavola_core::core::schema_diff::StatementModifiers;

use crate::adapters::instance::Instance;
use crate::services::ddl_statement::DdlStatement;
use crate::services::schema_diff_detector::SchemaDiffDetector;
use crate::services::target::{Target, TargetPlan};

/// 1ターゲットの実行結果
#[derive(Debug)]
pub struct TargetReport {
    /// 対象インスタンスの表示名
    pub instance: String,
    /// 対象スキーマ名
    pub schema_name: String,
    /// このターゲットの終了コード
    pub code: ExitCode,
    /// dry-run時に表示する文（実行時は実行済みの文）
    pub statements: Vec<String>,
    /// エラー・注記
    pub messages: Vec<String>,
}

/// DDL実行器
#[derive(Debug, Clone)]
pub struct Executor {
    /// 同時に処理するインスタンス数
    pub concurrent_instances: usize,
    /// 文ごとのタイムアウト（秒、0で無制限）
    pub statement_timeout: u64,
    /// 実行せずに文を表示するか
    pub dry_run: bool,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    /// 新しいExecutorを作成
    pub fn new(concurrent_instances: usize, statement_timeout: u64, dry_run: bool) -> Self {
        Self {
            concurrent_instances: concurrent_instances.max(1),
            statement_timeout,
            dry_run,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// キャンセルフラグを取得
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// SIGINTでキャンセルフラグを立てるハンドラを登録
    pub fn install_sigint_handler(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Interrupt received; finishing in-flight statements");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    /// 全ターゲットを処理して結果を返す
    ///
    /// ターゲットはインスタンスごとにグループ化され、同一サーバーを指す
    /// Instance値は正準化されて接続プールを共有します。
    pub async fn run(
        &self,
        plans: Vec<TargetPlan>,
        mods: StatementModifiers,
    ) -> Result<Vec<TargetReport>> {
        // 同一サーバーのInstanceを正準化してグループ化
        let mut groups: Vec<(Instance, Vec<TargetPlan>)> = Vec::new();
        for mut plan in plans {
            match groups.iter_mut().find(|(inst, _)| *inst == plan.instance) {
                Some((canonical, group)) => {
                    plan.instance = canonical.clone();
                    group.push(plan);
                }
                None => groups.push((plan.instance.clone(), vec![plan])),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrent_instances));
        let mut join_set = JoinSet::new();

        for (instance, group) in groups {
            let semaphore = semaphore.clone();
            let executor = self.clone();
            let mods = mods.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let mut reports = Vec::new();
                for plan in group {
                    reports.push(executor.run_target(&plan, &mods).await);
                }
                instance.close_pools().await;
                reports
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            reports.extend(joined?);
        }
        Ok(reports)
    }

    /// 1ターゲットを処理
    async fn run_target(&self, plan: &TargetPlan, mods: &StatementModifiers) -> TargetReport {
        let mut report = TargetReport {
            instance: plan.instance.to_string(),
            schema_name: plan.schema_name.clone(),
            code: ExitCode::Success,
            statements: Vec::new(),
            messages: Vec::new(),
        };

        if self.cancel.load(Ordering::SeqCst) {
            report.code = ExitCode::FatalError;
            report
                .messages
                .push("Skipped due to interrupt".to_string());
            return report;
        }

        let target = match plan.produce().await {
            Ok(target) => target,
            Err(e) => {
                report.code = exit_code_for(&e);
                report.messages.push(e.to_string());
                return report;
            }
        };

        // 単一のCREATE TABLE文でないファイルはターゲットを失敗させる
        if !target.bad_files.is_empty() {
            for file in &target.bad_files {
                report.messages.push(format!(
                    "{}: {}",
                    file.file_name,
                    file.error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default()
                ));
            }
            report.code = ExitCode::FatalError;
            return report;
        }

        // スキーマが存在しなければ作成（削除は決して行わない）
        let instance_schema = match &target.schema_from_instance {
            Some(schema) => schema.clone(),
            None => {
                let stmt = format!(
                    "CREATE DATABASE {}",
                    tavola_core::core::schema::escape_identifier(&target.schema_name)
                );
                if self.dry_run {
                    report.statements.push(format!("{};", stmt));
                    report.code = report.code.combine(ExitCode::DifferencesFound);
                } else if let Err(e) = target
                    .instance
                    .create_schema(
                        &target.schema_name,
                        Some(&target.schema_from_dir.char_set),
                        (!target.schema_from_dir.collation.is_empty())
                            .then_some(target.schema_from_dir.collation.as_str()),
                    )
                    .await
                {
                    report.code = ExitCode::PartialError;
                    report
                        .messages
                        .push(format!("Unable to create schema: {}", e));
                    return report;
                } else {
                    info!(schema = %target.schema_name, instance = %target.instance, "Created schema");
                }
                Schema::new(
                    &target.schema_name,
                    target.schema_from_dir.char_set.clone(),
                    target.schema_from_dir.collation.clone(),
                )
            }
        };

        let diff = SchemaDiffDetector::new().detect_diff(Some(&instance_schema), &target.schema_from_dir);

        // スキーマ単位の文字セット変更
        if let Some(change) = &diff.char_set_change {
            let stmt = change.statement(&target.schema_name);
            self.apply_statement_text(&target, &stmt, &mut report).await;
        }

        // テーブル差分を順に処理。ターゲット内は常に直列
        for table_diff in &diff.table_diffs {
            if self.cancel.load(Ordering::SeqCst) {
                report.code = report.code.combine(ExitCode::FatalError);
                report
                    .messages
                    .push("Remaining statements skipped due to interrupt".to_string());
                break;
            }

            let Some(mut ddl) = DdlStatement::build(table_diff, mods.clone(), &target).await
            else {
                continue;
            };

            if self.dry_run {
                let rendered = ddl.render();
                if !rendered.is_empty() {
                    report.statements.push(rendered);
                }
                report.code = report.code.combine(if ddl.is_unsafe_denied() {
                    ExitCode::FatalError
                } else {
                    ExitCode::DifferencesFound
                });
                if let Some(err) = &ddl.err {
                    report.messages.push(err.to_string());
                }
                continue;
            }

            if let Some(err) = &ddl.err {
                // ビルダーが吸収したエラー。実行せずに結果へ反映する
                report.messages.push(err.to_string());
                report.code = report.code.combine(if ddl.is_unsafe_denied() {
                    ExitCode::FatalError
                } else {
                    ExitCode::PartialError
                });
                continue;
            }

            match ddl.execute(self.statement_timeout).await {
                Ok(()) => {
                    info!(
                        instance = %target.instance,
                        schema = %target.schema_name,
                        "Applied: {}",
                        ddl.render()
                    );
                    report.statements.push(ddl.render());
                }
                Err(e) => {
                    error!(
                        instance = %target.instance,
                        schema = %target.schema_name,
                        "Failed: {}",
                        e
                    );
                    report.messages.push(e.to_string());
                    report.code = report.code.combine(ExitCode::PartialError);
                }
            }
        }

        report
    }

    /// 生のSQL文字列を適用（スキーマ単位のDDL用）
    async fn apply_statement_text(
        &self,
        target: &Target,
        stmt: &str,
        report: &mut TargetReport,
    ) {
        if self.dry_run {
            report.statements.push(format!("{};", stmt));
            report.code = report.code.combine(ExitCode::DifferencesFound);
            return;
        }
        match target
            .instance
            .execute_ddl("", stmt, self.statement_timeout)
            .await
        {
            Ok(()) => {
                info!(instance = %target.instance, "Applied: {};", stmt);
                report.statements.push(format!("{};", stmt));
            }
            Err(e) => {
                report.messages.push(e.to_string());
                report.code = report.code.combine(ExitCode::PartialError);
            }
        }
    }
}

/// anyhowエラーからターゲットの終了コードを決める
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<ExitValue>()
        .map(|ev| ev.code)
        .unwrap_or(ExitCode::FatalError)
}

/// 全レポートからプロセス終了コードを集約
pub fn combined_exit_code(reports: &[TargetReport]) -> ExitCode {
    reports
        .iter()
        .fold(ExitCode::Success, |acc, r| acc.combine(r.code))
}
