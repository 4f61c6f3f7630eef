// Tavolaライブラリのエントリーポイント
//
// ワークスペース分割後も既存のパス互換を保つため、各crateを再公開する。

pub mod cli;

pub use tavola_core::core;
pub use tavola_db::{adapters, services};
