// tavola-dbライブラリのエントリーポイント
//
// データベース接続・外部コマンドのアダプターと、ディレクトリ走査・差分検出・
// DDL構築・実行のサービス群を提供する。

pub mod adapters;
pub mod services;
