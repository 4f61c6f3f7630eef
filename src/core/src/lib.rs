// tavola-coreライブラリのエントリーポイント
//
// 純粋なドメインロジックのみを含む。I/Oや非同期処理はtavola-db側に置く。

pub mod core;
