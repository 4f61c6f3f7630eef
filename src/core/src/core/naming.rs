// 命名ポリシー
//
// アプリケーション名と関連パスの単一ソースを提供します。

/// 現行アプリケーション名
pub const APP_NAME: &str = "tavola";

/// 管理ディレクトリごとのオプションファイル名
pub const OPTION_FILE: &str = ".tavola";

/// システム全体のグローバル設定ファイル
pub const GLOBAL_OPTION_FILE: &str = "/etc/tavola";

/// ホームディレクトリ直下のグローバル設定ファイル名
pub const HOME_OPTION_FILE: &str = ".tavola";

/// バイナリ名
pub const BINARY_NAME: &str = "tavola";
