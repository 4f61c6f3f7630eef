// エラー型定義
//
// アプリケーション全体で使用されるカスタムエラー型と終了コードを提供します。
// thiserrorを使用して、ConfigError, SqlFileError, DiffError を定義します。

use std::fmt;
use thiserror::Error;

/// プロセス終了コード
///
/// 数値が大きいほど深刻度が高く、複数ターゲットの結果は最大値で集約されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ExitCode {
    /// 正常終了
    Success = 0,
    /// 差分を検出（実行は行っていない）
    DifferencesFound = 1,
    /// リソースを作成できない
    CantCreate = 2,
    /// 不正な入力データ
    BadInput = 4,
    /// 不正な設定
    BadConfig = 16,
    /// 実行全体を中断する致命的エラー
    FatalError = 64,
    /// 一部のターゲットのみ失敗
    PartialError = 128,
}

impl ExitCode {
    /// プロセス終了コードとしての数値
    pub fn value(self) -> i32 {
        self as i32
    }

    /// 2つの終了コードを深刻度の高い方に集約
    pub fn combine(self, other: ExitCode) -> ExitCode {
        self.max(other)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "Success",
            ExitCode::DifferencesFound => "DifferencesFound",
            ExitCode::CantCreate => "CantCreate",
            ExitCode::BadInput => "BadInput",
            ExitCode::BadConfig => "BadConfig",
            ExitCode::FatalError => "FatalError",
            ExitCode::PartialError => "PartialError",
        };
        write!(f, "{} ({})", name, self.value())
    }
}

/// 終了コードとメッセージの組
///
/// コマンドハンドラーはエラー時にこの型を anyhow のチェーンに載せ、
/// main がダウンキャストしてプロセス終了コードを決定します。
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExitValue {
    pub code: ExitCode,
    pub message: String,
}

impl ExitValue {
    /// 新しいExitValueを作成
    pub fn new(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// 設定エラー
///
/// オプションファイルの解析やオプション値の型変換で発生するエラーを表現します。
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Unknown option name
    #[error("Unknown option \"{name}\"")]
    UnknownOption {
        /// オプション名
        name: String,
    },

    /// Malformed line in an option file
    #[error("Malformed line in {path} at line {line}: {content}")]
    MalformedLine {
        /// ファイルパス
        path: String,
        /// 行番号（1始まり）
        line: usize,
        /// 問題の行
        content: String,
    },

    /// Invalid section name
    #[error("Invalid section name \"{name}\": may not contain [, ], or line breaks")]
    InvalidSectionName {
        /// セクション名
        name: String,
    },

    /// Option value cannot be parsed as the requested type
    #[error("Invalid value for option \"{option}\": \"{value}\" ({reason})")]
    InvalidValue {
        /// オプション名
        option: String,
        /// 指定された値
        value: String,
        /// 失敗の理由
        reason: String,
    },

    /// A required option is missing
    #[error("Option \"{option}\" is required {context}")]
    MissingRequired {
        /// オプション名
        option: String,
        /// 何に必要か
        context: String,
    },
}

impl ConfigError {
    /// このエラーに対応する終了コード
    ///
    /// ignore-table のような利用者データ由来の値は BadInput、
    /// それ以外の設定問題は BadConfig になります。
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ConfigError::InvalidValue { option, .. } if option == "ignore-table" => {
                ExitCode::BadInput
            }
            _ => ExitCode::BadConfig,
        }
    }
}

/// SQLファイルのエラー
///
/// `*.sql` ファイルが単一のCREATE TABLE文でない場合に設定されます。
/// この状態のファイルは実行・ALTER対象から除外されます。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlFileError {
    /// File contains no statement
    #[error("File is empty or contains no SQL statement")]
    Empty,

    /// File contains more than one statement
    #[error("File contains multiple SQL statements; expected exactly one CREATE TABLE")]
    MultipleStatements,

    /// The single statement is not CREATE TABLE
    #[error("File does not contain a CREATE TABLE statement")]
    NotCreateTable,

    /// The statement could not be parsed
    #[error("SQL parse error: {0}")]
    ParseFailure(String),
}

/// 差分からDDL文を構築する際のエラー
#[derive(Debug, Clone, Error)]
pub enum DiffError {
    /// The diff is unsafe and unsafe operations are not allowed
    #[error("{statement} is unsafe; use --allow-unsafe or --safe-below-size to permit")]
    UnsafeDiff {
        /// 該当するDDL文
        statement: String,
    },

    /// The table cannot be altered because its definition does not round-trip
    #[error("Table `{table}` uses features not supported for ALTER generation")]
    UnsupportedAlter {
        /// テーブル名
        table: String,
    },

    /// The diff variant has no statement form
    #[error("Diff type {kind} is not supported")]
    UnsupportedDiffType {
        /// バリアント名
        kind: &'static str,
    },
}
