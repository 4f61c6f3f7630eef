// コマンドハンドラー層
// 各CLIコマンドの実装

pub mod add_environment;
pub mod diff;
pub mod init;
pub mod lint;
pub mod pull;
pub mod push;

use crate::cli::OutputFormat;
use anyhow::Result;
use serde::Serialize;
use tavola_core::core::error::ExitCode;

/// コマンドの出力と終了コードの組
///
/// DifferencesFoundのような「エラーではないが0以外の終了コード」を
/// 表現するため、成功経路でもコードを運びます。
#[derive(Debug)]
pub struct CommandResult {
    /// 表示する出力
    pub output: String,
    /// プロセス終了コード
    pub code: ExitCode,
}

impl CommandResult {
    /// 正常終了の結果を作成
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            code: ExitCode::Success,
        }
    }

    /// 指定コードの結果を作成
    pub fn with_code(output: impl Into<String>, code: ExitCode) -> Self {
        Self {
            output: output.into(),
            code,
        }
    }
}

/// コマンド出力を構造化するためのトレイト
///
/// 各コマンドの出力構造体はこのトレイトを実装し、
/// テキスト表示とJSONシリアライズの両方をサポートする。
pub trait CommandOutput: Serialize {
    /// 人間向けテキスト表示を生成する
    fn to_text(&self) -> String;
}

/// OutputFormat に応じて出力文字列を生成する
///
/// - `Text`: `CommandOutput::to_text()` を使用
/// - `Json`: `serde_json` でシリアライズ
pub fn render_output<T: CommandOutput>(output: &T, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(output.to_text()),
        OutputFormat::Json => serde_json::to_string_pretty(output)
            .map_err(|e| anyhow::anyhow!("JSON serialization error: {}", e)),
    }
}

/// エラーレスポンスの構造化出力
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
    /// エラーメッセージ
    pub error: String,
    /// 終了コード
    pub exit_code: i32,
}

impl ErrorOutput {
    /// エラーメッセージと終了コードから ErrorOutput を作成
    pub fn new(error: impl Into<String>, code: ExitCode) -> Self {
        Self {
            error: error.into(),
            exit_code: code.value(),
        }
    }

    /// JSON 文字列にシリアライズ
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", self.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_output_json_serialization() {
        let error = ErrorOutput::new("Option file not found", ExitCode::BadConfig);
        let json = error.to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["error"], "Option file not found");
        assert_eq!(parsed["exit_code"], 16);
    }

    #[test]
    fn test_render_output_text_mode() {
        #[derive(Debug, Serialize)]
        struct TestOutput {
            value: i32,
        }
        impl CommandOutput for TestOutput {
            fn to_text(&self) -> String {
                format!("value is {}", self.value)
            }
        }
        let out = TestOutput { value: 7 };
        assert_eq!(
            render_output(&out, &OutputFormat::Text).unwrap(),
            "value is 7"
        );
        assert!(render_output(&out, &OutputFormat::Json)
            .unwrap()
            .contains("\"value\": 7"));
    }
}
