// 外部コマンド実行アダプター
//
// ラッパーコマンド（alter-wrapper / ddl-wrapper / host-wrapper）の
// テンプレート展開と /bin/sh -c 経由での実行を提供します。
// テンプレートは {NAME} トークンの小さな文法として解釈し、未知の名前は
// エラーにします（単純な文字列置換は行わない）。

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// 外部コマンド実行のエラー
#[derive(Debug, Error)]
pub enum ShellOutError {
    /// Unknown template variable
    #[error("Unknown variable {{{name}}} in wrapper command")]
    UnknownVariable {
        /// 変数名
        name: String,
    },

    /// Unbalanced braces in the template
    #[error("Unbalanced braces in wrapper command near position {position}")]
    UnbalancedBrace {
        /// バイト位置
        position: usize,
    },

    /// The command could not be started
    #[error("Failed to launch command: {0}")]
    SpawnFailure(#[from] std::io::Error),

    /// The command exited with a nonzero status
    #[error("Command exited with status {code}")]
    NonZeroExit {
        /// 終了コード
        code: i32,
    },

    /// The command exceeded statement-timeout
    #[error("Command timed out after {seconds}s and was killed")]
    Timeout {
        /// タイムアウト秒数
        seconds: u64,
    },
}

/// テンプレート中の {NAME} トークンを展開
///
/// 変数名はASCII英数字とアンダースコアのみ。照合は大文字小文字を無視します。
/// `{{` と `}}` はリテラルのブレースにエスケープされます。
pub fn interpolate(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, ShellOutError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut idx = 0;

    while idx < bytes.len() {
        match bytes[idx] {
            b'{' => {
                if bytes.get(idx + 1) == Some(&b'{') {
                    out.push('{');
                    idx += 2;
                    continue;
                }
                let close = template[idx + 1..]
                    .find('}')
                    .map(|off| idx + 1 + off)
                    .ok_or(ShellOutError::UnbalancedBrace { position: idx })?;
                let name = &template[idx + 1..close];
                if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    return Err(ShellOutError::UnknownVariable {
                        name: name.to_string(),
                    });
                }
                let upper = name.to_ascii_uppercase();
                let value = vars
                    .get(&upper)
                    .ok_or(ShellOutError::UnknownVariable { name: upper.clone() })?;
                out.push_str(value);
                idx = close + 1;
            }
            b'}' => {
                if bytes.get(idx + 1) == Some(&b'}') {
                    out.push('}');
                    idx += 2;
                } else {
                    return Err(ShellOutError::UnbalancedBrace { position: idx });
                }
            }
            _ => {
                // マルチバイト文字の先頭を壊さないようchar単位で進める
                let ch = template[idx..].chars().next().unwrap();
                out.push(ch);
                idx += ch.len_utf8();
            }
        }
    }

    Ok(out)
}

/// /bin/sh -c で実行する外部コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOut {
    /// 展開済みのコマンド文字列
    pub command: String,
}

impl ShellOut {
    /// 展開済みコマンドからShellOutを作成
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// テンプレートと変数からShellOutを作成
    pub fn interpolated(
        template: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ShellOutError> {
        Ok(Self::new(interpolate(template, vars)?))
    }

    /// コマンドを実行
    ///
    /// stdoutはINFO、stderrはWARNでログ出力し、非ゼロ終了はエラーとします。
    /// `timeout_secs` が正の場合、超過時はプロセスグループごとkillします。
    pub async fn run(&self, timeout_secs: u64) -> Result<(), ShellOutError> {
        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();

        let output = if timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid).await;
                    }
                    return Err(ShellOutError::Timeout {
                        seconds: timeout_secs,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(command = %self.command, "{}", line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!(command = %self.command, "{}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ShellOutError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
            })
        }
    }

    /// 実行結果のstdoutを行単位で取得
    ///
    /// host-wrapper用。stderrはWARNでログ出力します。
    pub async fn run_capture_lines(&self, timeout_secs: u64) -> Result<Vec<String>, ShellOutError> {
        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();

        let output = if timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid).await;
                    }
                    return Err(ShellOutError::Timeout {
                        seconds: timeout_secs,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!(command = %self.command, "{}", line);
        }
        if !output.status.success() {
            return Err(ShellOutError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

impl std::fmt::Display for ShellOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)
    }
}

/// プロセスグループにSIGKILLを送る
///
/// process_group(0) で起動した子のpidはそのままpgidになっている。
async fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    {
        let _ = tokio::process::Command::new("kill")
            .arg("-9")
            .arg("--")
            .arg(format!("-{}", pid))
            .status()
            .await;
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_interpolate_basic_tokens() {
        let vars = vars(&[("HOST", "db1"), ("PORT", "3306"), ("SCHEMA", "product")]);
        let result =
            interpolate("osc --host={HOST} --port={PORT} -d {SCHEMA}", &vars).unwrap();
        assert_eq!(result, "osc --host=db1 --port=3306 -d product");
    }

    #[test]
    fn test_interpolate_is_case_insensitive() {
        let vars = vars(&[("HOST", "db1")]);
        assert_eq!(interpolate("{host}", &vars).unwrap(), "db1");
        assert_eq!(interpolate("{Host}", &vars).unwrap(), "db1");
    }

    #[test]
    fn test_interpolate_unknown_variable_errors() {
        let vars = vars(&[("HOST", "db1")]);
        let err = interpolate("{HOST} {NOPE}", &vars).unwrap_err();
        assert!(matches!(err, ShellOutError::UnknownVariable { name } if name == "NOPE"));
    }

    #[test]
    fn test_interpolate_brace_escapes() {
        let vars = vars(&[("HOST", "db1")]);
        assert_eq!(
            interpolate("awk '{{print $1}}' {HOST}", &vars).unwrap(),
            "awk '{print $1}' db1"
        );
    }

    #[test]
    fn test_interpolate_unbalanced_brace_errors() {
        let vars = vars(&[]);
        assert!(matches!(
            interpolate("oops {HOST", &vars),
            Err(ShellOutError::UnbalancedBrace { .. })
        ));
        assert!(matches!(
            interpolate("oops } here", &vars),
            Err(ShellOutError::UnbalancedBrace { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_logs_and_checks_exit_code() {
        assert!(ShellOut::new("true").run(0).await.is_ok());
        let err = ShellOut::new("exit 3").run(0).await.unwrap_err();
        assert!(matches!(err, ShellOutError::NonZeroExit { code: 3 }));
    }

    #[tokio::test]
    async fn test_run_capture_lines() {
        let lines = ShellOut::new("printf 'db1\\n\\n db2 \\n'")
            .run_capture_lines(0)
            .await
            .unwrap();
        assert_eq!(lines, vec!["db1".to_string(), "db2".to_string()]);
    }

    #[tokio::test]
    async fn test_run_timeout_kills_command() {
        let err = ShellOut::new("sleep 5").run(1).await.unwrap_err();
        assert!(matches!(err, ShellOutError::Timeout { seconds: 1 }));
    }
}
