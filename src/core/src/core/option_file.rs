// オプションファイル
//
// 管理ディレクトリごとの .tavola ファイル（INI形式）の解析と書き出し。
// セクション名は環境名に対応し、先頭セクションなし領域は全環境に適用されます。
// コメント・空行は保持され、書き出し時に元のセクション順を維持します。

use crate::core::error::ConfigError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// ファイル中の1行
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileLine {
    /// 空行（元の空白を保持）
    Blank(String),
    /// コメント行（元のテキストを保持）
    Comment(String),
    /// セクションヘッダー
    Section { name: String },
    /// オプション行。rawは未変更の元テキスト（変更時はNone）
    Option {
        key: String,
        value: String,
        raw: Option<String>,
    },
}

/// INI形式のオプションファイル
///
/// 読み込み時に行単位の構造を保持し、`write` で元の並びのまま書き戻します。
#[derive(Debug, Clone)]
pub struct OptionFile {
    path: PathBuf,
    lines: Vec<FileLine>,
}

/// セクション名の妥当性を検証
///
/// `[`、`]`、改行を含む名前は拒否します。空文字列はセクションなし領域を表すため許可。
pub fn validate_section_name(name: &str) -> Result<(), ConfigError> {
    if name.contains('[') || name.contains(']') || name.contains('\n') || name.contains('\r') {
        return Err(ConfigError::InvalidSectionName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl OptionFile {
    /// 空のオプションファイルを作成
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Vec::new(),
        }
    }

    /// ファイルパス
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文字列からオプションファイルを解析
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut lines = Vec::new();

        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let trimmed = line.trim();

            if trimmed.is_empty() {
                lines.push(FileLine::Blank(line.to_string()));
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                lines.push(FileLine::Comment(line.to_string()));
                continue;
            }
            if trimmed.starts_with('[') {
                if !trimmed.ends_with(']') {
                    return Err(ConfigError::MalformedLine {
                        path: path.display().to_string(),
                        line: idx + 1,
                        content: line.to_string(),
                    });
                }
                let name = trimmed[1..trimmed.len() - 1].trim().to_string();
                validate_section_name(&name)?;
                lines.push(FileLine::Section { name });
                continue;
            }

            let (key, value) = parse_option_line(trimmed).ok_or_else(|| {
                ConfigError::MalformedLine {
                    path: path.display().to_string(),
                    line: idx + 1,
                    content: line.to_string(),
                }
            })?;
            lines.push(FileLine::Option {
                key,
                value,
                raw: Some(line.to_string()),
            });
        }

        Ok(Self { path, lines })
    }

    /// ファイルから読み込み
    pub fn read(path: impl Into<PathBuf>) -> Result<Self, io::Error> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        Self::parse(path, &content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// セクションが存在するか
    pub fn has_section(&self, name: &str) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l, FileLine::Section { name: n } if n == name))
    }

    /// いずれかのセクション（セクションなし領域を含む）がこのオプションを定義しているか
    pub fn some_section_has_option(&self, key: &str) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l, FileLine::Option { key: k, .. } if k == key))
    }

    /// 指定セクション内のオプション値を取得
    ///
    /// `section` が空文字列の場合はセクションなし領域を参照します。
    pub fn option_value(&self, section: &str, key: &str) -> Option<&str> {
        let mut current = String::new();
        let mut found = None;
        for line in &self.lines {
            match line {
                FileLine::Section { name } => current = name.clone(),
                FileLine::Option { key: k, value, .. } if current == section && k == key => {
                    found = Some(value.as_str());
                }
                _ => {}
            }
        }
        found
    }

    /// 指定環境に対する有効なオプション群
    ///
    /// セクションなし領域を基底とし、環境名と一致するセクションの値で上書きします。
    pub fn options_for_environment(&self, environment: &str) -> HashMap<String, String> {
        let mut top = HashMap::new();
        let mut env = HashMap::new();
        let mut current = String::new();

        for line in &self.lines {
            match line {
                FileLine::Section { name } => current = name.clone(),
                FileLine::Option { key, value, .. } => {
                    if current.is_empty() {
                        top.insert(key.clone(), value.clone());
                    } else if current == environment {
                        env.insert(key.clone(), value.clone());
                    }
                }
                _ => {}
            }
        }

        top.extend(env);
        top
    }

    /// セクション内のオプション値を設定
    ///
    /// 既存キーはその場で置換し、なければセクション末尾に追記します。
    /// セクション自体が存在しない場合はファイル末尾に追加します。
    pub fn set_value(
        &mut self,
        section: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        validate_section_name(section)?;

        // セクションの範囲 [start, end) を探す。topセクションは先頭から最初のヘッダーまで
        let mut start = if section.is_empty() { Some(0) } else { None };
        let mut end = self.lines.len();
        let mut current_is_target = section.is_empty();
        for (idx, line) in self.lines.iter().enumerate() {
            if let FileLine::Section { name } = line {
                if current_is_target {
                    end = idx;
                    current_is_target = false;
                }
                if name == section {
                    start = Some(idx + 1);
                    end = self.lines.len();
                    current_is_target = true;
                }
            }
        }

        match start {
            Some(start) => {
                // 既存キーを探して置換
                for line in &mut self.lines[start..end] {
                    if let FileLine::Option { key: k, value: v, raw } = line {
                        if k == key {
                            *v = value.to_string();
                            *raw = None;
                            return Ok(());
                        }
                    }
                }
                // セクション末尾の空行の手前に挿入
                let mut insert_at = end;
                while insert_at > start
                    && matches!(self.lines[insert_at - 1], FileLine::Blank(_))
                {
                    insert_at -= 1;
                }
                self.lines.insert(
                    insert_at,
                    FileLine::Option {
                        key: key.to_string(),
                        value: value.to_string(),
                        raw: None,
                    },
                );
            }
            None => {
                // 新規セクションはファイル末尾に追加
                if !self.lines.is_empty() {
                    self.lines.push(FileLine::Blank(String::new()));
                }
                self.lines.push(FileLine::Section {
                    name: section.to_string(),
                });
                self.lines.push(FileLine::Option {
                    key: key.to_string(),
                    value: value.to_string(),
                    raw: None,
                });
            }
        }
        Ok(())
    }

    /// ファイル内容を文字列化
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                FileLine::Blank(raw) | FileLine::Comment(raw) => out.push_str(raw),
                FileLine::Section { name } => {
                    out.push('[');
                    out.push_str(name);
                    out.push(']');
                }
                FileLine::Option { key, value, raw } => match raw {
                    Some(raw) => out.push_str(raw),
                    None => {
                        out.push_str(key);
                        if !value.is_empty() {
                            out.push('=');
                            out.push_str(value);
                        }
                    }
                },
            }
            out.push('\n');
        }
        out
    }

    /// ファイルへ書き出し（一時ファイル経由のアトミック置換）
    pub fn write(&self) -> Result<(), io::Error> {
        let tmp = self.path.with_extension("tavola-tmp");
        fs::write(&tmp, self.serialize())?;
        fs::rename(&tmp, &self.path)
    }

    /// 2つのファイルの内容が一致するか
    pub fn same_contents(&self, other: &OptionFile) -> bool {
        self.serialize() == other.serialize()
    }
}

/// `key=value` 形式の行を解析
///
/// 値なしの裸のキーは "1"（真）として扱う。インラインコメントは
/// 空白に続く `#` / `;` から行末まで（クォート内は除外）。
fn parse_option_line(line: &str) -> Option<(String, String)> {
    let effective = strip_inline_comment(line);
    let effective = effective.trim();
    if effective.is_empty() {
        return None;
    }

    match effective.split_once('=') {
        Some((key, value)) => {
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return None;
            }
            Some((key, unquote(value.trim()).to_string()))
        }
        None => {
            let key = effective.to_ascii_lowercase();
            if key.contains(char::is_whitespace) {
                return None;
            }
            Some((key, "1".to_string()))
        }
    }
}

/// クォート外にある、空白に続くコメント開始文字以降を落とす
fn strip_inline_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_is_space = true;
    for (idx, ch) in line.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                } else if (ch == '#' || ch == ';') && prev_is_space {
                    return &line[..idx];
                }
            }
        }
        prev_is_space = ch.is_whitespace();
    }
    line
}

/// 値の前後クォートを1組だけ外す
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'\'' || first == b'"') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
