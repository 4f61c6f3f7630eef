// 設定チェーン
//
// 組み込みデフォルト < グローバル設定ファイル < ディレクトリチェーンの
// オプションファイル < CLIフラグ、の順に優先度が上がる不変のレイヤー構造。
// 各レイヤーに出自タグを付け、`changed` / `on_cli` の述語を可能にします。

use crate::core::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

/// 設定値の出自
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// 組み込みデフォルト
    Default,
    /// グローバル設定ファイル（/etc/tavola, ~/.tavola）
    GlobalFile(PathBuf),
    /// ディレクトリのオプションファイル
    DirFile(PathBuf),
    /// コマンドライン
    Cli,
}

/// 既知のオプションとその組み込みデフォルト値
///
/// CLIで未知のオプション名が指定された場合は検証エラーになります。
const OPTION_DEFAULTS: &[(&str, &str)] = &[
    ("host", ""),
    ("port", "3306"),
    ("socket", "/tmp/mysql.sock"),
    ("user", "root"),
    ("password", ""),
    ("schema", ""),
    ("default-character-set", ""),
    ("default-collation", ""),
    ("allow-unsafe", "0"),
    ("safe-below-size", "0"),
    ("alter-algorithm", ""),
    ("alter-lock", ""),
    ("alter-wrapper", ""),
    ("alter-wrapper-min-size", "0"),
    ("ddl-wrapper", ""),
    ("host-wrapper", ""),
    ("concurrent-instances", "1"),
    ("ignore-table", ""),
    ("include-auto-inc", "0"),
    ("brief", "0"),
    ("dry-run", "0"),
    ("skip-dry-run", "0"),
    ("statement-timeout", "0"),
];

/// オプション名が既知か
pub fn known_option(name: &str) -> bool {
    OPTION_DEFAULTS.iter().any(|(k, _)| *k == name)
}

/// 有効な設定
///
/// レイヤーは優先度の昇順に保持され、`get` は最後に値を設定した
/// レイヤーの値を返します。構築後は不変です。
#[derive(Debug, Clone)]
pub struct Config {
    layers: Vec<(Source, HashMap<String, String>)>,
}

impl Config {
    /// デフォルト値のみからなる設定を作成
    pub fn new() -> Self {
        let defaults = OPTION_DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            layers: vec![(Source::Default, defaults)],
        }
    }

    /// レイヤーを追加した新しい設定を返す
    ///
    /// CLIレイヤーより後のファイルレイヤー追加は想定しない。
    pub fn with_layer(mut self, source: Source, values: HashMap<String, String>) -> Self {
        self.layers.push((source, values));
        self
    }

    /// CLIレイヤーを追加した新しい設定を返す
    ///
    /// 未知のオプション名は `ConfigError::UnknownOption` で拒否します。
    pub fn with_cli(self, values: HashMap<String, String>) -> Result<Self, ConfigError> {
        for key in values.keys() {
            if !known_option(key) {
                return Err(ConfigError::UnknownOption { name: key.clone() });
            }
        }
        Ok(self.with_layer(Source::Cli, values))
    }

    /// 有効値を取得
    ///
    /// 未知のオプションは空文字列を返します。
    pub fn get(&self, key: &str) -> &str {
        for (_, values) in self.layers.iter().rev() {
            if let Some(v) = values.get(key) {
                return v;
            }
        }
        ""
    }

    /// デフォルト以外のレイヤーがこのオプションを設定したか
    pub fn changed(&self, key: &str) -> bool {
        self.layers
            .iter()
            .any(|(source, values)| *source != Source::Default && values.contains_key(key))
    }

    /// CLIがこのオプションを明示的に設定したか
    pub fn on_cli(&self, key: &str) -> bool {
        self.layers
            .iter()
            .any(|(source, values)| *source == Source::Cli && values.contains_key(key))
    }

    /// 値を設定したレイヤーの出自を返す
    pub fn source(&self, key: &str) -> &Source {
        for (source, values) in self.layers.iter().rev() {
            if values.contains_key(key) {
                return source;
            }
        }
        &Source::Default
    }

    /// 真偽値として取得
    ///
    /// 1/true/on/yes と 0/false/off/no（および空文字列）を受理します。
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        let value = self.get(key);
        match value.to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "off" | "no" => Ok(false),
            "1" | "true" | "on" | "yes" => Ok(true),
            _ => Err(self.invalid(key, "not a boolean")),
        }
    }

    /// 整数として取得
    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        let value = self.get(key);
        if value.is_empty() {
            return Ok(0);
        }
        value
            .parse::<i64>()
            .map_err(|_| self.invalid(key, "not an integer"))
    }

    /// バイト数として取得
    ///
    /// 末尾の K / M / G サフィックス（2進、大文字小文字不問）を受理します。
    pub fn get_bytes(&self, key: &str) -> Result<u64, ConfigError> {
        let value = self.get(key).trim().to_string();
        if value.is_empty() {
            return Ok(0);
        }
        let (digits, multiplier) = match value.chars().last().unwrap().to_ascii_uppercase() {
            'K' => (&value[..value.len() - 1], 1024u64),
            'M' => (&value[..value.len() - 1], 1024 * 1024),
            'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
            _ => (value.as_str(), 1),
        };
        let base = digits
            .parse::<u64>()
            .map_err(|_| self.invalid(key, "not a byte size"))?;
        base.checked_mul(multiplier)
            .ok_or_else(|| self.invalid(key, "byte size overflows"))
    }

    /// 正規表現として取得（空なら None）
    pub fn get_regex(&self, key: &str) -> Result<Option<Regex>, ConfigError> {
        let value = self.get(key);
        if value.is_empty() {
            return Ok(None);
        }
        Regex::new(value)
            .map(Some)
            .map_err(|e| self.invalid(key, &e.to_string()))
    }

    /// 値が許可リストに含まれることを検証して返す
    ///
    /// ALGORITHM / LOCK 句のような列挙値オプションに使用します。
    pub fn require_enum(&self, key: &str, allowed: &[&str]) -> Result<String, ConfigError> {
        let value = self.get(key).to_ascii_uppercase();
        if value.is_empty() || allowed.iter().any(|a| *a == value) {
            Ok(value)
        } else {
            Err(self.invalid(
                key,
                &format!("must be one of: {}", allowed.join(", ")),
            ))
        }
    }

    fn invalid(&self, key: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            option: key.to_string(),
            value: self.get(key).to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
