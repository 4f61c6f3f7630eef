// ディレクトリウォーカー
//
// 管理対象のファイルシステムツリーを Dir としてモデル化します。
// 各Dirは任意のオプションファイル、`*.sql` ファイル群、サブディレクトリを
// 持ちます。設定チェーンはグローバルファイル → 祖先ディレクトリの
// オプションファイル（ルート側から順に）→ CLI の順で構築されます。

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use tavola_core::core::config::{Config, Source};
use tavola_core::core::error::{ExitCode, ExitValue};
use tavola_core::core::naming::{GLOBAL_OPTION_FILE, HOME_OPTION_FILE, OPTION_FILE};
use tavola_core::core::option_file::OptionFile;

use crate::adapters::instance::Instance;
use crate::adapters::shellout::ShellOut;
use crate::services::sql_file::{sql_files_in, SqlFile};

/// 管理対象ディレクトリ
///
/// TargetはDirを参照しますが、その逆参照はありません。
#[derive(Debug, Clone)]
pub struct Dir {
    /// ディレクトリパス
    pub path: PathBuf,
    /// 選択中の環境名
    pub environment: String,
    /// このディレクトリで有効な設定
    pub config: Config,

    cli_options: HashMap<String, String>,
}

impl Dir {
    /// ディレクトリと環境から設定チェーンを構築してDirを作成
    pub fn new(
        path: impl Into<PathBuf>,
        environment: &str,
        cli_options: HashMap<String, String>,
    ) -> Result<Self> {
        let path = path.into();
        let mut config = Config::new();

        // グローバル設定ファイル
        for global in global_option_paths() {
            if global.is_file() {
                let file = OptionFile::read(&global)
                    .with_context(|| format!("Unable to read {}", global.display()))?;
                config = config.with_layer(
                    Source::GlobalFile(global.clone()),
                    file.options_for_environment(environment),
                );
            }
        }

        // ルート側から祖先ディレクトリのオプションファイルを順に重ねる
        let absolute = if path.is_absolute() {
            path.clone()
        } else {
            std::env::current_dir()?.join(&path)
        };
        let mut chain: Vec<PathBuf> = absolute.ancestors().map(Path::to_path_buf).collect();
        chain.reverse();
        for ancestor in chain {
            let option_path = ancestor.join(OPTION_FILE);
            if option_path.is_file() {
                let file = OptionFile::read(&option_path)
                    .with_context(|| format!("Unable to read {}", option_path.display()))?;
                config = config.with_layer(
                    Source::DirFile(option_path),
                    file.options_for_environment(environment),
                );
            }
        }

        let config = config
            .with_cli(cli_options.clone())
            .map_err(|e| anyhow!(ExitValue::new(e.exit_code(), e.to_string())))?;

        Ok(Self {
            path,
            environment: environment.to_string(),
            config,
            cli_options,
        })
    }

    /// ディレクトリが存在するか
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// このディレクトリ自身のオプションファイルのパス
    pub fn option_file_path(&self) -> PathBuf {
        self.path.join(OPTION_FILE)
    }

    /// オプションファイルを持つか
    pub fn has_option_file(&self) -> bool {
        self.option_file_path().is_file()
    }

    /// オプションファイルを読み込む
    pub fn option_file(&self) -> Result<OptionFile> {
        OptionFile::read(self.option_file_path())
            .with_context(|| format!("Unable to read option file for {}", self))
    }

    /// `*.sql` ファイルをファイル名順に列挙
    pub fn sql_files(&self) -> io::Result<Vec<SqlFile>> {
        sql_files_in(&self.path)
    }

    /// サブディレクトリを名前順に列挙（隠しディレクトリは除く）
    pub fn subdirs(&self) -> Result<Vec<Dir>> {
        let mut dirs = Vec::new();
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)
            .with_context(|| format!("Unable to list directory {}", self))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        for name in names {
            dirs.push(Dir::new(
                self.path.join(&name),
                &self.environment,
                self.cli_options.clone(),
            )?);
        }
        Ok(dirs)
    }

    /// このディレクトリ自身のオプションファイルが指定オプションを定義しているか
    fn defines_option(&self, key: &str) -> Result<bool> {
        if !self.has_option_file() {
            return Ok(false);
        }
        let file = self.option_file()?;
        Ok(file
            .options_for_environment(&self.environment)
            .contains_key(key))
    }

    /// ホストレベルのディレクトリか（自身のオプションファイルがhostを定義）
    pub fn is_host_level(&self) -> Result<bool> {
        self.defines_option("host")
    }

    /// スキーマレベルのディレクトリか（自身のオプションファイルがschemaを定義）
    ///
    /// 同一セクションでhostとschemaの両方を定義するのは設定エラーです。
    pub fn is_schema_level(&self) -> Result<bool> {
        let has_schema = self.defines_option("schema")?;
        if has_schema && self.defines_option("host")? {
            return Err(anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!(
                    "Option file for {} defines both host and schema in the same section",
                    self
                ),
            )));
        }
        Ok(has_schema)
    }

    /// 設定からInstanceのリストを構築
    ///
    /// `host` はカンマ区切りで複数指定できます。`host-wrapper` が設定されている
    /// 場合は外部コマンドを実行し、stdoutの1行を1ホストとして扱います。
    pub async fn instances(&self) -> Result<Vec<Instance>> {
        let port = self.config.get_int("port").map_err(config_err)? as u16;
        let socket = self.config.get("socket").to_string();
        let user = self.config.get("user").to_string();
        let password = self.config.get("password").to_string();

        let host_wrapper = self.config.get("host-wrapper").to_string();
        let hosts: Vec<String> = if !host_wrapper.is_empty() {
            let vars: HashMap<String, String> = [
                ("HOST".to_string(), self.config.get("host").to_string()),
                ("PORT".to_string(), port.to_string()),
                ("ENVIRONMENT".to_string(), self.environment.clone()),
                (
                    "DIRNAME".to_string(),
                    self.path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ),
                ("DIRPATH".to_string(), self.path.display().to_string()),
            ]
            .into_iter()
            .collect();
            let shellout = ShellOut::interpolated(&host_wrapper, &vars)
                .map_err(|e| anyhow!(ExitValue::new(ExitCode::BadConfig, e.to_string())))?;
            debug!(command = %shellout, "Running host-wrapper");
            let lines = shellout.run_capture_lines(0).await?;
            if lines.is_empty() {
                return Err(anyhow!(ExitValue::new(
                    ExitCode::BadConfig,
                    format!("host-wrapper for {} produced no hosts", self),
                )));
            }
            lines
        } else {
            self.config
                .get("host")
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect()
        };

        let mut instances = Vec::new();
        for host in hosts {
            let (host, host_port) = split_host_port(&host, port);
            let socket = (host == "localhost" && !socket.is_empty()).then(|| socket.clone());
            instances.push(Instance::new(host, host_port, socket, user.clone(), password.clone()));
        }
        Ok(instances)
    }

    /// 最初のInstanceを返し、接続できることを確認
    pub async fn first_instance(&self) -> Result<Instance> {
        let instances = self.instances().await?;
        let instance = instances.into_iter().next().ok_or_else(|| {
            anyhow!(ExitValue::new(
                ExitCode::BadConfig,
                format!("No host defined for {}", self),
            ))
        })?;
        instance.check_connect().await.with_context(|| {
            format!("Unable to connect to {} for {}", instance, self)
        })?;
        Ok(instance)
    }

    /// `schema` オプションからスキーマ名のリストを得る
    ///
    /// カンマ区切りの複数指定と、全スキーマを表す `*` を受け付けます。
    pub async fn schema_names(&self, instance: &Instance) -> Result<Vec<String>> {
        let value = self.config.get("schema").trim().to_string();
        if value == "*" {
            return Ok(instance.schema_names().await?);
        }
        Ok(value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

impl std::fmt::Display for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// `host:port` 形式のホスト指定を分解する
fn split_host_port(host: &str, default_port: u16) -> (String, u16) {
    if let Some((name, port)) = host.rsplit_once(':') {
        if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(port) = port.parse::<u16>() {
                return (name.to_string(), port);
            }
        }
    }
    (host.to_string(), default_port)
}

/// グローバル設定ファイルのパス（優先度の低い順）
fn global_option_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(GLOBAL_OPTION_FILE)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(HOME_OPTION_FILE));
    }
    paths
}

fn config_err(e: tavola_core::core::error::ConfigError) -> anyhow::Error {
    anyhow!(ExitValue::new(e.exit_code(), e.to_string()))
}
