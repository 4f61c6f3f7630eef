// CLI Layer
// ユーザー入力の受付とコマンドルーティング

pub mod command_context;
pub mod commands;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::io::{BufRead, Write};

/// 出力フォーマット
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// Structured JSON output
    Json,
}

/// Tavola - Declarative schema management for MySQL-family databases
///
/// Keep CREATE TABLE statements in a directory tree and reconcile them
/// against live database instances.
#[derive(Parser, Debug)]
#[command(name = "tavola")]
#[command(author = "Tavola Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative schema management CLI for MySQL-family databases")]
#[command(long_about = "Tavola - Declarative schema management for MySQL

Table definitions live as CREATE TABLE statements in a directory tree.
Tavola reconciles this filesystem representation against live databases.

Tavola helps you:
  • Export an existing database schema to the filesystem (init)
  • Keep files in sync with live schemas (pull)
  • Preview the SQL needed to reconcile a difference (diff)
  • Apply that SQL with an unsafe-change firewall (push)
  • Normalize file formatting (lint)")]
#[command(propagate_version = true)]
#[command(disable_help_flag = true)]
#[command(after_help = "GETTING STARTED:
  1. Export a live schema:        tavola init -h db.example.com -P 3306 -d mydb
  2. Edit table definitions:      mydb/<schema>/<table>.sql
  3. Preview the reconciliation:  tavola diff
  4. Apply it:                    tavola push

The first positional argument of most commands selects the environment
section of the option files (default: production).")]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help, global = true)]
    pub help: Option<bool>,

    /// Database hostname or IP address
    #[arg(short = 'h', long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to use for the database host
    #[arg(short = 'P', long, global = true, value_name = "PORT")]
    pub port: Option<u16>,

    /// Absolute path to Unix socket file (used when host is localhost)
    #[arg(short = 'S', long, global = true, value_name = "PATH")]
    pub socket: Option<String>,

    /// Username to connect with
    #[arg(short = 'u', long, global = true, value_name = "USER")]
    pub user: Option<String>,

    /// Password to connect with; supply bare -p to be prompted
    #[arg(
        short = 'p',
        long,
        global = true,
        value_name = "PASSWORD",
        num_args = 0..=1,
        default_missing_value = "",
        require_equals = true
    )]
    pub password: Option<String>,

    /// Schema name(s) to operate on
    #[arg(long, global = true, value_name = "NAME")]
    pub schema: Option<String>,

    /// Base directory to operate on
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    pub dir: Option<String>,

    /// Permit destructive DDL (DROP TABLE, DROP COLUMN, lossy changes)
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub allow_unsafe: bool,

    /// Always permit destructive DDL on tables below this size in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub safe_below_size: Option<String>,

    /// ALGORITHM clause to add to ALTER TABLE statements
    #[arg(long, global = true, value_name = "ALGORITHM")]
    pub alter_algorithm: Option<String>,

    /// LOCK clause to add to ALTER TABLE statements
    #[arg(long, global = true, value_name = "LOCK")]
    pub alter_lock: Option<String>,

    /// External command to shell out to for ALTER TABLE statements
    #[arg(long, global = true, value_name = "COMMAND")]
    pub alter_wrapper: Option<String>,

    /// Only use alter-wrapper for tables at least this size in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub alter_wrapper_min_size: Option<String>,

    /// External command to shell out to for any DDL statement
    #[arg(long, global = true, value_name = "COMMAND")]
    pub ddl_wrapper: Option<String>,

    /// External command emitting one hostname per line of stdout
    #[arg(long, global = true, value_name = "COMMAND")]
    pub host_wrapper: Option<String>,

    /// Number of database instances to operate on concurrently
    #[arg(long, global = true, value_name = "N")]
    pub concurrent_instances: Option<String>,

    /// Regex of table names to ignore on both sides
    #[arg(long, global = true, value_name = "REGEX")]
    pub ignore_table: Option<String>,

    /// Include AUTO_INCREMENT values in generated files and diffs
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub include_auto_inc: bool,

    /// Per-statement timeout in seconds (0 for none)
    #[arg(long, global = true, value_name = "SECONDS")]
    pub statement_timeout: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub no_color: bool,

    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a live database schema to the filesystem
    ///
    /// Creates one directory per schema, each holding a .tavola option file
    /// and one <table>.sql file per table containing its canonical
    /// CREATE TABLE statement.
    ///
    /// EXAMPLES:
    ///   tavola init -h db.example.com -P 3306 -d mydb
    ///   tavola init -h localhost -S /var/lib/mysql/mysql.sock --schema product
    #[command(disable_help_flag = true)]
    Init {
        /// Environment name for the generated option file
        #[arg(value_name = "ENVIRONMENT")]
        environment: Option<String>,
    },

    /// Add a new named environment to an existing host directory
    ///
    /// Modifies the .tavola file of a directory previously created by
    /// `tavola init` to add a new environment section such as [staging].
    ///
    /// EXAMPLES:
    ///   tavola add-environment --host my.staging.db.com -d mydb staging
    #[command(name = "add-environment", disable_help_flag = true)]
    AddEnvironment {
        /// Environment name to add
        #[arg(value_name = "ENVIRONMENT", required = true)]
        environment: String,
    },

    /// Update the filesystem representation from live databases
    ///
    /// Rewrites *.sql files whose canonical form drifted, creates files for
    /// new tables, deletes files for dropped tables, and updates
    /// schema-level character set options.
    #[command(disable_help_flag = true)]
    Pull {
        /// Environment name (default: production)
        #[arg(value_name = "ENVIRONMENT")]
        environment: Option<String>,
    },

    /// Normalize the format of *.sql files
    ///
    /// Rewrites files to canonical CREATE TABLE form. Files that do not
    /// contain a single valid CREATE TABLE statement are reported and left
    /// unchanged.
    #[command(disable_help_flag = true)]
    Lint {
        /// Environment name (default: production)
        #[arg(value_name = "ENVIRONMENT")]
        environment: Option<String>,
    },

    /// Show the SQL needed to reconcile live databases with the filesystem
    ///
    /// Never executes anything. Exits 1 when differences are found.
    #[command(disable_help_flag = true)]
    Diff {
        /// Environment name (default: production)
        #[arg(value_name = "ENVIRONMENT")]
        environment: Option<String>,

        /// Only list instances having differences, not the SQL itself
        #[arg(long, action = ArgAction::SetTrue)]
        brief: bool,

        /// No-op; diff always operates in dry-run mode
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,

        /// No-op; dry-run cannot be disabled for diff
        #[arg(long, action = ArgAction::SetTrue)]
        skip_dry_run: bool,
    },

    /// Execute the SQL needed to reconcile live databases with the filesystem
    ///
    /// Destructive statements are refused unless --allow-unsafe (or a
    /// matching --safe-below-size) is supplied.
    #[command(disable_help_flag = true)]
    Push {
        /// Environment name (default: production)
        #[arg(value_name = "ENVIRONMENT")]
        environment: Option<String>,

        /// Show the SQL without executing it
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,

        /// No-op; accepted for symmetry with diff
        #[arg(long, action = ArgAction::SetTrue)]
        skip_dry_run: bool,
    },
}

impl Cli {
    /// 選択された環境名（省略時はproduction）
    pub fn environment(&self) -> String {
        let env = match &self.command {
            Commands::Init { environment }
            | Commands::Pull { environment }
            | Commands::Lint { environment }
            | Commands::Diff { environment, .. }
            | Commands::Push { environment, .. } => environment.clone(),
            Commands::AddEnvironment { environment } => Some(environment.clone()),
        };
        env.unwrap_or_else(|| "production".to_string())
    }

    /// CLIで明示されたオプションだけを設定レイヤー用のマップにする
    ///
    /// ここに入れたキーのみが Config::on_cli で真になります。
    pub fn cli_options(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };

        put("host", self.host.clone());
        put("port", self.port.map(|p| p.to_string()));
        put("socket", self.socket.clone());
        put("user", self.user.clone());
        put("password", self.password.clone().map(resolve_password));
        put("schema", self.schema.clone());
        put("safe-below-size", self.safe_below_size.clone());
        put("alter-algorithm", self.alter_algorithm.clone());
        put("alter-lock", self.alter_lock.clone());
        put("alter-wrapper", self.alter_wrapper.clone());
        put(
            "alter-wrapper-min-size",
            self.alter_wrapper_min_size.clone(),
        );
        put("ddl-wrapper", self.ddl_wrapper.clone());
        put("host-wrapper", self.host_wrapper.clone());
        put("concurrent-instances", self.concurrent_instances.clone());
        put("ignore-table", self.ignore_table.clone());
        put("statement-timeout", self.statement_timeout.clone());
        if self.allow_unsafe {
            map.insert("allow-unsafe".to_string(), "1".to_string());
        }
        if self.include_auto_inc {
            map.insert("include-auto-inc".to_string(), "1".to_string());
        }
        match &self.command {
            Commands::Diff { brief: true, .. } => {
                map.insert("brief".to_string(), "1".to_string());
            }
            Commands::Push {
                dry_run, skip_dry_run, ..
            } => {
                if *dry_run {
                    map.insert("dry-run".to_string(), "1".to_string());
                }
                if *skip_dry_run {
                    map.insert("skip-dry-run".to_string(), "1".to_string());
                }
            }
            _ => {}
        }
        map
    }
}

/// 裸の -p が指定された場合は標準入力からパスワードを読む
fn resolve_password(value: String) -> String {
    if !value.is_empty() {
        return value;
    }
    eprint!("Enter password: ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    line.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_to_production() {
        let cli = Cli::parse_from(["tavola", "diff"]);
        assert_eq!(cli.environment(), "production");

        let cli = Cli::parse_from(["tavola", "diff", "staging"]);
        assert_eq!(cli.environment(), "staging");
    }

    #[test]
    fn test_add_environment_requires_positional() {
        assert!(Cli::try_parse_from(["tavola", "add-environment"]).is_err());
        let cli = Cli::parse_from(["tavola", "add-environment", "staging"]);
        assert_eq!(cli.environment(), "staging");
    }

    #[test]
    fn test_cli_options_only_include_supplied_flags() {
        let cli = Cli::parse_from(["tavola", "diff", "-h", "db1", "-P", "3307"]);
        let options = cli.cli_options();
        assert_eq!(options.get("host").unwrap(), "db1");
        assert_eq!(options.get("port").unwrap(), "3307");
        assert!(!options.contains_key("user"));
        assert!(!options.contains_key("allow-unsafe"));
    }

    #[test]
    fn test_boolean_flags() {
        let cli = Cli::parse_from(["tavola", "push", "--allow-unsafe", "--dry-run"]);
        let options = cli.cli_options();
        assert_eq!(options.get("allow-unsafe").unwrap(), "1");
        assert_eq!(options.get("dry-run").unwrap(), "1");
    }

    #[test]
    fn test_short_h_is_host_not_help() {
        let cli = Cli::parse_from(["tavola", "init", "-h", "db.example.com"]);
        assert_eq!(cli.host.as_deref(), Some("db.example.com"));
    }
}
