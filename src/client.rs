use std::path::PathBuf;

use serde_json::json;

use crate::{CommandOutcome, Database, DatabaseConfig, DocGraphError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub database: String,
    pub config_file: Option<PathBuf>,
    pub read_only: bool,
    pub verbosity: u8,
    pub statements: Vec<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut database = String::from("memory");
        let mut config_file = None;
        let mut read_only = false;
        let mut verbosity = 0u8;
        let mut statements = Vec::new();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--db" | "--database" => {
                    database = iter
                        .next()
                        .ok_or_else(|| "--db requires a value".to_string())?
                        .to_string();
                }
                "--config" => {
                    config_file = Some(PathBuf::from(
                        iter.next()
                            .ok_or_else(|| "--config requires a value".to_string())?,
                    ));
                }
                "--read-only" => read_only = true,
                "-v" | "--verbose" => verbosity = verbosity.saturating_add(1),
                "-vv" => verbosity = verbosity.saturating_add(2),
                other if other.starts_with('-') && other.len() > 1 => {
                    return Err(format!("unknown flag {other}"));
                }
                statement => statements.push(statement.to_string()),
            }
        }
        Ok(Self {
            database,
            config_file,
            read_only,
            verbosity,
            statements,
        })
    }

    pub fn help() -> &'static str {
        "Usage: docgraph [--db memory|PATH] [--config FILE] [--read-only] [-v] [STATEMENT...]\n"
    }

    /// Log specification handed to the logger: warnings by default, more per `-v`.
    pub fn log_spec(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn database_config(&self) -> Result<DatabaseConfig, String> {
        let mut config = match &self.config_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
                DatabaseConfig::from_toml_str(&text).map_err(|e| e.to_string())?
            }
            None => DatabaseConfig::default(),
        };
        if self.read_only {
            config.read_only = true;
        }
        Ok(config)
    }

    pub fn open_database(&self) -> Result<Database, String> {
        let config = self.database_config()?;
        let opened = if self.database == "memory" {
            Database::open_in_memory(&config)
        } else {
            Database::open(&self.database, &config)
        };
        opened.map_err(|e| e.to_string())
    }
}

/// Runs one statement and renders its outcome as JSON lines.
pub fn run_statement(db: &Database, statement: &str) -> Result<Vec<String>, DocGraphError> {
    let outcome = db.command(statement, &[])?;
    Ok(match outcome {
        CommandOutcome::Rows(rows) => rows.iter().map(|row| row.to_json().to_string()).collect(),
        CommandOutcome::TypeDeclared { created } => vec![json!({ "created": created }).to_string()],
        CommandOutcome::Updated(count) => vec![json!({ "updated": count }).to_string()],
        CommandOutcome::Deleted(count) => vec![json!({ "deleted": count }).to_string()],
    })
}

/// One line per declared type with its committed record count.
pub fn status_lines(db: &Database) -> Result<Vec<String>, DocGraphError> {
    let mut lines = Vec::new();
    for def in db.types()? {
        let records = db.scan(&def.name)?.count();
        lines.push(format!("{} {} records={records}", def.kind, def.name));
    }
    if lines.is_empty() {
        lines.push("no types declared".to_string());
    }
    Ok(lines)
}
