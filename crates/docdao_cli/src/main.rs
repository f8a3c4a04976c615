//! `docdao` maintenance CLI.
//!
//! # Responsibility
//! - Seed a document store from a JSON fixture file.
//! - Dump one collection through the generic repository.

use clap::{Parser, Subcommand};
use docdao_core::{
    core_version, init_logging, CoreConfig, DocumentRepository, Filter, FixtureSet,
    ModelDescriptor, Populator, Repository, SortOrder, SqliteDocumentStore, StoreConfig,
};
use log::error;
use serde_json::Value;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "docdao", version, about = "Generic document repository tools")]
struct Args {
    /// JSON config file (`store` and `logging` sections).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file; overrides `store.path` from the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the core library version.
    Version,
    /// Drop every collection, then insert the records of a fixture file.
    Seed {
        #[arg(long)]
        fixtures: PathBuf,
    },
    /// Print the records of one collection, one JSON object per line.
    List {
        #[arg(long)]
        collection: String,
        /// Equality condition `field=value`; value is parsed as JSON when possible.
        #[arg(long = "where", value_parser = parse_condition)]
        conditions: Vec<(String, Value)>,
        /// Field to include, or `-field` to exclude.
        #[arg(long, allow_hyphen_values = true)]
        select: Vec<String>,
        /// Sort key `field` (ascending) or `-field` (descending).
        #[arg(long, allow_hyphen_values = true)]
        sort: Vec<String>,
        #[arg(long)]
        primary_key: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> CliResult<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(db) = args.db {
        config.store.path = Some(db);
    }
    init_logging(&config.logging)?;

    match args.command {
        Command::Version => {
            println!("docdao_core version={}", core_version());
        }
        Command::Seed { fixtures } => {
            require_store_path(&config.store)?;
            let fixtures = FixtureSet::load(&fixtures)?;
            let populator = Populator::connect(&config.store)?;
            let report = populator.populate(&fixtures)?;
            populator.close()?;
            println!("dropped={} inserted={}", report.dropped, report.inserted);
        }
        Command::List {
            collection,
            conditions,
            select,
            sort,
            primary_key,
        } => {
            require_store_path(&config.store)?;
            let mut descriptor = ModelDescriptor::new(collection);
            if let Some(field) = primary_key {
                descriptor = descriptor.with_primary_key(field);
            }
            let store = SqliteDocumentStore::open(&config.store)?;
            let repo = Repository::with_model(store, descriptor);
            for record in repo.filter(&build_filter(conditions, select, &sort))? {
                println!("{}", Value::Object(record));
            }
        }
    }
    Ok(())
}

/// Store commands need a database file; an in-memory store would vanish on exit.
fn require_store_path(store: &StoreConfig) -> CliResult<()> {
    if store.path.is_none() {
        return Err("no database file: pass --db or set store.path in --config".into());
    }
    Ok(())
}

fn build_filter(conditions: Vec<(String, Value)>, select: Vec<String>, sort: &[String]) -> Filter {
    let mut filter = Filter::new().select(select);
    for (field, value) in conditions {
        filter = filter.where_eq(field, value);
    }
    for key in sort {
        filter = match key.strip_prefix('-') {
            Some(field) => filter.sort_by(field, SortOrder::Desc),
            None => filter.sort_by(key.as_str(), SortOrder::Asc),
        };
    }
    filter
}

fn parse_condition(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got `{raw}`"))?;
    if field.is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::{build_filter, parse_condition, require_store_path, run, Args};
    use clap::{CommandFactory, Parser};
    use docdao_core::{SortOrder, StoreConfig};
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn conditions_parse_json_or_fall_back_to_string() {
        assert_eq!(parse_condition("age=31").unwrap(), ("age".to_string(), json!(31)));
        assert_eq!(
            parse_condition("name=Customer 1").unwrap(),
            ("name".to_string(), json!("Customer 1"))
        );
        assert!(parse_condition("novalue").is_err());
        assert!(parse_condition("=x").is_err());
    }

    #[test]
    fn store_commands_require_a_database_file() {
        assert!(require_store_path(&StoreConfig::default()).is_err());
        assert!(require_store_path(&StoreConfig::at_path("docdao.sqlite3")).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let fixtures = dir.path().join("fixtures.json");
        std::fs::write(&fixtures, r#"{"customer": [{"name": "A"}]}"#).unwrap();
        let fixtures = fixtures.to_str().unwrap();

        let seed = Args::try_parse_from(["docdao", "seed", "--fixtures", fixtures]).unwrap();
        let err = run(seed).unwrap_err();
        assert!(err.to_string().contains("--db"));

        let list = Args::try_parse_from(["docdao", "list", "--collection", "customer"]).unwrap();
        assert!(run(list).is_err());

        let db = dir.path().join("dao.sqlite3");
        let db = db.to_str().unwrap();
        let seed =
            Args::try_parse_from(["docdao", "--db", db, "seed", "--fixtures", fixtures]).unwrap();
        run(seed).unwrap();
    }

    #[test]
    fn sort_prefix_selects_direction() {
        let filter = build_filter(
            vec![("name".to_string(), json!("x"))],
            vec!["name".to_string()],
            &["-age".to_string(), "name".to_string()],
        );
        assert_eq!(filter.conditions["name"], json!("x"));
        assert_eq!(filter.sort[0].field, "age");
        assert_eq!(filter.sort[0].order, SortOrder::Desc);
        assert_eq!(filter.sort[1].order, SortOrder::Asc);
    }
}
