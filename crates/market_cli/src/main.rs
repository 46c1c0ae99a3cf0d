//! CLI probe for the marketplace catalog.
//!
//! # Responsibility
//! - Verify `market_core` linkage and database bootstrap from the environment.
//! - Print one stored app or marketplace as JSON for quick inspection.

use market_core::db::migrations::current_user_version;
use market_core::db::{open_db, open_db_in_memory};
use market_core::{CoreConfig, EntryId, ObjectPool};
use std::error::Error;
use std::process::ExitCode;

const USAGE: &str = "usage: market_cli [show-app <id> | show-marketplace <id>]";

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    println!("market_core version={}", market_core::core_version());

    let config = CoreConfig::from_env()?;
    if let Some(log_dir) = &config.log_dir {
        market_core::init_logging(&config.log_level, log_dir)?;
    }

    let conn = match &config.db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    println!(
        "market_core schema_version={} role={}",
        current_user_version(&conn)?,
        config.role.as_str()
    );
    let pool = ObjectPool::new(conn, config.pool_config())?;

    match args.as_slice() {
        [] => Ok(()),
        [command, id] if command == "show-app" => {
            let app = pool.get_app_by_id(parse_id(id)?)?;
            println!("{}", serde_json::to_string_pretty(&app)?);
            Ok(())
        }
        [command, id] if command == "show-marketplace" => {
            let mp = pool.get_marketplace_by_id(parse_id(id)?)?;
            println!("{}", serde_json::to_string_pretty(&mp)?);
            Ok(())
        }
        _ => Err(USAGE.into()),
    }
}

fn parse_id(raw: &str) -> Result<EntryId, Box<dyn Error>> {
    raw.parse::<EntryId>()
        .map_err(|err| format!("invalid id `{raw}`: {err}").into())
}
