use std::{env, process};

use docgraph::client::{CommandLineConfig, run_statement, status_lines};
use flexi_logger::Logger;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    let _logger = match Logger::try_with_env_or_str(config.log_spec())
        .and_then(|logger| logger.log_to_stderr().start())
    {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: logging disabled: {err}");
            None
        }
    };

    let db = match config.open_database() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if config.statements.is_empty() {
        match status_lines(&db) {
            Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
            Err(err) => {
                eprintln!("status failed: {err}");
                process::exit(1);
            }
        }
        return;
    }

    for statement in &config.statements {
        match run_statement(&db, statement) {
            Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
            Err(err) => {
                eprintln!("statement failed: {err}");
                process::exit(1);
            }
        }
    }
    if let Err(err) = db.close() {
        log::warn!("close failed: {err}");
    }
}
