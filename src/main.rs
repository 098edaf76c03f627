use clap::Parser;
use tally::checkpoint::{self, diff, CheckpointManager};
use tally::cli::{CheckpointCommand, Cli, Command};
use tally::config::Config;
use tally::{db, logging, report, util, Error, Result};

fn open_db(config: &Config) -> Result<rusqlite::Connection> {
    db::open(&config.database, config.busy_timeout)
}

fn run_checkpoint(command: CheckpointCommand, manager: &CheckpointManager, config: &Config) -> Result<()> {
    match command {
        CheckpointCommand::Create(args) => {
            let conn = open_db(config)?;
            let checkpoint = manager.create(&conn, &args.tag, &args.description)?;
            println!(
                "Created checkpoint {} ({})",
                checkpoint.id,
                util::format_bytes(checkpoint.file_size.max(0) as u64)
            );
        }
        CheckpointCommand::List(args) => {
            let checkpoints = manager.list()?;
            report::print_list(&checkpoints, args.json)?;
        }
        CheckpointCommand::Info(args) => {
            let checkpoint = manager.info(&args.id)?;
            report::print_info(&checkpoint, args.json)?;
        }
        CheckpointCommand::Restore(args) => {
            let conn = open_db(config)?;
            let checkpoint = if args.safety_checkpoint {
                let (safety, checkpoint) = manager.restore_with_safety_checkpoint(conn, &args.id)?;
                println!("Saved previous state as {}", safety.id);
                checkpoint
            } else {
                manager.restore(conn, &args.id)?
            };
            println!(
                "Restored checkpoint {} from {}",
                checkpoint.id,
                util::format_timestamp(&checkpoint.created_at)
            );
        }
        CheckpointCommand::Delete(args) => {
            let conn = open_db(config)?;
            manager.delete(&conn, &args.id)?;
            println!("Deleted checkpoint {}", args.id);
        }
        CheckpointCommand::Auto(args) => {
            let conn = open_db(config)?;
            let checkpoint = manager.auto_checkpoint(&conn, &args.prefix)?;
            println!("Created checkpoint {}", checkpoint.id);
        }
        CheckpointCommand::Diff(args) => {
            let checkpoint = manager.info(&args.id)?;
            let conn = open_db(config)?;

            let live_counts = checkpoint::row_counts(&conn);
            let live_schema =
                db::schema_version(&conn).map_err(Error::db("failed to read schema version"))?;

            let result = diff::compare_counts(
                &checkpoint.id,
                &checkpoint.row_counts,
                &live_counts,
                checkpoint.schema_version,
                live_schema,
            );
            print!("{}", report::table::render_diff(&result));
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.log_level);
    tracing::debug!(database = %config.database.display(), "using database");

    let result = config.manager().and_then(|manager| match cli.command {
        Command::Checkpoint(command) => run_checkpoint(command, &manager, &config),
    });

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
