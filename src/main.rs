//! querywright CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use querywright::{
    app::{load_corpus, open_schema, App},
    commands::{
        check_exit_code, cmd_ask, cmd_chat, cmd_check, cmd_describe, cmd_index, cmd_init,
        cmd_retrieve, cmd_status, cmd_tables, print_answered, print_check, print_description,
        print_index_report, print_init, print_retrieval, print_status, print_tables, InitOptions,
    },
    config::Config,
    db::SqliteDatabase,
    error::Result,
    mcp::McpServer,
    progress::LogWriterFactory,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "querywright")]
#[command(version, about = "Ask questions of a SQL database in plain language", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "QUERYWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// SQLite database URL to store in the config (e.g. sqlite://northwind.db)
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Answer one question
    Ask {
        /// The question, in plain language
        question: String,

        /// Show every attempt and the retrieved schema context
        #[arg(long)]
        trace: bool,

        /// Rebuild the schema index before answering
        #[arg(long)]
        reindex: bool,
    },

    /// Interactive session with conversation history
    Chat,

    /// List indexed tables
    Tables,

    /// Show the schema documentation for a table
    Describe {
        /// Table name
        table: String,
    },

    /// Show system status
    Status,

    /// Build the schema embedding index (skipped when already current)
    Index {
        /// Rebuild even when the snapshot is current
        #[arg(long)]
        force: bool,
    },

    /// Show the schema fragments a question would retrieve
    Retrieve {
        /// The question
        question: String,

        /// Number of fragments
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Run the read-only guard on a SQL statement
    Check {
        /// The statement to check
        sql: String,
    },

    /// Run as MCP server (stdio)
    Mcp,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(LogWriterFactory::default()))
            .with(filter)
            .init();
    }

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "querywright", &mut std::io::stdout());
        return Ok(());
    }

    // The guard is pure; no config needed
    if let Commands::Check { sql } = &cli.command {
        let result = cmd_check(sql);
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_check(&result);
        }
        std::process::exit(check_exit_code(&result));
    }

    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } | Commands::Check { .. } => {
            unreachable!()
        }

        Commands::Ask {
            question,
            trace,
            reindex,
        } => {
            let app = App::start(config, reindex).await?;
            let answered = cmd_ask(&app.engine, &question).await?;

            if cli.json {
                if trace {
                    println!("{}", serde_json::to_string_pretty(&answered)?);
                } else {
                    println!("{}", serde_json::to_string_pretty(&answered.response)?);
                }
            } else {
                print_answered(&answered, trace);
            }
        }

        Commands::Chat => {
            let app = App::start(config, false).await?;
            cmd_chat(&app.engine, cli.json).await?;
        }

        Commands::Tables => {
            let database = SqliteDatabase::connect(&config.database).await?;
            let corpus = load_corpus(&config, &database).await?;
            let tables = cmd_tables(&corpus);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                print_tables(&tables);
            }
        }

        Commands::Describe { table } => {
            let database = SqliteDatabase::connect(&config.database).await?;
            let corpus = load_corpus(&config, &database).await?;
            let description = cmd_describe(&corpus, &table)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&description)?);
            } else {
                print_description(&description);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Index { force } => {
            let report = cmd_index(&config, force).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_index_report(&report);
            }
        }

        Commands::Retrieve { question, k } => {
            let stack = open_schema(&config, false).await?;
            let k = k.unwrap_or(config.retrieval.top_k);
            let result = cmd_retrieve(&stack.retriever, &question, k).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_retrieval(&result);
            }
        }

        Commands::Mcp => {
            let app = App::start(config, false).await?;
            let server = McpServer::new(app.engine.clone(), app.corpus.clone());
            server.run().await?;
        }
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init {
        force,
        database_url,
    } = cli.command
    else {
        unreachable!()
    };

    // A .toml path names the file; anything else names the base directory
    let (base_dir, config_path) = match cli.config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    };

    let report = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
        database_url,
    })
    .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_init(&report);
    }

    Ok(())
}

async fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'querywright init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
