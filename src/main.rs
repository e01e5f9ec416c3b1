use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cache;
mod cli;
mod config;
mod error;
mod index;
mod knowledge;
mod speech;
mod store;
mod synthesis;
mod types;

#[derive(Parser)]
#[command(name = "speech-agent")]
#[command(version)]
#[command(about = "Cached text-to-speech with a local knowledge base")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .speech-agent directory
    Init {
        /// Directory to initialize .speech-agent in
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Synthesize speech, using the cache when possible
    Speak {
        /// Text to speak (max 1000 characters)
        text: String,

        /// Where to write the WAV audio
        #[arg(short, long, default_value = "speech.wav")]
        output: String,

        /// Don't record the request in the knowledge base
        #[arg(long)]
        no_record: bool,
    },

    /// Manage the audio cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Record an interaction
    Record {
        /// What was asked
        query: String,

        /// What was answered
        response: String,

        /// Short summary (weighted highest in queries)
        #[arg(short, long)]
        summary: Option<String>,

        /// Extra metadata as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Add a JSON object to the knowledge base
    Add {
        /// JSON object, e.g. '{"type": "fact", "summary": "..."}'
        json: String,
    },

    /// Upload a document
    Upload {
        /// File to upload
        file: String,

        /// Content type (guessed from the extension if omitted)
        #[arg(short, long)]
        content_type: Option<String>,
    },

    /// Show or export a stored document
    Document {
        /// Document ID
        id: String,

        /// Copy the document to this path
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print a stored record as JSON
    Show {
        /// Record ID
        id: String,
    },

    /// Search records and documents
    Query {
        /// Text to search for
        text: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value_t = knowledge::DEFAULT_QUERY_LIMIT)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent records and stored documents
    List {
        /// Maximum records
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show statistics
    Stats,

    /// View or set configuration
    Config {
        /// Config key
        key: Option<String>,

        /// Config value
        value: Option<String>,

        /// Read or write the global config instead of the project config
        #[arg(short, long)]
        global: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete every cached audio file
    Clear,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { path } => cli::knowledge::run_init(&path),
        Commands::Speak {
            text,
            output,
            no_record,
        } => cli::speak::run_speak(&text, &output, !no_record),
        Commands::Cache(cmd) => match cmd {
            CacheCommands::Clear => cli::cache::run_clear(),
        },
        Commands::Record {
            query,
            response,
            summary,
            meta,
        } => cli::knowledge::run_record(&query, &response, summary.as_deref(), &meta),
        Commands::Add { json } => cli::knowledge::run_add(&json),
        Commands::Upload { file, content_type } => {
            cli::knowledge::run_upload(&file, content_type.as_deref())
        }
        Commands::Document { id, output } => cli::knowledge::run_document(&id, output.as_deref()),
        Commands::Show { id } => cli::knowledge::run_show(&id),
        Commands::Query { text, limit, json } => cli::knowledge::run_query(&text, limit, json),
        Commands::List { limit } => cli::knowledge::run_list(limit),
        Commands::Stats => cli::knowledge::run_stats(),
        Commands::Config { key, value, global } => {
            cli::config::run_config(key.as_deref(), value.as_deref(), global)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_limit_defaults() {
        let cli = Cli::try_parse_from(["speech-agent", "query", "hello"]).unwrap();
        match cli.command {
            Commands::Query { limit, json, .. } => {
                assert_eq!(limit, knowledge::DEFAULT_QUERY_LIMIT);
                assert!(!json);
            }
            _ => panic!("expected query command"),
        }

        let cli = Cli::try_parse_from(["speech-agent", "query", "hello", "-n", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Query { limit: 3, .. }));
    }
}
