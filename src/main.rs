//! slc
//!
//! Searchable log compression: encode log files, keep per-context compressed
//! logs, and search them without decompressing.
//!
//! # Usage
//!
//! Run the SLCP server:
//! ```bash
//! slc serve --port 7777
//! ```
//!
//! Stream a log file to it and search:
//! ```bash
//! slc send head1000-admin.log --context adminlog
//! slc query sshd --context adminlog
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncWriteExt;

use slc::{
    encode,
    protocol::DEFAULT_PORT,
    server::{ServerConfig, SlcpServer},
    source::LineSource,
    storage::escape_record,
    Authenticator, ContextName, ContextStats, ContextStore, SlcpClient, StorageConfig,
};

/// Searchable log compression
#[derive(Parser, Debug)]
#[command(name = "slc")]
#[command(about = "Searchable log compression and SLCP server")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the SLCP server
    Serve {
        /// Server host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Close connections idle for this long (e.g. "30s", "5m")
        #[arg(long, value_parser = humantime::parse_duration)]
        idle_timeout: Option<Duration>,

        /// Longest accepted command line in bytes
        #[arg(long, default_value = "1048576")]
        max_line_len: usize,

        /// Number of context handles kept open
        #[arg(long, default_value = "64")]
        cache_size: usize,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        secret: SecretArgs,
    },

    /// Encode a log file into a record file and report the savings
    Compress {
        /// Input log file ("-" for stdin)
        input: PathBuf,

        /// Record file to write (defaults to the input with a .bin extension;
        /// required when reading stdin)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Process a log file into a context in-process
    Ingest {
        /// Input log file ("-" for stdin)
        input: PathBuf,

        /// Context name
        #[arg(long)]
        context: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Search a context in-process
    Search {
        /// Search term
        term: String,

        /// Context name
        #[arg(long)]
        context: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Send a log file to an SLCP server
    Send {
        /// Input log file ("-" for stdin)
        input: PathBuf,

        /// Context name
        #[arg(long)]
        context: String,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Search a context on an SLCP server
    Query {
        /// Search term
        term: String,

        /// Context name
        #[arg(long)]
        context: String,

        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Directory holding context logs and counters
    #[arg(long, default_value = "reader.persistence")]
    data_dir: PathBuf,

    /// Scan records sequentially instead of with rayon
    #[arg(long)]
    sequential: bool,
}

impl StoreArgs {
    fn config(&self) -> StorageConfig {
        StorageConfig {
            parallel_scan: !self.sequential,
            ..StorageConfig::with_data_dir(&self.data_dir)
        }
    }
}

#[derive(Args, Debug)]
struct SecretArgs {
    /// File whose first line is the shared secret
    #[arg(long, default_value = "authtoken.secret")]
    secret_file: PathBuf,
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:7777")]
    addr: String,

    #[command(flatten)]
    secret: SecretArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve {
            host,
            port,
            idle_timeout,
            max_line_len,
            cache_size,
            store,
            secret,
        } => {
            let config = ServerConfig {
                host,
                port,
                secret_file: secret.secret_file,
                idle_timeout,
                max_line_len,
                storage: StorageConfig {
                    cache_size,
                    ..store.config()
                },
            };
            tracing::info!("Starting SLCP server on {}:{}", config.host, config.port);
            SlcpServer::new(config)?.run().await?;
        }
        Commands::Compress { input, output } => {
            let output = output_path(&input, output)?;
            let stats = compress(&input, &output).await?;
            println!(
                "capacity over logfile {} bytes to {} bytes; capacity saved: {} %",
                stats.b,
                stats.bc,
                stats.saved_percent()
            );
        }
        Commands::Ingest {
            input,
            context,
            store,
        } => {
            let store = ContextStore::new(store.config())?;
            let handle = store.open_or_resume(&ContextName::parse(&context)?).await?;

            let mut source = LineSource::open(&input).await?;
            let mut failed = 0usize;
            while let Some(line) = source.next_line().await? {
                if let Err(e) = handle.process(&line).await {
                    tracing::warn!(error = %e, "Line not stored");
                    failed += 1;
                }
            }

            let stats = handle.stats().await;
            println!(
                "{}: {} bytes to {} bytes; {} stored, {} failed in this run; capacity saved: {} %",
                context,
                stats.b,
                stats.bc,
                stats.succ,
                failed,
                stats.saved_percent()
            );
        }
        Commands::Search {
            term,
            context,
            store,
        } => {
            let store = ContextStore::new(store.config())?;
            let handle = store.open_or_resume(&ContextName::parse(&context)?).await?;
            println!("RESULTS {}", handle.search(&term).await?);
        }
        Commands::Send {
            input,
            context,
            remote,
        } => {
            let mut client = connect(&remote, &context).await?;
            let mut source = LineSource::open(&input).await?;
            let mut sent = 0usize;
            while let Some(line) = source.next_line().await? {
                client.process(&line).await?;
                sent += 1;
            }
            let failed = client.finish().await?;
            println!("{} lines sent, {} failed", sent, failed);
        }
        Commands::Query {
            term,
            context,
            remote,
        } => {
            let mut client = connect(&remote, &context).await?;
            let count = client.search(&term).await?;
            client.finish().await?;
            println!("RESULTS {}", count);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn connect(remote: &RemoteArgs, context: &str) -> anyhow::Result<SlcpClient> {
    let token = Authenticator::SecretFile(remote.secret.secret_file.clone()).secret()?;
    let mut client = SlcpClient::connect(remote.addr.as_str())
        .await
        .with_context(|| format!("connecting to {}", remote.addr))?;
    client.auth(&token).await?;
    client.context(context).await?;
    Ok(client)
}

/// Pick the record file for `compress`, refusing to overwrite the input
fn output_path(input: &Path, output: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let output = match output {
        Some(output) => output,
        None if input == Path::new("-") => {
            anyhow::bail!("--output is required when reading from stdin")
        }
        None => input.with_extension("bin"),
    };

    let same_file = match (input.canonicalize(), output.canonicalize()) {
        (Ok(input), Ok(output)) => input == output,
        _ => input == output,
    };
    if same_file {
        anyhow::bail!("output {} would overwrite the input", output.display());
    }

    Ok(output)
}

/// Encode every line of `input` into `output`, one escaped record per line
async fn compress(input: &Path, output: &Path) -> anyhow::Result<ContextStats> {
    let mut source = LineSource::open(input).await?;
    let file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let mut writer = tokio::io::BufWriter::new(file);

    let mut stats = ContextStats::default();
    while let Some(line) = source.next_line().await? {
        let record = encode(&line);
        let appended = match writer.write_all(escape_record(record.as_str()).as_bytes()).await {
            Ok(()) => writer.write_all(b"\n").await,
            Err(e) => Err(e),
        };
        if let Err(e) = &appended {
            tracing::warn!(error = %e, "Record not written");
        }
        stats.record_line(line.chars().count(), record.len(), appended.is_ok());
    }
    writer.flush().await?;

    tracing::info!(errors = stats.errs, output = %output.display(), "Compression finished");
    Ok(stats)
}
