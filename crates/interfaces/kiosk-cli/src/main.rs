use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use kiosk_cli::{commands, repos};
use kiosk_persistence::StatePaths;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(
        long,
        global = true,
        env = "KIOSK_STATE_DIR",
        help = "Keep all state under this directory instead of the platform defaults"
    )]
    state_dir: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configured repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Fetch and verify the latest index of each repo
    Sync {
        #[arg(help = "Repo ids to sync; all enabled repos when omitted")]
        ids: Vec<i64>,
    },
    /// List packages from the synced indexes
    Apps {
        #[arg(long)]
        repo: Option<i64>,
        #[arg(short, long, help = "Match package ids, names and summaries")]
        search: Option<String>,
    },
    /// Load an index from a local file instead of the network
    Import { id: i64, file: Utf8PathBuf },
}

#[derive(Subcommand)]
enum RepoCommands {
    List,
    Add {
        address: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, help = "Pin the signer up front instead of trusting the first sync")]
        fingerprint: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
        #[arg(long = "mirror", help = "Additional mirror address; may repeat")]
        mirrors: Vec<String>,
        #[arg(long, help = "The repo publishes only the single-file V1 index")]
        no_diff: bool,
    },
    #[command(name = "rm")]
    Remove { id: i64 },
    Enable { id: i64 },
    Disable { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    let paths = match cli.state_dir {
        Some(root) => StatePaths::rooted(root.join("data"), root.join("cache")),
        None => StatePaths::discover()?,
    };
    tracing::debug!("State layout: {:?}", paths);

    match cli.command {
        Commands::Repo { command } => match command {
            RepoCommands::List => repos::handle_list(paths)?,
            RepoCommands::Add {
                address,
                name,
                fingerprint,
                username,
                password,
                mirrors,
                no_diff,
            } => repos::handle_add(
                paths,
                repos::NewRepo {
                    address,
                    name,
                    fingerprint,
                    username,
                    password,
                    mirrors,
                    supports_diff: !no_diff,
                },
            )?,
            RepoCommands::Remove { id } => repos::handle_remove(paths, id)?,
            RepoCommands::Enable { id } => repos::handle_set_enabled(paths, id, true)?,
            RepoCommands::Disable { id } => repos::handle_set_enabled(paths, id, false)?,
        },
        Commands::Sync { ids } => {
            let outcomes = commands::cmd_sync(paths, ids).await?;
            let failed = outcomes
                .iter()
                .filter(|(_, result)| result.is_err())
                .count();
            if failed > 0 {
                anyhow::bail!("{} of {} repos failed to sync", failed, outcomes.len());
            }
        }
        Commands::Apps { repo, search } => {
            commands::cmd_apps(paths, repo, search)?;
        }
        Commands::Import { id, file } => {
            commands::cmd_import(paths, id, &file).await?;
        }
    }

    Ok(())
}
