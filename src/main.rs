use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// modscan - module store discovery and parser plugin dispatch
///
/// Enumerates installed packages, extracts the declared dependency tree,
/// resolves entry files, and parses content with parser plugins found in the
/// project's module store.
///
/// Settings can be overridden with MODSCAN_STORE_DIR, MODSCAN_PLUGIN_PREFIX
/// and MODSCAN_TREE_PROVIDERS (comma-separated: npm, pnpm, yarn).
///
/// Examples:
///   modscan enumerate                # Package directories of ./node_modules
///   modscan parse data.yml           # Parse with the matching parser plugin
#[derive(Parser, Debug)]
#[command(author, version = env!("MODSCAN_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to the current directory; also via MODSCAN_PROJECT)
    #[arg(
        long = "project",
        short = 'p',
        env = "MODSCAN_PROJECT",
        value_name = "PATH",
        global = true
    )]
    pub project: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List the canonical directory of every installed package
    Enumerate(EnumerateArgs),

    /// Print the deduplicated dependency tree reported by the package manager
    Extract(ExtractArgs),

    /// Resolve the entry file of a package directory
    Entry(EntryArgs),

    /// Load a plugin module and list its exports
    Load(LoadArgs),

    /// Parse a file with the project's parser plugins
    Parse(ParseArgs),

    /// List the registered parser plugins in dispatch order
    Parsers,
}

#[derive(clap::Args, Debug)]
pub struct EnumerateArgs {
    /// Module store to walk instead of the project's
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Also resolve the entry file of each package
    #[arg(long)]
    pub entries: bool,
}

#[derive(clap::Args, Debug)]
pub struct EntryArgs {
    /// Package directory
    #[arg(value_name = "PKG_DIR")]
    pub package_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct LoadArgs {
    /// Package name, path or file:// URL
    #[arg(value_name = "IDENTIFIER")]
    pub identifier: String,
}

#[derive(clap::Args, Debug)]
pub struct ParseArgs {
    /// File to parse
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Content type token (defaults to the file extension)
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub type_hint: Option<String>,

    /// Use the non-suspending parse operation
    #[arg(long)]
    pub sync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = modscan::runtime::RealRuntime;
    let host = modscan::parser::builtin_modules();

    match cli.command {
        Commands::Enumerate(args) => modscan::commands::enumerate(runtime, cli.project, args.store)?,
        Commands::Extract(args) => {
            modscan::commands::extract(runtime, cli.project, args.entries).await?
        }
        Commands::Entry(args) => modscan::commands::entry(runtime, &args.package_dir)?,
        Commands::Load(args) => {
            modscan::commands::load(runtime, &host, cli.project, &args.identifier).await?
        }
        Commands::Parse(args) => {
            modscan::commands::parse(
                runtime,
                &host,
                cli.project,
                &args.file,
                args.type_hint,
                args.sync,
            )
            .await?
        }
        Commands::Parsers => modscan::commands::parsers(runtime, &host, cli.project).await?,
    }
    Ok(())
}
