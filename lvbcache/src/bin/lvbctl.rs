use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use lvbcache::accounting::MemAccounting;
use lvbcache::backend::ObjectResolver;
use lvbcache::backend::localfs::LocalFsStore;
use lvbcache::backend::memory::MemObjectStore;
use lvbcache::config::{BackendConfig, load_config};
use lvbcache::filter::FilterLvb;
use lvbcache::namespace::LvbNamespace;
use lvbcache::ResId;

#[derive(Parser)]
#[command(name = "lvbctl", version, about = "Inspect lock value blocks of a storage target")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Glimpse objects and print their cached attributes
    Glimpse {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        group: u64,
        /// Object ids to glimpse
        #[arg(required = true)]
        objects: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Glimpse {
            config,
            group,
            objects,
        } => {
            let path = config.to_str().context("config path is not valid UTF-8")?;
            let cfg = load_config(path)?;
            let resolver: Arc<dyn ObjectResolver> = match &cfg.backend {
                BackendConfig::Localfs { root } => {
                    info!("[lvbctl] {}: objects under {}", cfg.target, root.display());
                    Arc::new(LocalFsStore::new(root))
                }
                BackendConfig::Memory => Arc::new(MemObjectStore::new()),
            };
            let acct = Arc::new(MemAccounting::new(cfg.mem_limit));
            let ns = LvbNamespace::new(
                cfg.target.clone(),
                FilterLvb::new(cfg.target.clone(), resolver, acct.clone()),
            );

            for oid in objects {
                let id = ResId::new(oid, group);
                match ns.glimpse(id).await {
                    Ok(lvb) => println!(
                        "{id}: size={} mtime={} atime={} ctime={} blocks={}",
                        lvb.size, lvb.mtime, lvb.atime, lvb.ctime, lvb.blocks
                    ),
                    Err(e) => println!("{id}: {e} (rc {})", e.errno()),
                }
            }

            ns.shutdown().await;
            acct.report(&cfg.target);
        }
    }

    Ok(())
}
