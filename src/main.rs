use clap::{Parser, Subcommand};
use dds::chunker::Chunker;
use dds::config::NodeConfig;
use dds::dds::DdsService;
use dds::home::NodeHome;
use dds::network::{NetworkService, PeerStoreTransport};
use dds::peer::PeerNode;
use dds::storage::MemoryStorage;
use dds::transaction::{Transaction, TransactionType};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dds",
    version,
    about = "Content-addressed storage with a signed append-only ledger"
)]
struct Cli {
    /// Node home directory (default: ./dds-home)
    #[arg(long, default_value = "dds-home")]
    home: PathBuf,

    /// Override the configured chunk size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a node home (config, wallet, genesis chain)
    Init,
    /// Print this node's wallet address
    Address,
    /// Store a file and print its content id
    Publish { file: PathBuf },
    /// Reconstruct content by id
    Retrieve {
        id: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Publish a file and record it on the ledger in a signed transaction
    Post {
        file: PathBuf,
        /// Transaction type
        #[arg(long, default_value = "post-created")]
        kind: String,
    },
    /// Show ledger blocks, newest first
    Log {
        /// Max entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show one transaction
    ShowTx { id: String },
    /// Validate the whole ledger
    Verify,
    /// Show node statistics
    Stats,
    /// Publish on one in-process node and fetch it from another
    Simulate {
        /// Text to publish
        #[arg(default_value = "This is my first decentralized post...")]
        text: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.log_filter);

    let result = match cli.command {
        Commands::Init => cmd_init(&cli.home),
        Commands::Address => cmd_address(&cli.home),
        Commands::Publish { file } => cmd_publish(&cli.home, &config, &file),
        Commands::Retrieve { id, output } => {
            cmd_retrieve(&cli.home, &config, &id, output.as_deref())
        }
        Commands::Post { file, kind } => cmd_post(&cli.home, &config, &file, &kind),
        Commands::Log { limit } => cmd_log(&cli.home, limit),
        Commands::ShowTx { id } => cmd_show_tx(&cli.home, &id),
        Commands::Verify => cmd_verify(&cli.home),
        Commands::Stats => cmd_stats(&cli.home),
        Commands::Simulate { text } => cmd_simulate(&config, &text),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> dds::Result<NodeConfig> {
    let mut config = NodeHome::open(&cli.home)?.config()?;
    if let Some(size) = cli.chunk_size {
        config.chunk_size = size;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_init(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::init(path)?;
    println!("Initialized node home at {}", path.display());
    println!("Address: {}", home.wallet()?.address());
    Ok(())
}

fn cmd_address(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::open(path)?;
    println!("{}", home.wallet()?.address());
    Ok(())
}

fn cmd_publish(
    path: &Path,
    config: &NodeConfig,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::open(path)?;
    let data = fs::read(file)?;
    let id = home.service(config)?.publish(&data)?;
    println!("{}", id);
    Ok(())
}

fn cmd_retrieve(
    path: &Path,
    config: &NodeConfig,
    id: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::open(path)?;
    let data = home.service(config)?.retrieve(id)?;
    match output {
        Some(out) => {
            fs::write(out, &data)?;
            println!("Wrote {} bytes to {}", data.len(), out.display());
        }
        None => println!("{}", String::from_utf8_lossy(&data)),
    }
    Ok(())
}

fn cmd_post(
    path: &Path,
    config: &NodeConfig,
    file: &Path,
    kind: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::open(path)?;
    let tx_type: TransactionType = kind.parse()?;
    let wallet = home.wallet()?;
    let chain = home.chain()?;

    let content_id = home.service(config)?.publish(&fs::read(file)?)?;
    let mut tx = Transaction::new(wallet.address(), tx_type, content_id.clone().into_bytes())?;
    tx.sign(&wallet.private_key_bytes())?;
    let block = chain.add_block(vec![tx.clone()])?;
    home.save_chain(&chain)?;

    println!("content {}", content_id);
    println!("tx      {}", tx.id);
    println!("block   #{} {}", block.index(), &block.hash[..16]);
    Ok(())
}

fn cmd_log(path: &Path, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let chain = NodeHome::open(path)?.chain()?;
    for block in chain.blocks().iter().rev().take(limit) {
        let when = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(block.header.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| block.header.timestamp.to_string());
        println!(
            "#{} {} {} ({} tx)",
            block.index(),
            &block.hash[..8],
            when,
            block.transactions.len(),
        );
        for tx in &block.transactions {
            println!(
                "    {} {} from {}",
                &tx.id[..8],
                tx.tx_type,
                &tx.sender_address[..8.min(tx.sender_address.len())],
            );
        }
    }
    Ok(())
}

fn cmd_show_tx(path: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let chain = NodeHome::open(path)?.chain()?;
    let tx = chain.get_transaction_by_id(id)?;
    println!("{}", serde_json::to_string_pretty(&tx)?);
    if let Some(text) = tx.payload_str() {
        println!("payload: {}", text);
    }
    println!("signature valid: {}", tx.verify_signature());
    Ok(())
}

fn cmd_verify(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::open(path)?;
    let chain = home.chain()?;
    chain.validate_chain()?;
    println!("Chain valid: {} block(s)", chain.len());
    Ok(())
}

fn cmd_stats(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let home = NodeHome::open(path)?;
    let storage = home.storage()?;
    let chain = home.chain()?;
    println!("Chunks:    {}", storage.chunk_count()?);
    println!("Manifests: {}", storage.manifest_count()?);
    println!("Disk:      {} bytes", storage.disk_usage()?);
    println!("Blocks:    {}", chain.len());
    Ok(())
}

fn cmd_simulate(config: &NodeConfig, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(PeerStoreTransport::new());
    let make_node = |id: &str| -> dds::Result<(DdsService, Arc<MemoryStorage>)> {
        let storage = Arc::new(MemoryStorage::new());
        transport.register(id, storage.clone());
        let network = Arc::new(NetworkService::new(
            PeerNode::new(id, format!("{}.sim", id), 1.0),
            transport.clone(),
        ));
        let service = DdsService::new(Chunker::new(config.chunk_size)?, storage.clone(), network);
        Ok((service, storage))
    };

    let (origin, _) = make_node("origin")?;
    let (reader, reader_store) = make_node("reader")?;

    let id = origin.publish(text.as_bytes())?;
    println!("origin published {}", id);
    reader
        .network()
        .add_peer_to_network_view(origin.network().local_node())?;

    let fetched = reader.retrieve(&id)?;
    println!(
        "reader fetched {} bytes from peer ({} chunk(s) cached): {}",
        fetched.len(),
        reader_store.chunk_count(),
        String::from_utf8_lossy(&fetched)
    );
    Ok(())
}
