// chainmesh-node - run one peer of the network
//
// Reads operator commands from stdin once the peer listener is up.

use chainmesh::ledger::Ledger;
use chainmesh::node::{parse_seed_list, Node, NodeConfig, DEFAULT_P2P_PORT};
use chainmesh::transport::TransportConfig;
use chainmesh::wallet::PublicKey;
use clap::Parser;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chainmesh-node", version, about = "Run a chainmesh peer")]
struct Cli {
    /// Interface to listen on
    #[arg(long, env = "P2P_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Peer-to-peer port
    #[arg(short, long, env = "P2P_PORT", default_value_t = DEFAULT_P2P_PORT)]
    port: u16,

    /// Comma separated seed peers, e.g. ws://localhost:5001,localhost:5002
    #[arg(long, env = "PEERS", default_value = "")]
    peers: String,

    /// Maximum simultaneous peer connections
    #[arg(long, default_value_t = 100)]
    max_connections: u32,

    /// Outbound connect timeout in seconds (default: no timeout)
    #[arg(long)]
    connect_timeout: Option<u32>,
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let transport = TransportConfig::new()
            .with_max_connections(self.max_connections)
            .with_connect_timeout(self.connect_timeout);

        NodeConfig::new()
            .with_listen_address(SocketAddr::new(self.host, self.port))
            .with_seed_peers(parse_seed_list(&self.peers))
            .with_transport(transport)
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Mine,
    Send { recipient: PublicKey, amount: u64 },
    Chain,
    Pool,
    Peers,
    Connect(String),
    Stats,
    Wallet,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Err("empty command".to_string());
    };

    let command = match word {
        "mine" => Command::Mine,
        "send" => {
            let recipient = parts.next().ok_or("usage: send <address> <amount>")?;
            let amount = parts.next().ok_or("usage: send <address> <amount>")?;
            Command::Send {
                recipient: PublicKey::from_hex(recipient).map_err(|e| e.to_string())?,
                amount: amount.parse().map_err(|_| format!("bad amount: {}", amount))?,
            }
        }
        "chain" => Command::Chain,
        "pool" => Command::Pool,
        "peers" => Command::Peers,
        "connect" => Command::Connect(parts.next().ok_or("usage: connect <host:port>")?.to_string()),
        "stats" => Command::Stats,
        "wallet" => Command::Wallet,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: {} (try `help`)", other)),
    };
    Ok(command)
}

const HELP: &str = "commands: mine | send <address> <amount> | chain | pool | peers | connect <host:port> | stats | wallet | quit";

async fn run_command(node: &Node, command: Command) {
    match command {
        Command::Mine => match node.mine().await {
            Ok(block) => println!("mined block {} with {} transactions", block.hash(), block.data().len()),
            Err(e) => println!("mining failed: {}", e),
        },
        Command::Send { recipient, amount } => match node.submit_transaction(recipient, amount).await {
            Ok((tx, peers)) => println!("transaction {} sent to {} peers", tx.id(), peers),
            Err(e) => println!("transaction failed: {}", e),
        },
        Command::Chain => {
            for (height, block) in node.ledger().units().iter().enumerate() {
                println!("#{} {} ({} txs)", height, block.hash(), block.data().len());
            }
        }
        Command::Pool => {
            for tx in node.pool().transactions() {
                println!("{} outputs={} total={}", tx.id(), tx.outputs().len(), tx.output_total());
            }
        }
        Command::Peers => {
            for peer in node.registry().peers().await {
                println!("{} {} {}", peer.id, peer.address, peer.direction);
            }
        }
        Command::Connect(address) => match node.registry().connect(&address).await {
            Ok(id) => println!("connected {} as {}", address, id),
            Err(e) => println!("connect failed: {}", e),
        },
        Command::Stats => println!("{:?}", node.registry().gossip_stats()),
        Command::Wallet => println!(
            "address {} balance {}",
            node.wallet().public_key(),
            node.wallet().balance()
        ),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

/// Run operator commands until end of input, `quit` or `interrupted`.
///
/// `interrupted` is polled across iterations, so a signal that lands while a
/// command is running still ends the loop.
async fn operator_loop<R, F>(node: &Node, input: R, interrupted: F)
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = io::Result<()>>,
{
    let mut lines = input.lines();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(node, command).await,
                    Err(e) => println!("{}", e),
                }
            }
            _ = &mut interrupted => break,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Cli::parse().into_config();

    let node = match Node::new(config) {
        Ok(node) => node,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.start().await {
        error!("{}", e);
        std::process::exit(1);
    }
    println!("{}", HELP);

    operator_loop(&node, BufReader::new(tokio::io::stdin()), tokio::signal::ctrl_c()).await;

    info!("shutting down");
    node.shutdown().await;
}
