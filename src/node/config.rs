// Node configuration - everything a node needs at startup
//
// Built explicitly by the caller (the binary fills it from CLI flags and
// environment) and handed to `Node::new`; nothing is read from globals.

use crate::transport::{normalize_address, TransportConfig, TransportError};
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Default peer-to-peer port
pub const DEFAULT_P2P_PORT: u16 = 5001;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid seed peer address: {0}")]
    InvalidSeed(String),

    #[error("Invalid transport configuration: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the peer listener binds to
    pub listen_address: SocketAddr,
    /// Peers dialed once at startup
    pub seed_peers: Vec<String>,
    pub transport: TransportConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_P2P_PORT)),
            seed_peers: Vec::new(),
            transport: TransportConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen_address(mut self, address: SocketAddr) -> Self {
        self.listen_address = address;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_address.set_port(port);
        self
    }

    pub fn with_seed_peers(mut self, peers: Vec<String>) -> Self {
        self.seed_peers = peers;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        for seed in &self.seed_peers {
            normalize_address(seed).map_err(|_| ConfigError::InvalidSeed(seed.clone()))?;
        }
        Ok(())
    }
}

/// Split a comma separated peer list such as `ws://a:5001,b:5002`
pub fn parse_seed_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
