// chainmesh - peer-to-peer chain and transaction gossip
//
// Nodes keep a set of TCP peer links, exchange their full chain and pending
// transactions as JSON frames, and converge on the longest valid chain.
// A local miner turns the pending pool into a block and propagates it.

pub mod ledger;
pub mod miner;
pub mod node;
pub mod sync;
pub mod transport;
pub mod wallet;
