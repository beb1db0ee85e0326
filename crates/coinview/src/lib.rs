//! The UTXO working set used while connecting a block, and everything that
//! feeds it: prefetch planning, the storage fetch contract and the connect
//! rule.

pub mod coins;
pub mod connect;
pub mod error;
pub mod fanout;
pub mod fetch;
pub mod prefetch;
pub mod store;
pub mod unspent;

pub use coins::{Coins, UnspentOutput};
pub use connect::{ConnectError, ScriptVerifier, UtxoSetRule};
pub use error::CoinViewFault;
pub use fanout::{Fanout, FanoutConfig, DEFAULT_FANOUT_THRESHOLD, DEFAULT_MAX_WORKERS};
pub use fetch::{CoinView, FetchCoinsResponse, Fetched, HashHeightPair};
pub use prefetch::{load_unspent_set, CoinviewHelper};
pub use store::StoreCoinView;
pub use unspent::UnspentOutputSet;
