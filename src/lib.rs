pub mod anchor;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod server;
pub mod state;
