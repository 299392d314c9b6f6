pub mod client;
pub mod signing;
pub mod wallet;

pub use client::LcdClient;
pub use signing::{AminoSigner, FeeSchedule};
pub use wallet::{Wallet, WalletError};
