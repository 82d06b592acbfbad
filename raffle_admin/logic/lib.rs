pub mod cache;
pub mod config;
pub mod create_round;
pub mod error;
pub mod evm_contract;
pub mod indexer;
pub mod metadata;
pub mod notification;
pub mod past_raffles;
pub mod rounds;
pub mod types;
pub mod units;
