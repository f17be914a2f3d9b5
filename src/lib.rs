pub mod config;
pub mod connection;
pub mod games;
pub mod lobby;
pub mod registry;
pub mod stats;
pub mod tournament;
pub mod types;
