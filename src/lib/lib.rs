pub mod adapters;
pub mod coordinator;
pub mod crypto;
pub mod domain;
pub mod ports;
