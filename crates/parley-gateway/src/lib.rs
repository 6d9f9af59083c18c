pub mod connection;
pub mod relay;
