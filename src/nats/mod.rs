//! NATS messaging layer

pub mod client;

pub use client::NatsClient;
