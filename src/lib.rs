//! Trade Mission — chat bot that collects fleet carrier trade missions,
//! formats them, and saves or publishes them.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod mission;
pub mod publish;
pub mod store;
