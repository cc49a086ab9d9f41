pub mod backend;
pub mod batch;
pub mod connection;
pub mod delivery;
pub mod events;
pub mod filename;
pub mod http_client;
pub mod poller;
pub mod reconnect;
pub mod registry;
pub mod tracker;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
