//! A minimal filesystem-addressed datagram client.
//!
//! An [`Endpoint`](endpoint::Endpoint) binds a unix datagram socket to a
//! path, sends opaque byte payloads to peers named by their own bound paths,
//! and receives single datagrams back. Delivery is unreliable and unordered;
//! nothing here compensates for dropped or duplicated datagrams.

pub mod config;
pub mod endpoint;
pub mod socket;
