//! Client-server statistics protocol.
//!
//! This module defines how arrays travel from a client to the Tally server,
//! how the server is asked to compute their statistics, and how results come
//! back. It provides the wire codec, the per-connection session state machine,
//! the connection acceptor and a matching client.
//!
//! # Overview
//!
//! A connection carries a single job set. The client submits any number of
//! arrays, asks for a computation, then fetches the results. Messages on one
//! connection are handled strictly in the order they arrive; connections never
//! share state.
//!
//! # Key Components
//!
//! - [`Request`] / [`Response`]: messages from the client and replies from the server.
//! - [`ProtocolTransport`]: fixed-width codec over any `Read + Write` stream.
//! - [`Session`]: per-connection state driven by requests.
//! - [`StatServer`]: accepts connections and runs one session per connection.
//! - [`Client`]: the peer side of the exchange.
//!
//! # Binary Format
//!
//! Every frame starts with a one-byte discriminator; there is no length
//! header, each message type has a fixed layout:
//!
//! - `0x01` SubmitArray: `[u32 len][u32 workers][i32 × len]`, no reply.
//! - `0x02` Compute: reply `[u8 status]`.
//! - `0x03` FetchResults: reply `[u8 status]`, then on success
//!   `[u32 count]` and per result `[u32 modeSize][i32 × modeSize][f64 median]`.
//!
//! All integers are big-endian. The median travels as the big-endian bytes of
//! its IEEE-754 bit pattern.
//!
//! A SubmitArray with a length outside `1..=MAX_ARRAY_LEN`, or an unknown
//! discriminator, closes the connection without a reply. Compute and
//! FetchResults report precondition failures through their status byte.
//!
//! # See Also
//!
//! - [`stats`](crate::stats): the parallel aggregation run on Compute.
mod client;
mod request;
mod response;
mod server;
mod session;
mod shutdown;
mod transport;

pub use client::Client;
pub use request::Request;
pub use response::{ComputeStatus, FetchReply, Response};
pub use server::{ServerConfig, ServerError, StatServer};
pub use session::{Session, SessionState};
pub use shutdown::Shutdown;
pub use transport::{ProtocolTransport, TransportError};

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8080;

/// Largest array a single SubmitArray may carry.
pub const MAX_ARRAY_LEN: usize = 100_000;
