//! Broker Transport
//!
//! Establishes the outbound network connection for a broker URL. Once the
//! connection exists the transport behind it is irrelevant to the relay.

pub mod connector;
pub mod stream;

pub use connector::{default_tls_config, open_connection, TransportError, SUPPORTED_SCHEMES};
pub use stream::{BrokerStream, WsByteStream};
