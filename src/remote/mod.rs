//! Point-to-point remote command channel: command framing, link interface
//! preparation, the listener, and the sending client.

pub mod client;
pub mod netif;
pub mod protocol;
pub mod server;
