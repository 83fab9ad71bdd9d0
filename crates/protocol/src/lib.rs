//! Messaging-protocol client interface.
//!
//! The gateway never speaks the wire protocol itself. It drives a
//! [`ProtocolClient`] obtained from a [`ClientConnector`] and consumes the
//! [`ProtocolEvent`] stream that comes with it. The [`loopback`] module
//! provides an in-process implementation for development and tests.

pub mod address;
pub mod client;
pub mod error;
pub mod event;
pub mod loopback;

pub use address::{normalize_phone, Address, GROUP_SERVER, USER_SERVER};
pub use client::{
    ClientConnector, ClientHandle, ConnectedIdentity, GroupInfo, ProtocolClient, QrEvent,
    SendReceipt,
};
pub use error::ProtocolError;
pub use event::{InboundMessage, MessageContent, ProtocolEvent};
