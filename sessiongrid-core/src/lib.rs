//! Core types and attribute marshalling for sessiongrid.

#![warn(missing_docs)]

pub mod error;
pub mod marshal;
pub mod session;

pub use error::{Result, SessionGridError};
pub use marshal::{AttributeMarshaller, JsonMarshaller};
pub use session::{
    AttributeChanges, AttributeValue, DataOwner, IncomingSessionData, OutgoingSessionData,
    SessionAttributes, SessionId, SessionMetadata,
};
