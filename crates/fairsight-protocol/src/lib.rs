//! Fairsight Protocol - Wire formats for the daemon
//!
//! Two boundaries are described here: the JSON-lines protocol spoken between
//! UI clients and the daemon, and the request/reply schema of the capture
//! backend the daemon consumes.

pub mod backend;
pub mod message;
pub mod version;

pub use backend::{BackendReply, BackendRequest, ShapeError};
pub use message::{ClientMessage, DaemonMessage, DiscoveryReport, MessageType};
pub use version::{ProtocolVersion, VersionError};
