//! Error types for the route table cache
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information
//! - SI-10: Information Input Validation - Decode rejections carry the violated rule

use thiserror::Error;

/// Reasons a kernel route message is rejected by the decoder.
///
/// Rejections are never fatal: the offending message is logged and dropped,
/// and processing continues with the next one.
///
/// # NIST Controls
/// - SI-10: Information Input Validation - Untrusted kernel input is schema checked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Framing, header or attribute layout rejected by the netlink parser
    #[error("malformed netlink message: {0}")]
    Malformed(String),

    /// Well-formed netlink message that is not a route message
    #[error("unexpected netlink message type {0}")]
    UnexpectedType(u16),

    /// Mandatory attribute absent
    #[error("missing mandatory attribute {0}")]
    MissingAttribute(&'static str),

    /// IPv4 route attribute that does not carry a four-byte address
    #[error("attribute {0} is not an IPv4 address")]
    AttributeWidth(&'static str),
}

/// Errors that can occur while maintaining the route cache
///
/// # NIST Controls
/// - SI-11(a): Generate error messages providing information necessary for corrective actions
#[derive(Debug, Error)]
pub enum RouteTableError {
    /// Netlink socket creation, bind or send failed
    /// NIST: SC-7 (Boundary Protection) - Kernel interface errors
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// Kernel answered a dump request with NLMSG_ERROR
    #[error("Route dump failed: errno {errno}")]
    DumpFailed { errno: i32 },

    /// Message failed validation
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration error
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for route table operations
pub type Result<T> = std::result::Result<T, RouteTableError>;
