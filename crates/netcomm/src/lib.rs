//! Typed-value framing over TCP and UDP.
//!
//! Peers exchange frames made of a one-byte command and an ordered list of
//! typed arguments (integers, floats, booleans, text, byte arrays), protected
//! by an XOR checksum and decoded incrementally from arbitrary read chunks.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener/stream and UDP endpoint wrappers
//! - [`frame`]: typed values, encoder, resumable decoder, blocking and async codecs
//! - [`socket`]: sockets with background receive loops and stall detection (behind `socket` feature)

/// Re-export transport types.
pub mod transport {
    pub use netcomm_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use netcomm_frame::*;
}

/// Re-export socket types (requires `socket` feature).
#[cfg(feature = "socket")]
pub mod socket {
    pub use netcomm_socket::*;
}
