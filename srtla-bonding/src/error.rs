//! Session error taxonomy

use thiserror::Error;

/// Fatal bonding session errors
///
/// Each of these ends the session: it is reported exactly once through the
/// session delegate, after which the session is back in the idle state.
/// Per-link failures that leave at least one usable link are absorbed
/// without surfacing here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No remote connection was registered before the connect timeout")]
    HandshakeTimeout,

    #[error("No viable link to send on")]
    NoViableLink,

    #[error("Local listener failed: {0}")]
    ListenerBindFailure(String),

    #[error("Registration rejected by the bonding server")]
    RegistrationRejected,
}
