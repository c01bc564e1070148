//! Error kinds surfaced by the world, the tracker and the loaders.
//!
//! Loader and GPU internals work with [`anyhow::Error`] and are converted into
//! [`WorldError`] at the crate boundary. Misuse of the readiness protocol is
//! reported separately as [`ProtocolViolation`] so callers can tell a bug in
//! their own sequencing apart from an asset that failed to load.

pub type WorldResult<T> = Result<T, WorldError>;

/// Misuse of the readiness protocol by a caller.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("a load was registered after the tracker already fired")]
    IncrementAfterReady,

    #[error("decrement called with no pending loads")]
    UnbalancedDecrement,

    #[error("tracking was already started")]
    AlreadyStarted,

    #[error("render called before all resources were ready")]
    RenderBeforeReady,
}

#[derive(thiserror::Error, Debug)]
pub enum WorldError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("failed to load {asset}: {source}")]
    LoadFailed {
        asset: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("load of {0} was cancelled")]
    LoadCancelled(String),

    #[error("animation error: {0}")]
    Animation(String),

    #[error("uv error: {0}")]
    Uv(String),

    #[error("no frame named {0}")]
    MissingFrame(String),

    #[error("text error: {0}")]
    Text(String),

    #[error("render error: {0}")]
    Render(#[source] anyhow::Error),
}

impl WorldError {
    pub fn load_failed(asset: impl Into<String>, source: anyhow::Error) -> Self {
        Self::LoadFailed {
            asset: asset.into(),
            source,
        }
    }

    pub fn animation(msg: impl Into<String>) -> Self {
        Self::Animation(msg.into())
    }

    pub fn uv(msg: impl Into<String>) -> Self {
        Self::Uv(msg.into())
    }

    pub fn text(msg: impl Into<String>) -> Self {
        Self::Text(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_violations_convert_and_keep_their_message() {
        let err: WorldError = ProtocolViolation::UnbalancedDecrement.into();
        assert!(matches!(
            err,
            WorldError::Protocol(ProtocolViolation::UnbalancedDecrement)
        ));
        assert!(err.to_string().contains("no pending loads"));
    }

    #[test]
    fn load_failed_preserves_source() {
        let base = std::io::Error::other("disk on fire");
        let err = WorldError::load_failed("hut.gltf", anyhow::Error::new(base));
        let msg = err.to_string();
        assert!(msg.contains("hut.gltf"));
        assert!(msg.contains("disk on fire"));
    }
}
