use thiserror::Error;

/// Failure serializing or deserializing a payload, per `spec.md` §7.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be represented on the wire.
    #[error("failed to serialize value: {0}")]
    Serialize(#[source] bincode::Error),
    /// The input was truncated, corrupt, or of an unknown type.
    #[error("failed to deserialize value: {0}")]
    Deserialize(#[source] bincode::Error),
}
