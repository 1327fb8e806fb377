use texec_dag::ClosureSpec;

use crate::registry::DelegateContext;
use crate::{Codec, CodecError};

/// Codec for a [`ClosureSpec`], backed by `bincode` like [`AttributeCodec`](crate::AttributeCodec).
///
/// Kept distinct from `AttributeCodec` rather than folded into it because the
/// two travel on different legs of the envelope's lifecycle: the attributes
/// are decoded once by the worker on hydration, while a closure's `args` are
/// decoded again by the resolved [`Operator`](crate::Operator) right before
/// invocation, and its `delegate` is re-encoded on the way back.
pub struct ClosureCodec;

impl Codec<ClosureSpec> for ClosureCodec {
    fn serialize(value: &ClosureSpec) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(CodecError::Serialize)
    }

    fn deserialize(bytes: &[u8]) -> Result<ClosureSpec, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::Deserialize)
    }
}

impl ClosureCodec {
    /// Encode a closure's delegate context (the bindings it is bound to at
    /// invocation) to the bytes carried in [`ClosureSpec::delegate`].
    pub fn serialize_delegate(delegate: &DelegateContext) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(delegate).map_err(CodecError::Serialize)
    }

    /// Decode a closure's delegate context from [`ClosureSpec::delegate`].
    pub fn deserialize_delegate(bytes: &[u8]) -> Result<DelegateContext, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn sample() -> ClosureSpec {
        ClosureSpec {
            operator: "texec.test.echo".to_string(),
            args: vec![1, 2, 3],
            delegate: vec![4, 5, 6],
        }
    }

    #[test]
    fn round_trips() {
        let spec = sample();
        let bytes = ClosureCodec::serialize(&spec).unwrap();
        let decoded = ClosureCodec::deserialize(&bytes).unwrap();
        assert_eq!(spec, decoded);
    }

    #[test]
    fn truncated_input_is_a_codec_error() {
        let spec = sample();
        let mut bytes = ClosureCodec::serialize(&spec).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(ClosureCodec::deserialize(&bytes).is_err());
    }

    #[test]
    fn delegate_context_round_trips_independently() {
        let delegate: BTreeMap<String, Vec<u8>> =
            BTreeMap::from([("count".to_string(), vec![1])]);
        let bytes = bincode::serialize(&delegate).unwrap();
        let decoded: BTreeMap<String, Vec<u8>> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(delegate, decoded);
    }
}
