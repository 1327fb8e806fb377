//! The Task Payload Codec (`spec.md` §4.1) and the operator registry that
//! stands in for a portable class loader (`spec.md` §4.5, §9 Design Notes).
//!
//! Two symmetric codecs are exposed: [`AttributeCodec`] for the envelope's
//! wire attributes, and [`ClosureCodec`] for an operator's arguments. Both
//! are backed by `bincode`, the same choice `task-maker-cache` and
//! `task-maker-store` make for their own on-disk/on-wire structures, and
//! both consult the same [`OperatorRegistry`] for resolving a closure's
//! target, satisfying the "must agree on class resolution rules" invariant
//! from `spec.md` §4.1 without a real class loader to resolve against.

mod attributes;
mod closure;
mod error;
mod registry;

pub use attributes::{AttributeCodec, TaskAttributes};
pub use closure::ClosureCodec;
pub use error::CodecError;
pub use registry::{DelegateContext, Operator, OperatorError, OperatorRegistration, OperatorRegistry};

/// A symmetric serializer: `deserialize(serialize(x))` is observationally
/// equal to `x` for all supported values (`spec.md` §4.1 invariant, tested
/// per type in each module).
pub trait Codec<T> {
    /// Serialize a value to its wire representation.
    fn serialize(value: &T) -> Result<Vec<u8>, CodecError>;
    /// Deserialize a value from its wire representation.
    fn deserialize(bytes: &[u8]) -> Result<T, CodecError>;
}
