use std::collections::BTreeMap;

use thiserror::Error;

/// The bindings (variables, script owner) a closure is bound to when
/// invoked, per `spec.md`'s glossary entry for "Delegate context". Kept as
/// an opaque byte-valued map rather than a typed struct because each
/// operator interprets its own subset of it.
pub type DelegateContext = BTreeMap<String, Vec<u8>>;

/// Failure invoking a registered operator.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// No operator is registered under the given id.
    #[error("no operator registered under id {0:?}")]
    Unknown(String),
    /// The operator's own logic failed.
    #[error("operator {operator:?} failed: {message}")]
    Failed {
        /// The operator's id.
        operator: String,
        /// Description of the failure.
        message: String,
    },
}

/// A pre-registered, named operator a closure task can invoke. This is the
/// "bounded form" `spec.md` §9 recommends in place of shipping arbitrary
/// user closures, which Rust has no portable way to serialize: the operator
/// is looked up by id the way the spec's Class-Loader Provider resolves a
/// session's class loader.
pub trait Operator: Sync {
    /// Stable identifier this operator is registered under.
    fn id(&self) -> &'static str;

    /// Invoke the operator with its serialized arguments and delegate
    /// context, returning the serialized return value. The delegate is
    /// passed by mutable reference so the operator can update it the way a
    /// closure mutates its bound delegate in `spec.md` §4.5.
    fn invoke(&self, args: &[u8], delegate: &mut DelegateContext) -> Result<Vec<u8>, OperatorError>;
}

/// A compile-time registration of an [`Operator`]. Operators register
/// themselves with `inventory::submit!`, mirroring the teacher's own use of
/// `inventory` for plugin-style registration.
pub struct OperatorRegistration(pub &'static dyn Operator);

inventory::collect!(OperatorRegistration);

/// Resolves an operator id to the registered [`Operator`], the worker-side
/// analog of `spec.md`'s Class-Loader Provider (`getClassLoaderFor`).
pub struct OperatorRegistry;

impl OperatorRegistry {
    /// Look up an operator by its registered id.
    pub fn resolve(id: &str) -> Result<&'static dyn Operator, OperatorError> {
        inventory::iter::<OperatorRegistration>()
            .find(|registration| registration.0.id() == id)
            .map(|registration| registration.0)
            .ok_or_else(|| OperatorError::Unknown(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl Operator for Echo {
        fn id(&self) -> &'static str {
            "texec.test.echo"
        }
        fn invoke(
            &self,
            args: &[u8],
            delegate: &mut DelegateContext,
        ) -> Result<Vec<u8>, OperatorError> {
            delegate.insert("count".to_string(), vec![1]);
            Ok(args.to_vec())
        }
    }
    inventory::submit! { OperatorRegistration(&Echo) }

    #[test]
    fn resolves_a_registered_operator() {
        let op = OperatorRegistry::resolve("texec.test.echo").unwrap();
        let mut delegate = DelegateContext::new();
        let out = op.invoke(&[1, 2, 3], &mut delegate).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(delegate.get("count"), Some(&vec![1]));
    }

    #[test]
    fn unknown_operator_is_an_error() {
        assert!(OperatorRegistry::resolve("does.not.exist").is_err());
    }
}
