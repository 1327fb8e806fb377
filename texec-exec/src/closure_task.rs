use std::path::Path;

use texec_codec::{ClosureCodec, Codec, OperatorRegistry, TaskAttributes};
use texec_dag::{ClosureOutcome, ClosureSpec, SessionId, TaskOutcome};

use crate::envelope::EnvelopeBase;
use crate::envelope::RemoteTaskEnvelope;
use crate::error::ExecutionError;

/// Specialization of [`RemoteTaskEnvelope`] that rehydrates a pre-registered
/// operator and its delegate context, invokes it, and returns `{value,
/// context}` (`spec.md` §4.5). Resolves the operator directly through the
/// worker's [`OperatorRegistry`] rather than a session-scoped class loader:
/// the bounded, pre-registered form from `spec.md` §9 Design Notes needs no
/// class loader to resolve against.
pub struct ClosureTaskEnvelope {
    base: EnvelopeBase,
    spec: ClosureSpec,
}

impl ClosureTaskEnvelope {
    /// Build a new closure task envelope.
    pub fn new(attributes: &TaskAttributes, session_id: SessionId, spec: ClosureSpec) -> Result<Self, ExecutionError> {
        Ok(ClosureTaskEnvelope {
            base: EnvelopeBase::new(attributes, session_id)?,
            spec,
        })
    }
}

impl RemoteTaskEnvelope for ClosureTaskEnvelope {
    fn base(&self) -> &EnvelopeBase {
        &self.base
    }

    fn execute0(&self, _scratch: &Path, attributes: &TaskAttributes) -> Result<TaskOutcome, ExecutionError> {
        let operator = OperatorRegistry::resolve(&self.spec.operator)
            .map_err(|err| ExecutionError::process(&attributes.name, err))?;

        let mut delegate = ClosureCodec::deserialize_delegate(&self.spec.delegate)
            .map_err(|err| ExecutionError::process(&attributes.name, err))?;

        let value = operator
            .invoke(&self.spec.args, &mut delegate)
            .map_err(|err| ExecutionError::process(&attributes.name, err))?;

        Ok(TaskOutcome::Closure(ClosureOutcome {
            value,
            context: delegate,
        }))
    }

    // Cancellation is a no-op (`spec.md` §4.5): no external process to
    // interrupt, and closure invocation is not preemptible from the
    // outside.
}
