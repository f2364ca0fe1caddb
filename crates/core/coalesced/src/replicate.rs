use crate::ReplicateError;

/// Strategy for handing each caller its own copy of a shared value.
///
/// The service keeps exactly one copy of a successful value per epoch and calls
/// [`Replicate::replicate`] once per receiver. Implementations must not alter the
/// stored value, so a failure for one receiver never affects another.
pub trait Replicate<V>: Send + Sync + 'static {
    fn replicate(&self, value: &V) -> Result<V, ReplicateError>;
}

/// Replicates through [`Clone`], never fails.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CloneReplicator;

impl<V: Clone> Replicate<V> for CloneReplicator {
    fn replicate(&self, value: &V) -> Result<V, ReplicateError> {
        Ok(value.clone())
    }
}

impl<V, F> Replicate<V> for F
where
    F: Fn(&V) -> Result<V, ReplicateError> + Send + Sync + 'static,
{
    fn replicate(&self, value: &V) -> Result<V, ReplicateError> {
        self(value)
    }
}
