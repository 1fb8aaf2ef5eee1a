use mekgoro_core::ActorId;

/// Acting user for a request.
///
/// Inserted by the actor middleware; present on every ledger route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: ActorId,
}

impl ActorContext {
    pub fn new(actor: ActorId) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }
}
