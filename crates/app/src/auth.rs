/// Caller identity established by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

/// Yields the ambient caller identity, or none when the caller is not
/// authenticated. How identities are established is the embedder's concern.
pub trait IdentityGate: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Fixed identity, for embedders that authenticate out of band and for tests.
pub struct StaticIdentity(pub String);

impl IdentityGate for StaticIdentity {
    fn current_identity(&self) -> Option<Identity> {
        Some(Identity {
            subject: self.0.clone(),
        })
    }
}

/// No ambient identity; every write fails closed.
pub struct Anonymous;

impl IdentityGate for Anonymous {
    fn current_identity(&self) -> Option<Identity> {
        None
    }
}
