//! Session state the coordinator needs before it may act

/// Point-in-time view of the signed-in session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Authenticated user id, if signed in
    pub identity: Option<String>,
    pub setup_complete: bool,
    /// Whether the primary cat profile has been loaded
    pub primary_entity_present: bool,
}

pub trait SessionState: Send + Sync {
    fn snapshot(&self) -> SessionSnapshot;
}
