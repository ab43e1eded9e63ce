use std::sync::Arc;

use relog_repo::{AccountStore, ActorStore};
use relog_sequencer::EventSource;

/// Everything a recovery run talks to.
///
/// The account store and the actor store must resolve storage locations
/// under the same root, since account deletion removes the directory the
/// account store names.
#[derive(Clone)]
pub struct RecoveryContext {
    pub events: Arc<dyn EventSource>,
    pub accounts: Arc<dyn AccountStore>,
    pub actors: Arc<ActorStore>,
}

impl RecoveryContext {
    pub fn new(
        events: Arc<dyn EventSource>,
        accounts: Arc<dyn AccountStore>,
        actors: Arc<ActorStore>,
    ) -> Self {
        Self {
            events,
            accounts,
            actors,
        }
    }
}

impl std::fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("actors", &self.actors)
            .finish_non_exhaustive()
    }
}
