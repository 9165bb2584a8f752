/// Reconciliation between this client's own REST mutations and the
/// echoes the server pushes back on the live channel.
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// How long a confirmed creation id stays in the pending set.
pub const ECHO_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    TakeCreate,
    CommentCreate,
}

/// Captured like state, taken before an optimistic toggle so a failed
/// request can restore exactly what was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeSnapshot {
    pub user_liked: bool,
    pub like_count: u64,
}

/// Tracks recent self-authored mutations. Ids of confirmed creations
/// are held for a fixed window; at most one in-flight content record
/// exists per mutation kind.
pub struct Reconciler {
    pending: HashMap<String, Instant>,
    in_flight: HashMap<MutationKind, String>,
    window: Duration,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_window(ECHO_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            window,
        }
    }

    /// Record content that has been submitted but not yet confirmed.
    /// A second submission of the same kind replaces the first.
    pub fn note_in_flight(&mut self, kind: MutationKind, content: String) {
        self.in_flight.insert(kind, content);
    }

    /// The submission resolved (either outcome); its content no longer
    /// identifies an expected echo.
    pub fn clear_in_flight(&mut self, kind: MutationKind) {
        self.in_flight.remove(&kind);
    }

    /// The server confirmed a creation with this id. The id joins the
    /// pending set so a later echo is discarded.
    pub fn confirm(&mut self, kind: MutationKind, id: String) {
        self.sweep();
        self.in_flight.remove(&kind);
        self.pending.insert(id, Instant::now() + self.window);
    }

    /// Decide whether a pushed creation should be applied. Echoes are
    /// discarded by pending id, or by exact in-flight content match
    /// when the echo outruns the HTTP confirmation.
    pub fn admit(&mut self, kind: MutationKind, id: &str, content: &str) -> bool {
        self.sweep();
        if self.pending.contains_key(id) {
            return false;
        }
        if self
            .in_flight
            .get(&kind)
            .is_some_and(|submitted| submitted.as_str() == content)
        {
            // The echo won the race; remember its id so the eventual
            // confirmation dedups by id instead.
            self.pending.insert(id.to_string(), Instant::now() + self.window);
            self.in_flight.remove(&kind);
            return false;
        }
        true
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, deadline| *deadline > now);
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}
