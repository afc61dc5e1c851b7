/// Notifications emitted after a state change has been applied.
///
/// Presentation layers hang cosmetic reactions (celebrations, toasts) off
/// these; nothing in the core waits on a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Created { id: u64 },
    Updated { id: u64 },
    Completed { id: u64 },
    Reopened { id: u64 },
    Deleted { id: u64 },
    Imported { count: usize },
    Restored { count: usize },
    /// A write failed; the session continues in memory only.
    StorageFailed { reason: String },
}

pub type Listener = Box<dyn FnMut(&TaskEvent)>;
