pub mod callback;
pub mod matcher;
pub mod outgoing;
pub mod reconciliation;
pub mod watcher;

pub use callback::CallbackNotifier;
pub use matcher::{MatchOutcome, TransactionMatcher};
pub use outgoing::{BatchReport, OutgoingProcessor};
pub use reconciliation::{Reconciler, Reconciliation};
pub use watcher::TransactionWatcher;
