/// Ledger anchoring of relational records.
///
/// Rows carry an `anchored` flag that starts false and is reset by every
/// content mutation. The reconciler periodically collects unanchored rows
/// per entity type, hashes each row's content, writes the hashes to the
/// ledger under one fresh batch key, then marks the rows anchored and
/// appends one audit entry per batch.
///
/// Ledger writes are at-least-once: a crash between the write and the
/// settlement re-submits the same rows later under a new key. The
/// relational state converges to exactly one settled batch per content.
pub mod batch_key;
pub mod canonical;
pub mod lookup;
pub mod pass;
pub mod scheduler;

pub use batch_key::BatchKeyGenerator;
pub use canonical::canonical_hash;
pub use lookup::{lookup_by_content_hash, LookupResult};
pub use pass::{BatchReport, PassOutcome, Reconciler};
pub use scheduler::{Scheduler, SchedulerConfig, TickJob};
