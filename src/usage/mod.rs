//! Estimated bandwidth accounting.
//!
//! Playing time is converted to megabytes at a fixed rate and committed to the
//! process-wide [`LedgerStore`] in batches; see [`WriteBehind`].

mod accountant;
mod batch;
mod ledger;

pub use accountant::UsageAccountant;
pub use batch::WriteBehind;
pub use ledger::{day_key, format_units, LedgerStore, UsageLedger, UsageStats, LEDGER_KEY};
