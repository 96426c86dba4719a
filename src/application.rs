//! Application layer
//!
//! Use cases built on the domain capabilities: paging through a source,
//! reconciling a batch with the stored catalog, running a whole site, and
//! reporting on what is stored.

pub mod orchestrator;
pub mod pager;
pub mod reconciliation;
pub mod report;

pub use orchestrator::{Orchestrator, RunError, RunOutcome, RunReport, run_site};
pub use pager::{FetchOutcome, PagerSettings, StopReason, fetch_all};
pub use reconciliation::{EventCounts, ReconciliationEngine, ReconciliationOutcome, ReconciliationPolicy};
pub use report::{DiscountReport, report_site};
