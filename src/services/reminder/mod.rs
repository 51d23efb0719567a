pub mod dispatcher;
pub mod poller;

pub use dispatcher::{DispatchError, DispatchOutcome, DispatchSummary, ReminderDispatcher};
pub use poller::{IterationReport, ReminderPoller};
