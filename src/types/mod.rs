//! Core types for ExamGuard

mod status;
mod violation;
mod session;
mod reason;
mod view;
mod input;

pub use status::{ExamStatus, Activity, Role, SubmitTrigger};
pub use violation::{ViolationKind, ViolationEvent, ViolationReportOutcome, ReportFailure, ReportFailureKind, ReportResult};
pub use session::{ExamSession, ContestPolicy};
pub use reason::ReasonCode;
pub use view::{Notice, SessionView};
pub use input::{PlatformEvent, Input, Effect, Moment};
