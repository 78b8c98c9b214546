pub mod approval;
pub mod config;
pub mod message;
pub mod raw;
pub mod session;
pub mod wire;

pub use approval::{Decision, PendingApproval, RunHandle};
pub use raw::RawEvent;
pub use session::{Session, SessionStatus};
pub use wire::WireEvent;
