//! Weekly attendance poll.
//!
//! Domain types, the one-shot lifecycle signals, and the controller that
//! drives the create → close → unpin → reset protocol.

pub mod controller;
pub mod signal;
pub mod types;

pub use controller::{ActivePoll, AnswerOutcome, PollError, PollLifecycleController};
pub use signal::Signal;
pub use types::{attendance_question, AttendanceOption, PollPhase, PollRecord, PollStatus};
