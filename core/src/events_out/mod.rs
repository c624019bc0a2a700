//! Optional JSONL side channel of run events.

mod event;
mod writer;

pub use crate::config::EventsOutConfig;
pub use event::{write_event, RunEvent, TaskStatus};
pub use writer::{start_events_out, EventsOut, EventsOutTx};
