//! Process descriptors and the process table.

mod descriptor;
mod table;

pub use descriptor::{BlockReason, Pid, Process, ProcessState, RegisterFile, DEFAULT_PRIORITY};
pub use table::ProcessTable;
