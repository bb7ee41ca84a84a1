//! Shared machinery between the Manager and the Agent: the persistent
//! agent registry, the two wire protocols (control and pull), and a
//! concurrency-bounded task scheduler.

#![warn(missing_docs, clippy::pedantic)]

mod control_wire;
mod pull_wire;
mod registry;
mod scheduler;

pub use control_wire::{ControlArgs, ControlFrame, Verb};
pub use pull_wire::{
    decode_size, encode_size, pad, unpad, FrameError, BUFFER_BACKUP, ETAG_FRAME_LEN,
    PATH_FRAME_LEN, PULL_TIMEOUT, SIZE_ERROR, SIZE_FRAME_LEN, SIZE_UNCHANGED,
};
pub use registry::{AddOutcome, Registry, RegistryError, RegistryResult, RemoveOutcome};
pub use scheduler::TaskScheduler;
