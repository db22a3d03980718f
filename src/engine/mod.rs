//! Engine module housing the metronome runtime.
//!
//! This module exposes trait-based backends (`backend`) and the
//! `EngineHandle` orchestration layer (`core`), which runs the scheduler and
//! visual loops on their own threads (`playback`) with engine-aware
//! scheduler hooks (`hooks`).

pub mod backend;
pub mod core;
mod events;
mod hooks;
mod playback;

pub use backend::{
    AudioBackend, AudioOutput, CpalBackend, DispatchRecord, RecordingSink, StubBackend,
    StubTimeSource, SystemTimeSource, TimeSource,
};
pub use self::core::EngineHandle;
pub use events::{EngineEvent, EngineEventKind};
pub use hooks::{MeasureCallback, MutePredicate};
pub(crate) use hooks::{EngineHooks, SharedHooks};
