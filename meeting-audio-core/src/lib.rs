//! # meeting-audio-core
//!
//! SDK-agnostic core for bots that join video meetings and capture their
//! raw audio.
//!
//! Provides the meeting session state machine, a bounded frame queue
//! between native callbacks and Rust consumers, a filtered fan-out audio
//! bus, multi-meeting management, and WAV recording. SDK bindings (the
//! Zoom SDK in `meeting-audio-zoom`) implement `MeetingBackend` and
//! `EventLoop` and plug into the generic `MeetingSession`/`MeetingManager`.
//!
//! ## Architecture
//!
//! ```text
//! meeting-audio-core (this crate)
//! ├── traits/       ← MeetingBackend, EventLoop, SessionDelegate
//! ├── models/       ← MeetingError, MeetingStatus, configuration, AudioFrame, stats
//! ├── processing/   ← RingBuffer, WAV header generation
//! ├── bus/          ← AudioBus, SubscriberFilter, Subscription
//! ├── session/      ← MeetingSession, MeetingManager
//! └── storage/      ← WavRecorder, metadata sidecars
//! ```

pub mod bus;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use bus::audio_bus::{AudioBus, BusFrame, SubscriberFilter, Subscription};
pub use models::audio_models::{AudioFrame, AudioType, BusStats, MeetingStats, BINARY_FRAME_HEADER_SIZE};
pub use models::config::{BotConfiguration, MeetingConfiguration};
pub use models::error::MeetingError;
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::MeetingStatus;
pub use processing::ring_buffer::RingBuffer;
pub use session::manager::{BackendFactory, MeetingManager};
pub use session::meeting_session::MeetingSession;
pub use storage::wav_recorder::{record_subscription, RecordingTarget, WavRecorder};
pub use traits::meeting_backend::{AudioFrameCallback, EventLoop, MeetingBackend};
pub use traits::session_delegate::SessionDelegate;
