//! # meeting-audio-zoom
//!
//! Safe Rust bindings to `zoomsdk_c`, the C wrapper around the Zoom
//! Meeting SDK, plus a `MeetingBackend` that plugs it into
//! `meeting-audio-core`.
//!
//! Provides:
//! - `ffi`: raw handles, constants, and the `ZoomApi` function table
//! - `ZoomSdk` / `ZoomMeeting`: owned handles released exactly once
//! - `callback`: the single `extern "C"` trampoline routing audio to Rust closures
//! - `ZoomEventLoop`: `zoom_sdk_run_loop` with a stop token
//! - `ZoomBackend`: `MeetingBackend` implementation
//! - `stub`: in-process stand-in for the native library (feature `stub`)
//!
//! ## Linking
//! Enable the `native` feature to link `libzoomsdk_c`; set `ZOOMSDK_LIB_DIR`
//! if it is not on the default search path.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use meeting_audio_core::{AudioBus, MeetingConfiguration, MeetingSession};
//! use meeting_audio_zoom::{ZoomApi, ZoomBackend, ZoomSdk};
//!
//! let sdk = ZoomSdk::create(ZoomApi::linked(), &key, &secret)?;
//! let backend = ZoomBackend::with_shared_sdk(Arc::clone(&sdk));
//! let mut session = MeetingSession::new(MeetingConfiguration::new("123456789"), backend, AudioBus::new());
//! session.join()?;
//! ```

pub mod backend;
pub mod callback;
pub mod error;
pub mod event_loop;
pub mod ffi;
pub mod sdk;
#[cfg(any(test, feature = "stub"))]
pub mod stub;

pub use backend::ZoomBackend;
pub use error::ZoomError;
pub use event_loop::ZoomEventLoop;
pub use ffi::{default_api, ZoomApi};
pub use sdk::{ZoomMeeting, ZoomSdk};
