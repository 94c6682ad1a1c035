//! # meeting-audio-server
//!
//! HTTP control API and WebSocket audio streaming on top of a
//! [`MeetingManager`](meeting_audio_core::MeetingManager).
//!
//! ## Endpoints
//! ```text
//! GET    /health                  {"status":"ok","meeting_count":N}
//! GET    /api/meetings            [{"meeting_id":..,"status":..}]
//! POST   /api/meetings            {"meeting_id","password","display_name","enable_audio"}
//! GET    /api/meetings/{id}       {"meeting_id","status","stats"}
//! DELETE /api/meetings/{id}       {"status":"left"}
//! GET    /api/stats               {"meetings":{..},"bus":{..}}
//! GET    /ws/audio/{id}?type=mixed|one_way|share&user_id=N&queue_size=N
//! ```
//!
//! An audio stream opens with an `audio_format` text message, then carries
//! binary messages in the 16-byte-header frame encoding, aggregated per
//! speaker and audio type.

pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod router;
pub mod server;
pub mod signals;
pub mod ws;

pub use config::ServerConfiguration;
pub use error::ServerError;
pub use server::MeetingServer;
pub use signals::ShutdownHandle;
