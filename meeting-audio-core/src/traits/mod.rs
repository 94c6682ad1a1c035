pub mod meeting_backend;
pub mod session_delegate;
