pub mod manager;
pub mod meeting_session;
