/// An HTTP endpoint, resolved from method and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /health`
    Health,
    /// `GET /api/meetings`
    ListMeetings,
    /// `POST /api/meetings`
    JoinMeeting,
    /// `GET /api/meetings/{id}`
    GetMeeting(String),
    /// `DELETE /api/meetings/{id}`
    LeaveMeeting(String),
    /// `GET /api/stats`
    Stats,
    /// `GET /ws/audio/{id}` (WebSocket upgrade)
    AudioStream(String),
    MethodNotAllowed,
    NotFound,
}

pub fn route(method: &str, path: &str) -> Route {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

    match segments.as_slice() {
        ["health"] => match method {
            "GET" => Route::Health,
            _ => Route::MethodNotAllowed,
        },
        ["api", "meetings"] => match method {
            "GET" => Route::ListMeetings,
            "POST" => Route::JoinMeeting,
            _ => Route::MethodNotAllowed,
        },
        ["api", "meetings", id] if !id.is_empty() => match method {
            "GET" => Route::GetMeeting(id.to_string()),
            "DELETE" => Route::LeaveMeeting(id.to_string()),
            _ => Route::MethodNotAllowed,
        },
        ["api", "stats"] => match method {
            "GET" => Route::Stats,
            _ => Route::MethodNotAllowed,
        },
        ["ws", "audio", id] if !id.is_empty() => match method {
            "GET" => Route::AudioStream(id.to_string()),
            _ => Route::MethodNotAllowed,
        },
        _ => Route::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_routes() {
        assert_eq!(route("GET", "/health"), Route::Health);
        assert_eq!(route("GET", "/api/meetings"), Route::ListMeetings);
        assert_eq!(route("POST", "/api/meetings/"), Route::JoinMeeting);
        assert_eq!(route("GET", "/api/meetings/123"), Route::GetMeeting("123".into()));
        assert_eq!(route("DELETE", "/api/meetings/123"), Route::LeaveMeeting("123".into()));
        assert_eq!(route("GET", "/api/stats"), Route::Stats);
    }

    #[test]
    fn audio_stream_takes_meeting_id() {
        assert_eq!(route("GET", "/ws/audio/8675309"), Route::AudioStream("8675309".into()));
        assert_eq!(route("GET", "/ws/audio"), Route::NotFound);
        assert_eq!(route("GET", "/ws/audio/1/extra"), Route::NotFound);
    }

    #[test]
    fn wrong_method_and_unknown_paths() {
        assert_eq!(route("PUT", "/api/meetings"), Route::MethodNotAllowed);
        assert_eq!(route("POST", "/api/meetings/123"), Route::MethodNotAllowed);
        assert_eq!(route("GET", "/"), Route::NotFound);
        assert_eq!(route("GET", "/api/meetings//"), Route::ListMeetings);
    }
}
