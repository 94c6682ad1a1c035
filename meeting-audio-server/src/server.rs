use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use meeting_audio_core::session::manager::MeetingManager;
use meeting_audio_core::traits::meeting_backend::MeetingBackend;

use crate::config::ServerConfiguration;
use crate::error::ServerError;
use crate::http::{read_request, switching_protocols, Request, Response};
use crate::protocol::{JoinMeetingRequest, MeetingDetail, MeetingSummary, StreamOptions};
use crate::router::{route, Route};
use crate::signals::ShutdownHandle;
use crate::ws;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST control API and WebSocket audio streams over one [`MeetingManager`].
///
/// Manager calls that may block on the SDK (join, leave) run on tokio's
/// blocking pool.
pub struct MeetingServer<B: MeetingBackend + 'static> {
    manager: Arc<MeetingManager<B>>,
    config: ServerConfiguration,
}

impl<B: MeetingBackend + 'static> MeetingServer<B> {
    pub fn new(manager: Arc<MeetingManager<B>>, config: ServerConfiguration) -> Arc<Self> {
        Arc::new(Self { manager, config })
    }

    pub fn manager(&self) -> &Arc<MeetingManager<B>> {
        &self.manager
    }

    pub fn config(&self) -> &ServerConfiguration {
        &self.config
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(&self.config.http_addr).await?)
    }

    /// Accept connections until `shutdown` triggers. Open audio streams see
    /// the same signal and close themselves.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: ShutdownHandle) -> Result<(), ServerError> {
        log::info!("HTTP server listening on {}", listener.local_addr()?);
        let sweeper = self.spawn_idle_sweep(shutdown.clone());

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&self);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, peer, shutdown).await;
                        });
                    }
                    Err(e) => log::error!("Failed to accept connection: {}", e),
                },
                _ = shutdown.wait() => break,
            }
        }

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        log::info!("HTTP server shut down");
        Ok(())
    }

    fn spawn_idle_sweep(&self, shutdown: ShutdownHandle) -> Option<JoinHandle<()>> {
        let idle = self.config.subscriber_idle_timeout;
        if idle.is_zero() {
            return None;
        }
        let bus = self.manager.bus().clone();
        let period = (idle / 2).max(Duration::from_millis(10));

        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        bus.cleanup_inactive(idle);
                    }
                    _ = shutdown.wait() => break,
                }
            }
        }))
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr, shutdown: ShutdownHandle) {
        let request = match timeout(REQUEST_TIMEOUT, read_request(&mut stream)).await {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                log::debug!("Bad request from {}: {}", peer, e);
                let _ = Response::error(400, &e.to_string()).write_to(&mut stream).await;
                return;
            }
            Err(_) => {
                log::debug!("Timed out reading request from {}", peer);
                return;
            }
        };
        log::info!("Received request: {} {}", request.method, request.path);

        match route(&request.method, &request.path) {
            Route::AudioStream(meeting_id) => {
                self.accept_audio_stream(stream, peer, request, meeting_id, shutdown).await;
            }
            other => {
                let response = self.handle_api(other, request).await;
                if let Err(e) = response.write_to(&mut stream).await {
                    log::debug!("Failed to write response to {}: {}", peer, e);
                }
            }
        }
    }

    async fn handle_api(&self, route: Route, request: Request) -> Response {
        match route {
            Route::Health => Response::json(
                200,
                &serde_json::json!({
                    "status": "ok",
                    "meeting_count": self.manager.meeting_count(),
                }),
            ),
            Route::ListMeetings => {
                let meetings: Vec<MeetingSummary> = self
                    .manager
                    .list_meetings()
                    .into_iter()
                    .map(|(meeting_id, status)| MeetingSummary { meeting_id, status })
                    .collect();
                Response::json(200, &meetings)
            }
            Route::JoinMeeting => self.join(&request.body).await,
            Route::GetMeeting(meeting_id) => match self.manager.list_meetings().remove(&meeting_id) {
                Some(status) => {
                    let stats = self.manager.meeting_stats(&meeting_id).ok();
                    Response::json(200, &MeetingDetail { meeting_id, status, stats })
                }
                None => Response::error(404, "meeting not found"),
            },
            Route::LeaveMeeting(meeting_id) => {
                let manager = Arc::clone(&self.manager);
                match tokio::task::spawn_blocking(move || manager.leave_meeting(&meeting_id)).await {
                    Ok(Ok(())) => Response::json(200, &serde_json::json!({ "status": "left" })),
                    Ok(Err(e)) => Response::from_meeting_error(&e),
                    Err(e) => Response::error(500, &format!("leave task failed: {}", e)),
                }
            }
            Route::Stats => Response::json(
                200,
                &serde_json::json!({
                    "meetings": self.manager.all_stats(),
                    "bus": self.manager.bus().stats(),
                }),
            ),
            Route::MethodNotAllowed => Response::error(405, "method not allowed"),
            Route::NotFound | Route::AudioStream(_) => Response::error(404, "not found"),
        }
    }

    async fn join(&self, body: &[u8]) -> Response {
        let request: JoinMeetingRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => return Response::error(400, &format!("invalid request body: {}", e)),
        };
        let config = request.into_configuration();
        if let Err(e) = config.validate() {
            return Response::from_meeting_error(&e);
        }

        let meeting_id = config.meeting_id.clone();
        let manager = Arc::clone(&self.manager);
        match tokio::task::spawn_blocking(move || manager.join_meeting(config)).await {
            Ok(Ok(())) => Response::json(
                200,
                &serde_json::json!({ "status": "joined", "meeting_id": meeting_id }),
            ),
            Ok(Err(e)) => Response::from_meeting_error(&e),
            Err(e) => Response::error(500, &format!("join task failed: {}", e)),
        }
    }

    async fn accept_audio_stream(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        request: Request,
        meeting_id: String,
        shutdown: ShutdownHandle,
    ) {
        let key = match request.header("sec-websocket-key") {
            Some(key) if request.is_websocket_upgrade() => key.to_string(),
            _ => {
                let _ = Response::error(400, "expected a WebSocket upgrade")
                    .write_to(&mut stream)
                    .await;
                return;
            }
        };
        if request.header("sec-websocket-version") != Some("13") {
            let _ = Response::error(426, "unsupported WebSocket version")
                .write_to(&mut stream)
                .await;
            return;
        }
        if let Err(e) = stream.write_all(switching_protocols(&key).as_bytes()).await {
            log::debug!("Failed to complete WebSocket handshake with {}: {}", peer, e);
            return;
        }

        let ws = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
        let options = StreamOptions::parse(&meeting_id, &request.query, self.config.subscriber_buffer);
        log::info!("WebSocket client connected: {} for meeting: {}", peer, meeting_id);

        if let Err(e) = ws::stream_audio(ws, self.manager.bus(), &options, &self.config, &shutdown).await {
            log::warn!("WebSocket client {}: {}", peer, e);
        }
        log::info!("WebSocket client disconnected: {}", peer);
    }
}
