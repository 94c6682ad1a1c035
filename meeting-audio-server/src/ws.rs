//! Streams one meeting's audio to one WebSocket client.
//!
//! The bus delivers on a blocking `mpsc` receiver, so a blocking task pumps
//! the subscription into a bounded tokio channel. The async side aggregates
//! PCM per (node, audio type) and sends one binary message per key every
//! flush interval, pings on its own schedule, and drops clients that go
//! silent past the read timeout.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use meeting_audio_core::bus::audio_bus::{AudioBus, BusFrame, Subscription};
use meeting_audio_core::models::audio_models::{AudioFrame, AudioType};

use crate::config::ServerConfiguration;
use crate::error::ServerError;
use crate::protocol::{AudioFormatMessage, ErrorMessage, StreamOptions};
use crate::signals::ShutdownHandle;

/// Frames buffered between the pump and the socket writer.
const SEND_BUFFER: usize = 100;
const PUMP_POLL: Duration = Duration::from_millis(100);
const MIN_TICK: Duration = Duration::from_millis(1);

/// Subscribe to `options`' meeting and stream until the client leaves, the
/// bus drops the subscription, or shutdown.
pub async fn stream_audio<S>(
    ws: WebSocketStream<S>,
    bus: &AudioBus,
    options: &StreamOptions,
    config: &ServerConfiguration,
    shutdown: &ShutdownHandle,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let subscription = bus.subscribe(options.filter(), options.queue_size);
    let subscription_id = subscription.id();
    let (frame_tx, mut frame_rx) = mpsc::channel(SEND_BUFFER);
    let pump = tokio::task::spawn_blocking(move || pump_subscription(subscription, frame_tx));

    let result = run_stream(ws, &mut frame_rx, config, shutdown).await;

    bus.unsubscribe(subscription_id);
    drop(frame_rx);
    if pump.await.is_err() {
        log::error!("Subscription pump for subscriber {} panicked", subscription_id);
    }
    result
}

fn pump_subscription(subscription: Subscription, frames: mpsc::Sender<BusFrame>) {
    let mut dropped = 0u64;
    loop {
        match subscription.recv_timeout(PUMP_POLL) {
            Ok(delivery) => match frames.try_send(delivery) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    if dropped % 100 == 1 {
                        log::warn!(
                            "Dropping frame for subscriber {} (send buffer full, {} dropped)",
                            subscription.id(),
                            dropped
                        );
                    }
                }
                Err(TrySendError::Closed(_)) => break,
            },
            Err(RecvTimeoutError::Timeout) => {
                if frames.is_closed() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

async fn run_stream<S>(
    ws: WebSocketStream<S>,
    frames: &mut mpsc::Receiver<BusFrame>,
    config: &ServerConfiguration,
    shutdown: &ShutdownHandle,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = ws.split();
    let write_timeout = config.write_timeout;

    let format = AudioFormatMessage::new(config.audio_sample_rate, config.audio_channels);
    send(&mut sink, json_text(&format), write_timeout).await?;

    let mut pending = PendingAudio::default();

    let mut flush = interval(config.audio_flush_interval.max(MIN_TICK));
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ping_every = config.ping_interval.max(MIN_TICK);
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    let read_deadline = sleep(config.read_timeout);
    tokio::pin!(read_deadline);

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(delivery) => pending.push(&delivery.frame),
                None => {
                    for message in pending.drain_encoded() {
                        send(&mut sink, Message::Binary(message), write_timeout).await?;
                    }
                    let closing = ErrorMessage::new("audio stream closed by server", None);
                    let _ = send(&mut sink, json_text(&closing), write_timeout).await;
                    let _ = send(&mut sink, Message::Close(None), write_timeout).await;
                    return Ok(());
                }
            },
            _ = flush.tick() => {
                for message in pending.drain_encoded() {
                    send(&mut sink, Message::Binary(message), write_timeout).await?;
                }
            }
            _ = ping.tick() => {
                send(&mut sink, Message::Ping(Vec::new()), write_timeout).await?;
                log::debug!("Sent ping to WebSocket client");
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => read_deadline.as_mut().reset(Instant::now() + config.read_timeout),
                Some(Err(e)) => return Err(e.into()),
            },
            _ = &mut read_deadline => {
                log::warn!("Closing WebSocket client silent for {:?}", config.read_timeout);
                let _ = send(&mut sink, Message::Close(None), write_timeout).await;
                return Ok(());
            }
            _ = shutdown.wait() => {
                let _ = send(&mut sink, Message::Close(None), write_timeout).await;
                return Ok(());
            }
        }
    }
}

async fn send<K>(sink: &mut K, message: Message, limit: Duration) -> Result<(), ServerError>
where
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match timeout(limit, sink.send(message)).await {
        Ok(result) => result.map_err(ServerError::from),
        Err(_) => Err(ServerError::Timeout),
    }
}

fn json_text<T: serde::Serialize>(value: &T) -> Message {
    // Plain structs of strings and numbers always serialize.
    Message::Text(serde_json::to_string(value).unwrap_or_default())
}

/// PCM waiting for the next flush, kept in first-seen order per speaker.
#[derive(Debug, Default)]
struct PendingAudio {
    buffers: Vec<((u32, AudioType), Vec<u8>)>,
}

impl PendingAudio {
    fn push(&mut self, frame: &AudioFrame) {
        let key = (frame.node_id, frame.audio_type);
        match self.buffers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, buf)) => buf.extend_from_slice(&frame.data),
            None => self.buffers.push((key, frame.data.clone())),
        }
    }

    /// One encoded frame per non-empty buffer; leaves the aggregator empty.
    fn drain_encoded(&mut self) -> Vec<Vec<u8>> {
        self.buffers
            .drain(..)
            .filter(|(_, data)| !data.is_empty())
            .map(|((node_id, audio_type), data)| AudioFrame::new(audio_type, node_id, data).encode())
            .collect()
    }
}
