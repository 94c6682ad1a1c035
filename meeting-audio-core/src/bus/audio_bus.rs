use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::audio_models::{AudioFrame, AudioType, BusStats};

/// Which frames a subscriber wants. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberFilter {
    pub meeting_id: Option<String>,
    pub audio_types: HashSet<AudioType>,
    pub node_ids: HashSet<u32>,
}

impl SubscriberFilter {
    /// Every frame from every meeting.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_meeting(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: Some(meeting_id.into()),
            ..Self::default()
        }
    }

    pub fn with_audio_types(mut self, types: impl IntoIterator<Item = AudioType>) -> Self {
        self.audio_types = types.into_iter().collect();
        self
    }

    pub fn with_node_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.node_ids = ids.into_iter().collect();
        self
    }

    pub fn matches(&self, meeting_id: &str, frame: &AudioFrame) -> bool {
        if let Some(ref wanted) = self.meeting_id {
            if wanted != meeting_id {
                return false;
            }
        }
        if !self.audio_types.is_empty() && !self.audio_types.contains(&frame.audio_type) {
            return false;
        }
        if !self.node_ids.is_empty() && !self.node_ids.contains(&frame.node_id) {
            return false;
        }
        true
    }
}

/// A frame as delivered to subscribers, tagged with its meeting.
#[derive(Debug, Clone)]
pub struct BusFrame {
    pub meeting_id: Arc<str>,
    pub frame: Arc<AudioFrame>,
}

struct Subscriber {
    filter: SubscriberFilter,
    sender: SyncSender<BusFrame>,
    last_activity: Instant,
}

struct BusState {
    subscribers: HashMap<u64, Subscriber>,
    stats: BusStats,
}

struct BusShared {
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl BusShared {
    fn remove(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let removed = state.subscribers.remove(&id).is_some();
        if removed {
            state.stats.active_subscribers = state.subscribers.len();
            log::info!("Removed subscriber: {} (total: {})", id, state.subscribers.len());
        }
        removed
    }
}

/// Fans audio frames out to any number of filtered subscribers.
///
/// Publishing never blocks: each subscriber has a bounded queue and a frame
/// that does not fit is dropped for that subscriber only. Cloning the bus is
/// cheap and every clone feeds the same subscribers.
#[derive(Clone)]
pub struct AudioBus {
    shared: Arc<BusShared>,
}

impl AudioBus {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BusShared {
                state: Mutex::new(BusState {
                    subscribers: HashMap::new(),
                    stats: BusStats::default(),
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a subscriber whose queue holds up to `buffer` frames.
    pub fn subscribe(&self, filter: SubscriberFilter, buffer: usize) -> Subscription {
        let (sender, receiver) = mpsc::sync_channel(buffer.max(1));
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        state.subscribers.insert(
            id,
            Subscriber {
                filter,
                sender,
                last_activity: Instant::now(),
            },
        );
        state.stats.active_subscribers = state.subscribers.len();
        log::info!("Added subscriber: {} (total: {})", id, state.subscribers.len());

        Subscription {
            id,
            receiver,
            bus: Arc::downgrade(&self.shared),
        }
    }

    /// Remove a subscriber; its receiver sees a disconnect once drained.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.shared.remove(id)
    }

    /// Deliver `frame` to every matching subscriber.
    ///
    /// Returns `true` if nobody matched or at least one subscriber accepted it.
    pub fn publish(&self, meeting_id: &str, frame: Arc<AudioFrame>) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        state.stats.total_frames += 1;
        state.stats.last_frame_at = Some(Utc::now());

        let meeting_id: Arc<str> = Arc::from(meeting_id);
        let mut matched = 0usize;
        let mut sent = 0usize;
        let mut disconnected = Vec::new();

        for (id, sub) in state.subscribers.iter_mut() {
            if !sub.filter.matches(&meeting_id, &frame) {
                continue;
            }
            matched += 1;

            let delivery = BusFrame {
                meeting_id: Arc::clone(&meeting_id),
                frame: Arc::clone(&frame),
            };
            match sub.sender.try_send(delivery) {
                Ok(()) => {
                    sub.last_activity = now;
                    sent += 1;
                }
                Err(TrySendError::Full(_)) => {
                    state.stats.dropped_frames += 1;
                    if state.stats.dropped_frames % 100 == 1 {
                        log::warn!(
                            "Dropping frame for subscriber {} (queue full, {} dropped so far)",
                            id,
                            state.stats.dropped_frames
                        );
                    }
                }
                Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
            }
        }

        for id in disconnected {
            state.subscribers.remove(&id);
            log::debug!("Pruned disconnected subscriber: {}", id);
        }
        state.stats.active_subscribers = state.subscribers.len();

        matched == 0 || sent > 0
    }

    pub fn stats(&self) -> BusStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.active_subscribers = state.subscribers.len();
        stats
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }

    /// Drop subscribers that have not accepted a frame within `timeout`.
    pub fn cleanup_inactive(&self, timeout: Duration) -> usize {
        let mut state = self.shared.state.lock();
        let before = state.subscribers.len();
        state
            .subscribers
            .retain(|_, sub| sub.last_activity.elapsed() <= timeout);
        let removed = before - state.subscribers.len();

        if removed > 0 {
            state.stats.active_subscribers = state.subscribers.len();
            log::info!(
                "Cleaned up {} inactive subscribers (total: {})",
                removed,
                state.subscribers.len()
            );
        }
        removed
    }

    /// Disconnect every subscriber.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        log::info!("Shutting down audio bus ({} subscribers)", state.subscribers.len());
        state.subscribers.clear();
        state.stats.active_subscribers = 0;
    }
}

impl Default for AudioBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a bus subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: Receiver<BusFrame>,
    bus: Weak<BusShared>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until a frame arrives; `None` once the bus dropped this subscriber.
    pub fn recv(&self) -> Option<BusFrame> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<BusFrame, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<BusFrame> {
        self.receiver.try_recv().ok()
    }

    /// Blocking iterator that ends when the subscription is disconnected.
    pub fn iter(&self) -> impl Iterator<Item = BusFrame> + '_ {
        self.receiver.iter()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(audio_type: AudioType, node_id: u32) -> Arc<AudioFrame> {
        Arc::new(AudioFrame::new(audio_type, node_id, vec![0u8; 640]))
    }

    #[test]
    fn filter_matching() {
        let mixed = frame(AudioType::Mixed, 0);
        let one_way = frame(AudioType::OneWay, 42);

        assert!(SubscriberFilter::all().matches("m1", &mixed));
        assert!(!SubscriberFilter::for_meeting("m2").matches("m1", &mixed));

        let only_one_way = SubscriberFilter::all().with_audio_types([AudioType::OneWay]);
        assert!(!only_one_way.matches("m1", &mixed));
        assert!(only_one_way.matches("m1", &one_way));

        let speaker = SubscriberFilter::all().with_node_ids([7]);
        assert!(!speaker.matches("m1", &one_way));
    }

    #[test]
    fn publish_reaches_matching_subscribers_only() {
        let bus = AudioBus::new();
        let m1 = bus.subscribe(SubscriberFilter::for_meeting("m1"), 8);
        let m2 = bus.subscribe(SubscriberFilter::for_meeting("m2"), 8);

        assert!(bus.publish("m1", frame(AudioType::Mixed, 0)));

        let got = m1.try_recv().expect("m1 should receive");
        assert_eq!(&*got.meeting_id, "m1");
        assert_eq!(got.frame.audio_type, AudioType::Mixed);
        assert!(m2.try_recv().is_none());
        assert_eq!(bus.stats().total_frames, 1);
    }

    #[test]
    fn publish_without_subscribers_succeeds() {
        let bus = AudioBus::new();
        assert!(bus.publish("m1", frame(AudioType::Mixed, 0)));
        assert_eq!(bus.stats().dropped_frames, 0);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::all(), 1);

        assert!(bus.publish("m1", frame(AudioType::Mixed, 0)));
        assert!(!bus.publish("m1", frame(AudioType::Mixed, 0)));

        assert_eq!(bus.stats().dropped_frames, 1);
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::all(), 4);
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.stats().active_subscribers, 0);
    }

    #[test]
    fn shutdown_disconnects_receivers() {
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::all(), 4);
        bus.publish("m1", frame(AudioType::Mixed, 0));
        bus.shutdown();

        // Buffered frames still drain, then the channel reports disconnect.
        assert!(sub.recv().is_some());
        assert!(sub.recv().is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn cleanup_inactive_removes_idle_subscribers() {
        let bus = AudioBus::new();
        let _idle = bus.subscribe(SubscriberFilter::for_meeting("quiet"), 4);
        std::thread::sleep(Duration::from_millis(20));
        let _fresh = bus.subscribe(SubscriberFilter::all(), 4);

        assert_eq!(bus.cleanup_inactive(Duration::from_millis(10)), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn recv_timeout_reports_timeout() {
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::all(), 4);
        assert_eq!(
            sub.recv_timeout(Duration::from_millis(5)).unwrap_err(),
            RecvTimeoutError::Timeout
        );
    }
}
