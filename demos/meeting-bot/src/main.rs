//! meeting-bot entry point.
//!
//! `join` joins every meeting under one shared SDK session and one event
//! loop, logs each audio frame at debug level, and optionally records mixed
//! audio per meeting. `serve` runs the REST/WebSocket server over the same
//! setup. Both leave their meetings in order on SIGINT or SIGTERM.

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use meeting_audio_core::bus::audio_bus::{AudioBus, SubscriberFilter};
use meeting_audio_core::models::audio_models::AudioType;
use meeting_audio_core::models::config::{BotConfiguration, MeetingConfiguration};
use meeting_audio_core::models::error::MeetingError;
use meeting_audio_core::models::recording_result::RecordingResult;
use meeting_audio_core::models::state::MeetingStatus;
use meeting_audio_core::session::manager::{BackendFactory, MeetingManager};
use meeting_audio_core::storage::wav_recorder::{record_subscription, RecordingTarget, WavRecorder};
use meeting_audio_core::traits::session_delegate::SessionDelegate;
use meeting_audio_server::{MeetingServer, ServerConfiguration, ShutdownHandle};
use meeting_audio_zoom::{default_api, ZoomBackend, ZoomEventLoop, ZoomSdk};
use tokio::runtime::Runtime;

use cli::{Cli, Command, JoinArgs, ServeArgs};

const WAIT_INTERVAL: Duration = Duration::from_millis(200);
const LOOP_START_GRACE: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = BotConfiguration::from_env();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = runtime.enter();
    let shutdown = ShutdownHandle::new();
    if let Err(e) = shutdown.spawn_listener() {
        log::warn!("Failed to install signal handlers: {}", e);
    }

    let result = match cli.command {
        Command::Join(args) => join(args, config, &shutdown),
        Command::Serve(args) => serve(args, config, &runtime, shutdown),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

struct LoggingDelegate;

impl SessionDelegate for LoggingDelegate {
    fn on_status_changed(&self, meeting_id: &str, status: MeetingStatus) {
        log::info!("Meeting {} is now {}", meeting_id, status);
    }

    fn on_error(&self, meeting_id: &str, error: &MeetingError) {
        log::error!("Meeting {}: {}", meeting_id, error);
    }

    fn on_frames_dropped(&self, meeting_id: &str, count: u64) {
        log::warn!("Meeting {} dropped {} frames", meeting_id, count);
    }
}

type RecorderHandle = thread::JoinHandle<Result<RecordingResult, MeetingError>>;

/// Why [`wait_until_done`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    DurationElapsed,
    LoopEnded,
    Interrupted,
}

fn apply_credentials(config: &mut BotConfiguration, key: Option<String>, secret: Option<String>) {
    if let Some(key) = key {
        config.sdk_key = key;
    }
    if let Some(secret) = secret {
        config.sdk_secret = secret;
    }
}

fn create_sdk(config: &BotConfiguration) -> Result<(Arc<ZoomSdk>, Arc<ZoomEventLoop>), MeetingError> {
    let api = default_api().ok_or_else(|| {
        MeetingError::BackendUnavailable(
            "zoomsdk_c is not linked into this build; rebuild with --features native".into(),
        )
    })?;

    let sdk = ZoomSdk::create(api, &config.sdk_key, &config.sdk_secret)?;
    log::info!("SDK created and authenticated");
    Ok((sdk, Arc::new(ZoomEventLoop::new(api))))
}

/// One manager whose backends all share `sdk`.
fn shared_sdk_manager(sdk: &Arc<ZoomSdk>, bus: &AudioBus, config: &BotConfiguration) -> MeetingManager<ZoomBackend> {
    let factory_sdk = Arc::clone(sdk);
    let factory: BackendFactory<ZoomBackend> =
        Box::new(move |_| Ok(ZoomBackend::with_shared_sdk(Arc::clone(&factory_sdk))));
    MeetingManager::new(factory, bus.clone())
        .with_queue_capacity(config.frame_queue_capacity)
        .with_delegate(Arc::new(LoggingDelegate))
}

fn join(args: JoinArgs, mut config: BotConfiguration, shutdown: &ShutdownHandle) -> Result<(), MeetingError> {
    apply_credentials(&mut config, args.sdk_key.clone(), args.sdk_secret.clone());
    config.validate()?;
    let meetings = args.meeting_configs()?;

    let (sdk, event_loop) = create_sdk(&config)?;

    let bus = AudioBus::new();
    let frame_logger = spawn_frame_logger(&bus, config.subscriber_buffer)?;

    let stop_recording = Arc::new(AtomicBool::new(false));
    let mut recorders = Vec::new();
    if let Some(ref dir) = args.record_dir {
        for meeting in &meetings {
            recorders.push(spawn_recorder(dir, meeting, &bus, &config, &stop_recording)?);
        }
    }

    let manager = shared_sdk_manager(&sdk, &bus, &config);
    manager.start_event_loop(event_loop.clone())?;

    for meeting in meetings {
        let meeting_id = meeting.meeting_id.clone();
        let name = meeting.display_name.clone().unwrap_or_default();
        match manager.join_meeting(meeting) {
            Ok(()) => log::info!("Successfully joined meeting {} as {}", meeting_id, name),
            Err(e) => log::error!("Failed to create and join meeting {}: {}", meeting_id, e),
        }
    }

    if manager.meeting_count() == 0 {
        stop_recording.store(true, Ordering::SeqCst);
        let _ = manager.shutdown();
        bus.shutdown();
        return Err(MeetingError::JoinFailed("no meeting could be joined".into()));
    }

    log::info!("All meetings joined");
    let outcome = wait_until_done(
        || event_loop.is_running(),
        shutdown,
        args.duration.map(Duration::from_secs),
    );
    log::info!("Leaving meetings ({:?})", outcome);

    let stats_json = if args.stats_json {
        Some(serde_json::json!({
            "meetings": manager.all_stats(),
            "bus": bus.stats(),
        }))
    } else {
        None
    };

    stop_recording.store(true, Ordering::SeqCst);
    let shutdown_result = manager.shutdown();
    bus.shutdown();

    for recorder in recorders {
        match recorder.join() {
            Ok(Ok(result)) => log::info!(
                "Recorded {} ({:.1}s, sha256 {})",
                result.file_path.display(),
                result.duration_secs,
                result.checksum
            ),
            Ok(Err(e)) => log::error!("Recording failed: {}", e),
            Err(_) => log::error!("Recorder thread panicked"),
        }
    }
    if frame_logger.join().is_err() {
        log::error!("Frame logger thread panicked");
    }
    drop(manager);
    drop(sdk);

    if let Some(stats) = stats_json {
        let rendered = serde_json::to_string_pretty(&stats)
            .map_err(|e| MeetingError::Unknown(format!("failed to render stats: {}", e)))?;
        println!("{}", rendered);
    }

    shutdown_result
}

fn serve(
    args: ServeArgs,
    mut config: BotConfiguration,
    runtime: &Runtime,
    shutdown: ShutdownHandle,
) -> Result<(), MeetingError> {
    apply_credentials(&mut config, args.sdk_key, args.sdk_secret);
    config.validate()?;

    let mut server_config = ServerConfiguration::from_env();
    if let Some(addr) = args.http_addr.filter(|a| !a.is_empty()) {
        server_config.http_addr = meeting_audio_server::config::normalize_addr(&addr);
    }
    server_config.audio_sample_rate = config.audio_sample_rate;
    server_config.audio_channels = config.audio_channels;

    let (sdk, event_loop) = create_sdk(&config)?;
    let bus = AudioBus::new();
    let manager = Arc::new(shared_sdk_manager(&sdk, &bus, &config));
    manager.start_event_loop(event_loop)?;

    let server = MeetingServer::new(Arc::clone(&manager), server_config);
    let served = runtime.block_on(async move {
        let listener = server.bind().await?;
        server.serve(listener, shutdown).await
    });
    if let Err(ref e) = served {
        log::error!("HTTP server failed: {}", e);
    }

    log::info!("Leaving {} meetings", manager.meeting_count());
    let shutdown_result = manager.shutdown();
    bus.shutdown();
    drop(manager);
    drop(sdk);

    served.map_err(|e| MeetingError::Unknown(format!("HTTP server failed: {}", e)))?;
    shutdown_result
}

/// Block until `duration` elapses, the SDK loop ends on its own, or
/// `shutdown` is triggered.
fn wait_until_done(
    loop_running: impl Fn() -> bool,
    shutdown: &ShutdownHandle,
    duration: Option<Duration>,
) -> WaitOutcome {
    let started = Instant::now();
    let deadline = duration.map(|d| started + d);
    let mut seen_running = false;

    loop {
        if shutdown.is_triggered() {
            return WaitOutcome::Interrupted;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return WaitOutcome::DurationElapsed;
        }

        let running = loop_running();
        seen_running |= running;
        if !running && (seen_running || started.elapsed() > LOOP_START_GRACE) {
            return WaitOutcome::LoopEnded;
        }
        shutdown.wait_blocking(WAIT_INTERVAL);
    }
}

fn spawn_frame_logger(bus: &AudioBus, buffer: usize) -> Result<thread::JoinHandle<()>, MeetingError> {
    let subscription = bus.subscribe(SubscriberFilter::all(), buffer);
    thread::Builder::new()
        .name("frame-logger".into())
        .spawn(move || {
            for delivery in subscription.iter() {
                let frame = &delivery.frame;
                log::debug!(
                    "[{}] Received {} bytes of {} audio (node_id: {})",
                    delivery.meeting_id,
                    frame.data.len(),
                    frame.audio_type.as_str().to_uppercase(),
                    frame.node_id
                );
            }
        })
        .map_err(|e| MeetingError::Unknown(format!("failed to spawn frame logger: {}", e)))
}

fn spawn_recorder(
    dir: &Path,
    meeting: &MeetingConfiguration,
    bus: &AudioBus,
    config: &BotConfiguration,
    stop: &Arc<AtomicBool>,
) -> Result<RecorderHandle, MeetingError> {
    let subscription = bus.subscribe(
        SubscriberFilter::for_meeting(meeting.meeting_id.clone()).with_audio_types([AudioType::Mixed]),
        config.subscriber_buffer,
    );
    let mut recorder = WavRecorder::new(
        dir.join(format!("{}-mixed.wav", meeting.meeting_id)),
        config.audio_sample_rate,
        config.audio_channels,
    );
    let target = RecordingTarget {
        meeting_id: meeting.meeting_id.clone(),
        audio_type: AudioType::Mixed,
        node_id: None,
    };
    let stop = Arc::clone(stop);

    thread::Builder::new()
        .name(format!("recorder-{}", meeting.meeting_id))
        .spawn(move || record_subscription(&subscription, &mut recorder, &target, &stop, None))
        .map_err(|e| MeetingError::Unknown(format!("failed to spawn recorder: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_ends_wait() {
        let shutdown = ShutdownHandle::new();
        let trigger = shutdown.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        let started = Instant::now();
        let outcome = wait_until_done(|| true, &shutdown, None);
        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(2));
        t.join().unwrap();
    }

    #[test]
    fn interrupt_wins_over_running_loop_and_duration() {
        let shutdown = ShutdownHandle::new();
        shutdown.trigger();
        assert_eq!(
            wait_until_done(|| true, &shutdown, Some(Duration::from_secs(60))),
            WaitOutcome::Interrupted
        );
    }

    #[test]
    fn duration_and_loop_exit() {
        let shutdown = ShutdownHandle::new();
        assert_eq!(
            wait_until_done(|| true, &shutdown, Some(Duration::from_millis(10))),
            WaitOutcome::DurationElapsed
        );

        let polls = std::cell::Cell::new(0);
        let loop_running = || {
            polls.set(polls.get() + 1);
            polls.get() < 3
        };
        assert_eq!(wait_until_done(loop_running, &shutdown, None), WaitOutcome::LoopEnded);
    }
}
