use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::bus::audio_bus::Subscription;
use crate::models::audio_models::AudioType;
use crate::models::error::MeetingError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::processing::wav_format;
use crate::storage::metadata::write_metadata;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Streaming WAV writer for raw SDK PCM.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [raw 16-bit PCM data...]
/// ```
///
/// A RIFF header cannot describe more than [`wav_format::MAX_WAV_DATA_BYTES`]
/// of PCM (about 18.6 hours of 32 kHz mono), so writes past the limit are
/// refused rather than producing a file whose header lies.
pub struct WavRecorder {
    file_path: PathBuf,
    sample_rate: u32,
    channels: u16,
    file: Option<BufWriter<File>>,
    total_bytes_written: u64,
    data_limit: u64,
}

impl WavRecorder {
    pub fn new(file_path: PathBuf, sample_rate: u32, channels: u16) -> Self {
        Self {
            file_path,
            sample_rate,
            channels,
            file: None,
            total_bytes_written: 0,
            data_limit: wav_format::MAX_WAV_DATA_BYTES,
        }
    }

    /// Cap the PCM payload below the WAV maximum.
    pub fn with_data_limit(mut self, bytes: u64) -> Self {
        self.data_limit = bytes.min(wav_format::MAX_WAV_DATA_BYTES);
        self
    }

    /// Whether `len` more PCM bytes fit under the data limit.
    pub fn has_room_for(&self, len: usize) -> bool {
        self.data_bytes() + len as u64 <= self.data_limit
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Create the file (and parent directory) and write a placeholder header.
    pub fn open(&mut self) -> Result<(), MeetingError> {
        if self.is_open() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MeetingError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&self.file_path)
            .map_err(|e| MeetingError::StorageError(format!("failed to create file: {}", e)))?;
        self.file = Some(BufWriter::new(file));
        self.total_bytes_written = 0;

        let header = wav_format::generate_wav_header(self.sample_rate, wav_format::PCM_BIT_DEPTH, self.channels, 0);
        self.write_raw(&header)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), MeetingError> {
        if !self.is_open() {
            return Err(MeetingError::StorageError("file is not open for writing".into()));
        }
        if !self.has_room_for(data.len()) {
            return Err(MeetingError::StorageError(format!(
                "{} would exceed the {} byte WAV data limit",
                self.file_path.display(),
                self.data_limit
            )));
        }
        self.write_raw(data)
    }

    /// Patch the header sizes, flush, and return the file's SHA-256 hex digest.
    pub fn close(&mut self) -> Result<String, MeetingError> {
        let mut writer = self
            .file
            .take()
            .ok_or_else(|| MeetingError::StorageError("file is not open".into()))?;

        let mut header = wav_format::generate_wav_header(self.sample_rate, wav_format::PCM_BIT_DEPTH, self.channels, 0);
        wav_format::patch_file_size(&mut header, self.total_bytes_written);
        wav_format::patch_data_size(&mut header, self.data_bytes());

        let storage = |e: std::io::Error| MeetingError::StorageError(e.to_string());
        writer.seek(SeekFrom::Start(0)).map_err(storage)?;
        writer.write_all(&header).map_err(storage)?;
        writer.flush().map_err(storage)?;
        drop(writer);

        sha256_file(&self.file_path)
    }

    /// PCM bytes written, excluding the header.
    pub fn data_bytes(&self) -> u64 {
        self.total_bytes_written
            .saturating_sub(wav_format::WAV_HEADER_SIZE as u64)
    }

    pub fn duration_secs(&self) -> f64 {
        wav_format::pcm_duration_secs(self.data_bytes(), self.sample_rate, self.channels)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), MeetingError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| MeetingError::StorageError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| MeetingError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

/// What a recording captures, for its metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingTarget {
    pub meeting_id: String,
    pub audio_type: AudioType,
    pub node_id: Option<u32>,
}

/// Pump frames from `subscription` into `recorder` until `stop` is set,
/// `deadline` passes, the bus disconnects, or the file is full. Finalizes
/// the file and its metadata sidecar.
pub fn record_subscription(
    subscription: &Subscription,
    recorder: &mut WavRecorder,
    target: &RecordingTarget,
    stop: &AtomicBool,
    deadline: Option<Instant>,
) -> Result<RecordingResult, MeetingError> {
    recorder.open()?;
    log::info!(
        "Recording {} audio for meeting {} to {}",
        target.audio_type,
        target.meeting_id,
        recorder.file_path().display()
    );

    loop {
        if stop.load(Ordering::SeqCst) || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match subscription.recv_timeout(POLL_INTERVAL) {
            Ok(delivery) => {
                if !write_or_full(recorder, &delivery.frame.data)? {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Whatever is already queued belongs to the recording.
    while let Some(delivery) = subscription.try_recv() {
        if !write_or_full(recorder, &delivery.frame.data)? {
            break;
        }
    }

    let duration_secs = recorder.duration_secs();
    let checksum = recorder.close()?;
    let file_path = recorder.file_path().to_path_buf();

    let metadata = RecordingMetadata::new(
        &target.meeting_id,
        target.audio_type,
        target.node_id,
        duration_secs,
        recorder.sample_rate(),
        recorder.channels(),
        &file_path.to_string_lossy(),
        &checksum,
    );
    write_metadata(&metadata, &file_path)?;

    log::info!(
        "Finished recording {} ({:.2}s)",
        file_path.display(),
        duration_secs
    );

    Ok(RecordingResult {
        file_path,
        duration_secs,
        metadata,
        checksum,
    })
}

/// `Ok(false)` once the recorder has no room left for `data`.
fn write_or_full(recorder: &mut WavRecorder, data: &[u8]) -> Result<bool, MeetingError> {
    if !recorder.has_room_for(data.len()) {
        log::warn!(
            "Recording {} reached its size limit, finalizing",
            recorder.file_path().display()
        );
        return Ok(false);
    }
    recorder.write(data)?;
    Ok(true)
}

fn sha256_file(path: &Path) -> Result<String, MeetingError> {
    let data = fs::read(path)
        .map_err(|e| MeetingError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::audio_bus::{AudioBus, SubscriberFilter};
    use crate::models::audio_models::AudioFrame;
    use crate::storage::metadata::read_metadata;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn write_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mixed.wav");

        let mut recorder = WavRecorder::new(path.clone(), 32000, 1);
        recorder.open().unwrap();
        recorder.write(&[0u8; 640]).unwrap();
        recorder.write(&[1u8; 640]).unwrap();
        let checksum = recorder.close().unwrap();

        assert_eq!(checksum.len(), 64);
        assert!(!recorder.is_open());

        let file_data = fs::read(&path).unwrap();
        assert_eq!(file_data.len(), 44 + 1280);
        assert_eq!(&file_data[0..4], b"RIFF");
        assert_eq!(&file_data[8..12], b"WAVE");

        let data_size = u32::from_le_bytes([file_data[40], file_data[41], file_data[42], file_data[43]]);
        assert_eq!(data_size, 1280);
        let riff_size = u32::from_le_bytes([file_data[4], file_data[5], file_data[6], file_data[7]]);
        assert_eq!(riff_size, 36 + 1280);

        assert_eq!(checksum, hex_encode(&Sha256::digest(&file_data)));
    }

    #[test]
    fn write_before_open_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = WavRecorder::new(dir.path().join("x.wav"), 32000, 1);
        assert!(matches!(recorder.write(&[0u8; 2]), Err(MeetingError::StorageError(_))));
        assert!(recorder.close().is_err());
    }

    #[test]
    fn records_until_bus_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m1.wav");
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::for_meeting("m1"), 16);

        // One second of 32 kHz mono in two frames.
        for _ in 0..2 {
            bus.publish("m1", Arc::new(AudioFrame::new(AudioType::Mixed, 0, vec![0u8; 32000])));
        }
        bus.shutdown();

        let mut recorder = WavRecorder::new(path.clone(), 32000, 1);
        let target = RecordingTarget {
            meeting_id: "m1".into(),
            audio_type: AudioType::Mixed,
            node_id: None,
        };
        let result = record_subscription(&sub, &mut recorder, &target, &AtomicBool::new(false), None).unwrap();

        assert_relative_eq!(result.duration_secs, 1.0);
        assert_eq!(result.file_path, path);

        let metadata = read_metadata(&path).unwrap();
        assert_eq!(metadata.meeting_id, "m1");
        assert_eq!(metadata.checksum, result.checksum);
        assert_eq!(metadata.sample_rate, 32000);
    }

    #[test]
    fn stop_flag_ends_recording() {
        let dir = tempfile::tempdir().unwrap();
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::all(), 4);
        let mut recorder = WavRecorder::new(dir.path().join("empty.wav"), 32000, 1);
        let target = RecordingTarget {
            meeting_id: "m1".into(),
            audio_type: AudioType::OneWay,
            node_id: Some(16778240),
        };

        let result = record_subscription(&sub, &mut recorder, &target, &AtomicBool::new(true), None).unwrap();
        assert_eq!(result.duration_secs, 0.0);
        assert_eq!(result.metadata.node_id, Some(16778240));
    }

    #[test]
    fn writes_past_data_limit_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capped.wav");
        let mut recorder = WavRecorder::new(path.clone(), 32000, 1).with_data_limit(1280);
        recorder.open().unwrap();

        recorder.write(&[0u8; 640]).unwrap();
        recorder.write(&[0u8; 640]).unwrap();
        assert!(!recorder.has_room_for(1));
        assert!(matches!(recorder.write(&[0u8; 2]), Err(MeetingError::StorageError(_))));

        recorder.close().unwrap();
        let file_data = fs::read(&path).unwrap();
        assert_eq!(file_data.len(), 44 + 1280);
        assert_eq!(u32::from_le_bytes([file_data[40], file_data[41], file_data[42], file_data[43]]), 1280);
    }

    #[test]
    fn data_limit_never_exceeds_wav_maximum() {
        let recorder = WavRecorder::new(PathBuf::from("x.wav"), 32000, 1).with_data_limit(u64::MAX);
        assert!(recorder.has_room_for(usize::try_from(wav_format::MAX_WAV_DATA_BYTES).unwrap()));
        assert!(!recorder.has_room_for(usize::try_from(wav_format::MAX_WAV_DATA_BYTES + 1).unwrap()));
    }

    #[test]
    fn full_recording_is_finalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.wav");
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::all(), 16);
        for _ in 0..3 {
            bus.publish("m1", Arc::new(AudioFrame::new(AudioType::Mixed, 0, vec![0u8; 32000])));
        }

        let mut recorder = WavRecorder::new(path.clone(), 32000, 1).with_data_limit(64000);
        let target = RecordingTarget {
            meeting_id: "m1".into(),
            audio_type: AudioType::Mixed,
            node_id: None,
        };
        let result = record_subscription(&sub, &mut recorder, &target, &AtomicBool::new(false), None).unwrap();

        assert_relative_eq!(result.duration_secs, 1.0);
        assert_eq!(read_metadata(&path).unwrap().checksum, result.checksum);
    }
}
