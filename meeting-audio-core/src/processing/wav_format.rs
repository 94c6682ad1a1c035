//! WAV file format utilities for raw meeting audio.
//!
//! The SDK delivers signed 16-bit little-endian PCM, so recordings are
//! written as plain PCM WAV with a standard 44-byte RIFF header.

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Bit depth of SDK audio.
pub const PCM_BIT_DEPTH: u16 = 16;

/// Largest PCM payload a RIFF header can describe (`36 + data_size` must fit a u32).
pub const MAX_WAV_DATA_BYTES: u64 = u32::MAX as u64 - 36;

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Patch the RIFF chunk size at offset 4 (file size - 8), saturating at `u32::MAX`.
pub fn patch_file_size(header: &mut [u8], total_file_size: u64) {
    let chunk_size = u32::try_from(total_file_size.saturating_sub(8)).unwrap_or(u32::MAX);
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
}

/// Patch the data-size field at offset 40, saturating at [`MAX_WAV_DATA_BYTES`].
pub fn patch_data_size(header: &mut [u8], data_size: u64) {
    let data_size = data_size.min(MAX_WAV_DATA_BYTES) as u32;
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
}

/// Playback duration of `data_bytes` of 16-bit PCM.
pub fn pcm_duration_secs(data_bytes: u64, sample_rate: u32, channels: u16) -> f64 {
    let bytes_per_second = sample_rate as u64 * channels as u64 * (PCM_BIT_DEPTH as u64 / 8);
    if bytes_per_second == 0 {
        return 0.0;
    }
    data_bytes as f64 / bytes_per_second as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn header_riff_magic() {
        let header = generate_wav_header(32000, 16, 1, 0);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn header_32khz_mono_16bit() {
        let header = generate_wav_header(32000, 16, 1, 6400);

        assert_eq!(u16::from_le_bytes([header[20], header[21]]), 1);
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 1);
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 32000);
        // 32000 * 1 * 16/8
        assert_eq!(u32::from_le_bytes([header[28], header[29], header[30], header[31]]), 64000);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 2);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
        assert_eq!(u32::from_le_bytes([header[40], header[41], header[42], header[43]]), 6400);
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), 36 + 6400);
    }

    #[test]
    fn patch_sizes() {
        let mut header = generate_wav_header(32000, 16, 1, 0);

        patch_data_size(&mut header, 19200);
        assert_eq!(u32::from_le_bytes([header[40], header[41], header[42], header[43]]), 19200);

        patch_file_size(&mut header, 19200 + 44);
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), 19200 + 36);
    }

    #[test]
    fn duration_from_bytes() {
        assert_relative_eq!(pcm_duration_secs(64000, 32000, 1), 1.0);
        assert_relative_eq!(pcm_duration_secs(32000, 16000, 2), 0.5);
        assert_eq!(pcm_duration_secs(100, 0, 1), 0.0);
    }

    #[test]
    fn sizes_past_u32_saturate() {
        let mut header = generate_wav_header(32000, 16, 1, 0);
        let data = (1u64 << 32) + 64000;

        patch_data_size(&mut header, data);
        patch_file_size(&mut header, data + 44);

        let data_size = u32::from_le_bytes([header[40], header[41], header[42], header[43]]);
        let riff_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        assert_eq!(data_size as u64, MAX_WAV_DATA_BYTES);
        assert_eq!(riff_size, u32::MAX);

        patch_data_size(&mut header, MAX_WAV_DATA_BYTES);
        patch_file_size(&mut header, MAX_WAV_DATA_BYTES + 44);
        assert_eq!(u32::from_le_bytes([header[40], header[41], header[42], header[43]]) as u64, MAX_WAV_DATA_BYTES);
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), u32::MAX);
    }
}
