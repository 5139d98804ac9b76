//! Compressed audio decoding
//!
//! Decodes a whole asset into memory as interleaved 16-bit stereo at the
//! output device's sample rate, so the mixer never branches on format:
//!
//! 1. Probe the container and pick the first audio track (symphonia)
//! 2. Decode every packet to interleaved i16
//! 3. Remix to stereo (mono is duplicated, extra channels are dropped)
//! 4. Resample to the device rate when it differs (rubato)

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::engine::DecodedTrack;
use crate::types::{StereoFrame, OUTPUT_CHANNELS};

/// Input frames per resampler chunk
const RESAMPLE_CHUNK: usize = 1024;

/// Errors raised while decoding an audio asset
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Container could not be probed or has no decodable track
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The codec stream is malformed beyond a single bad packet
    #[error("Codec error: {0}")]
    Codec(#[from] SymphoniaError),

    #[error("Resampler error: {0}")]
    Resample(String),

    /// The stream decoded to zero frames
    #[error("Stream contains no audio")]
    Empty,
}

impl From<rubato::ResamplerConstructionError> for DecodeError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        DecodeError::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for DecodeError {
    fn from(e: rubato::ResampleError) -> Self {
        DecodeError::Resample(e.to_string())
    }
}

/// Decode a compressed asset into a track at `target_rate`
///
/// `extension` is a format hint such as `"mp3"` or `"wav"`.
pub fn decode_track(
    bytes: Vec<u8>,
    extension: Option<&str>,
    target_rate: u32,
) -> Result<DecodedTrack, DecodeError> {
    let (samples, channels, source_rate) = decode_interleaved(bytes, extension)?;
    let stereo = remix_to_stereo(&samples, channels);
    drop(samples);

    if stereo.is_empty() {
        return Err(DecodeError::Empty);
    }

    let frames = resample(&stereo, source_rate, target_rate)?;
    log::info!(
        "Decoded {} frames @ {}Hz ({} ch) -> {} frames @ {}Hz",
        stereo.len(),
        source_rate,
        channels,
        frames.len(),
        target_rate
    );

    Ok(DecodedTrack::new(frames))
}

/// Decode every packet of the first audio track to interleaved i16
///
/// Returns (samples, channel count, sample rate).
fn decode_interleaved(
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<(Vec<i16>, usize, u32), DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat("No audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        // Some codecs (MP3) only report the layout once a frame is decoded
        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());

        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    let sample_rate = sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("Unknown sample rate".to_string()))?;
    let channels = channels.filter(|&c| c > 0).ok_or(DecodeError::Empty)?;

    Ok((samples, channels, sample_rate))
}

/// Fold interleaved samples with any channel count into stereo frames
///
/// Mono is duplicated to both sides; beyond two channels only the first two
/// are kept.
pub fn remix_to_stereo(samples: &[i16], channels: usize) -> Vec<StereoFrame> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().map(|&s| StereoFrame::mono(s)).collect(),
        n => samples
            .chunks_exact(n)
            .map(|frame| StereoFrame::new(frame[0], frame[1]))
            .collect(),
    }
}

/// Resample stereo frames from `from` Hz to `to` Hz
///
/// Output length is exactly `ceil(len * to / from)`; the resampler's
/// group delay is trimmed from the front.
pub fn resample(
    frames: &[StereoFrame],
    from: u32,
    to: u32,
) -> Result<Vec<StereoFrame>, DecodeError> {
    if from == to || frames.is_empty() {
        return Ok(frames.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, OUTPUT_CHANNELS)?;

    let left: Vec<f32> = frames.iter().map(StereoFrame::left_f32).collect();
    let right: Vec<f32> = frames.iter().map(StereoFrame::right_f32).collect();

    let expected = (frames.len() as u64 * to as u64).div_ceil(from as u64) as usize;
    let delay = resampler.output_delay();
    let mut out_left: Vec<f32> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut out_right: Vec<f32> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while pos < frames.len() {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(frames.len());
        let chunk = [&left[pos..end], &right[pos..end]];
        let processed = if end - pos == needed {
            resampler.process(&chunk[..], None)?
        } else {
            resampler.process_partial(Some(&chunk[..]), None)?
        };
        out_left.extend_from_slice(&processed[0]);
        out_right.extend_from_slice(&processed[1]);
        pos = end;
    }

    // Flush the tail held back by the resampler delay
    while out_left.len() < expected + delay {
        let processed = resampler.process_partial::<&[f32]>(None, None)?;
        if processed[0].is_empty() {
            break;
        }
        out_left.extend_from_slice(&processed[0]);
        out_right.extend_from_slice(&processed[1]);
    }

    let end = (expected + delay).min(out_left.len());
    let start = delay.min(end);
    Ok(out_left[start..end]
        .iter()
        .zip(&out_right[start..end])
        .map(|(&l, &r)| StereoFrame::new(to_i16(l), to_i16(r)))
        .collect())
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
