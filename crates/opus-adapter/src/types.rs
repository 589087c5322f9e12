//! Core types shared by the factory, negotiator and codec instances
//!
//! These mirror the host media framework's vocabulary: codec descriptors,
//! negotiated parameters with their fmtp lists, and media frames.

use crate::error::{AdapterError, Result};
use bytes::Bytes;
use std::fmt;
use tracing::warn;

/// Encoding name handled by this adapter
pub const OPUS_ENCODING_NAME: &str = "opus";

/// Clock rates accepted by the capability query
pub const SUPPORTED_CLOCK_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Supported channel counts
pub const SUPPORTED_CHANNELS: [u8; 2] = [1, 2];

/// Maximum number of fmtp entries the host framework carries per direction
pub const MAX_FMTP_PARAMS: usize = 16;

/// Media type of a codec descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// Audio media
    Audio,
    /// Video media
    Video,
    /// Application data
    Application,
    /// Anything the host could not classify
    Unknown,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Application => write!(f, "application"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identifies a codec variant
///
/// Equality compares the encoding name case-insensitively, as SDP does.
#[derive(Debug, Clone)]
pub struct CodecDescriptor {
    /// Media type
    pub media_type: MediaType,
    /// Encoding name as it appears in SDP (e.g. "opus")
    pub encoding_name: String,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Number of channels
    pub channel_count: u8,
    /// RTP payload type hint
    pub payload_type: u8,
}

impl CodecDescriptor {
    /// Create an audio descriptor
    pub fn audio(
        encoding_name: impl Into<String>,
        clock_rate: u32,
        channel_count: u8,
        payload_type: u8,
    ) -> Self {
        Self {
            media_type: MediaType::Audio,
            encoding_name: encoding_name.into(),
            clock_rate,
            channel_count,
            payload_type,
        }
    }

    /// Set the media type
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    /// Check whether the encoding name matches, ignoring ASCII case
    pub fn has_encoding_name(&self, name: &str) -> bool {
        self.encoding_name.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for CodecDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.media_type == other.media_type
            && self.has_encoding_name(&other.encoding_name)
            && self.clock_rate == other.clock_rate
            && self.channel_count == other.channel_count
            && self.payload_type == other.payload_type
    }
}

impl Eq for CodecDescriptor {}

impl fmt::Display for CodecDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.encoding_name, self.clock_rate, self.channel_count
        )
    }
}

/// A single `name=value` format parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmtpParam {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

/// Ordered list of format parameters
///
/// Duplicates are allowed; order is significant for negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FmtpParams {
    params: Vec<FmtpParam>,
}

impl FmtpParams {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    ///
    /// Returns `false` and drops the entry once [`MAX_FMTP_PARAMS`] is reached.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.params.len() >= MAX_FMTP_PARAMS {
            warn!("fmtp list full, dropping '{}'", name);
            return false;
        }
        self.params.push(FmtpParam {
            name,
            value: value.into(),
        });
        true
    }

    /// Builder-style append
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// First value for `name`, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_str())
    }

    /// Number of entries with `name`, ignoring ASCII case
    pub fn count(&self, name: &str) -> usize {
        self.params
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .count()
    }

    /// Iterate in order
    pub fn iter(&self) -> std::slice::Iter<'_, FmtpParam> {
        self.params.iter()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<'a> IntoIterator for &'a FmtpParams {
    type Item = &'a FmtpParam;
    type IntoIter = std::slice::Iter<'a, FmtpParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

impl fmt::Display for FmtpParams {
    /// SDP `a=fmtp` value form: `name=value;name=value`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{}={}", p.name, p.value)?;
        }
        Ok(())
    }
}

/// Negotiated codec parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParameters {
    /// Number of channels
    pub channel_count: u8,
    /// Clock rate in Hz
    pub clock_rate: u32,
    /// Average bitrate in bits per second
    pub avg_bitrate: u32,
    /// Maximum bitrate in bits per second
    pub max_bitrate: u32,
    /// Frame duration in milliseconds
    pub frame_ms: u16,
    /// PCM bits per sample
    pub bits_per_sample: u8,
    /// Frames per RTP packet
    pub frames_per_packet: u8,
    /// RTP payload type
    pub payload_type: u8,
    /// In-band forward error correction
    pub plc: bool,
    /// Discontinuous transmission
    pub vad: bool,
    /// Incoming modify request from the remote peer (applied to the encoder)
    pub enc_fmtp: FmtpParams,
    /// Outgoing advertisement to the remote peer
    pub dec_fmtp: FmtpParams,
}

impl CodecParameters {
    /// Check the invariants every open relies on
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_CHANNELS.contains(&self.channel_count) {
            return Err(AdapterError::invalid_argument(format!(
                "channel count {} not in {:?}",
                self.channel_count, SUPPORTED_CHANNELS
            )));
        }

        if !SUPPORTED_CLOCK_RATES.contains(&self.clock_rate) {
            return Err(AdapterError::invalid_argument(format!(
                "clock rate {}Hz not in {:?}",
                self.clock_rate, SUPPORTED_CLOCK_RATES
            )));
        }

        if self.avg_bitrate > self.max_bitrate {
            return Err(AdapterError::invalid_argument(format!(
                "average bitrate {} exceeds maximum {}",
                self.avg_bitrate, self.max_bitrate
            )));
        }

        Ok(())
    }

    /// Samples per channel in one frame
    pub fn samples_per_frame(&self) -> usize {
        self.clock_rate as usize * self.frame_ms as usize / 1000
    }

    /// PCM bytes in one frame across all channels
    pub fn pcm_frame_bytes(&self) -> usize {
        self.samples_per_frame() * self.channel_count as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Opaque 64-bit media timestamp, passed through unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Media frame kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Frame carries audio (PCM or compressed)
    Audio,
    /// No output was produced
    None,
}

/// Media frame exchanged with the host framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind
    pub frame_type: FrameType,
    /// Payload bytes
    pub payload: Bytes,
    /// Timestamp, when the producing operation stamps one
    pub timestamp: Option<Timestamp>,
    /// Samples per channel reported by the decoder; overrides the payload
    /// length as the frame size
    pub samples: Option<usize>,
}

impl Frame {
    /// Audio frame carrying a timestamp
    pub fn audio(payload: impl Into<Bytes>, timestamp: Timestamp) -> Self {
        Self {
            frame_type: FrameType::Audio,
            payload: payload.into(),
            timestamp: Some(timestamp),
            samples: None,
        }
    }

    /// Audio frame without a timestamp
    pub fn unstamped(payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Audio,
            payload: payload.into(),
            timestamp: None,
            samples: None,
        }
    }

    /// Frame signalling that nothing was produced
    pub fn none() -> Self {
        Self {
            frame_type: FrameType::None,
            payload: Bytes::new(),
            timestamp: None,
            samples: None,
        }
    }

    /// Audio frame built from 16-bit PCM samples
    pub fn from_pcm(samples: &[i16], timestamp: Timestamp) -> Self {
        Self::audio(
            Bytes::copy_from_slice(bytemuck::cast_slice(samples)),
            timestamp,
        )
    }

    /// Decoded PCM whose size is the engine's sample count
    pub fn decoded(
        pcm: impl Into<Bytes>,
        samples: usize,
        timestamp: Option<Timestamp>,
    ) -> Self {
        Self {
            frame_type: FrameType::Audio,
            payload: pcm.into(),
            timestamp,
            samples: Some(samples),
        }
    }

    /// Frame size: samples per channel for decoder output, payload bytes
    /// otherwise
    pub fn size(&self) -> usize {
        self.samples.unwrap_or(self.payload.len())
    }

    /// Check if this frame carries audio
    pub fn is_audio(&self) -> bool {
        self.frame_type == FrameType::Audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_name_is_case_insensitive() {
        let a = CodecDescriptor::audio("opus", 48000, 1, 111);
        let b = CodecDescriptor::audio("OPUS", 48000, 1, 111);
        assert_eq!(a, b);
        assert_ne!(a, CodecDescriptor::audio("opus", 16000, 1, 111));
        assert_eq!(a.to_string(), "opus/48000/1");
    }

    #[test]
    fn test_fmtp_keeps_order_and_duplicates() {
        let fmtp = FmtpParams::new()
            .with("stereo", "1")
            .with("usedtx", "1")
            .with("stereo", "1");
        assert_eq!(fmtp.len(), 3);
        assert_eq!(fmtp.count("STEREO"), 2);
        assert_eq!(fmtp.get("UseDtx"), Some("1"));
        assert_eq!(fmtp.to_string(), "stereo=1;usedtx=1;stereo=1");
    }

    #[test]
    fn test_fmtp_capacity() {
        let mut fmtp = FmtpParams::new();
        for i in 0..MAX_FMTP_PARAMS {
            assert!(fmtp.push(format!("p{}", i), "0"));
        }
        assert!(!fmtp.push("overflow", "1"));
        assert_eq!(fmtp.len(), MAX_FMTP_PARAMS);
        assert_eq!(fmtp.get("overflow"), None);
    }

    #[test]
    fn test_parameter_validation() {
        let mut params = CodecParameters {
            channel_count: 1,
            clock_rate: 16000,
            avg_bitrate: 20000,
            max_bitrate: 32000,
            frame_ms: 10,
            bits_per_sample: 16,
            frames_per_packet: 1,
            payload_type: 111,
            plc: true,
            vad: false,
            enc_fmtp: FmtpParams::new(),
            dec_fmtp: FmtpParams::new(),
        };
        assert!(params.validate().is_ok());
        assert_eq!(params.samples_per_frame(), 160);
        assert_eq!(params.pcm_frame_bytes(), 320);

        params.channel_count = 3;
        assert!(params.validate().is_err());

        params.channel_count = 2;
        params.clock_rate = 44100;
        assert!(params.validate().is_err());

        params.clock_rate = 48000;
        params.avg_bitrate = 64000;
        assert!(matches!(
            params.validate(),
            Err(AdapterError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_frame_constructors() {
        let frame = Frame::from_pcm(&[1i16, -1, 0], Timestamp(7));
        assert!(frame.is_audio());
        assert_eq!(frame.size(), 6);
        assert_eq!(frame.timestamp, Some(Timestamp(7)));

        let none = Frame::none();
        assert_eq!(none.frame_type, FrameType::None);
        assert_eq!(none.size(), 0);
        assert_eq!(none.timestamp, None);
    }

    #[test]
    fn test_decoded_frame_reports_sample_count() {
        let pcm: Vec<u8> = bytemuck::cast_slice(&[5i16; 320]).to_vec();
        let frame = Frame::decoded(pcm, 160, None);
        assert!(frame.is_audio());
        assert_eq!(frame.size(), 160);
        assert_eq!(frame.payload.len(), 640);
        assert_ne!(frame, Frame::unstamped(frame.payload.clone()));
    }
}
