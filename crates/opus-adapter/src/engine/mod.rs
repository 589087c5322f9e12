//! Codec engine capability set
//!
//! The compression algorithm lives behind these traits. An [`EngineProvider`]
//! sizes and initializes encoder/decoder state inside arena blocks handed to
//! it by the adapter; the resulting handles expose encode, decode and control.
//! Failures come back as [`EngineError`], which mirrors the engine's numeric
//! error codes and is translated by the adapter's error mapper.

use crate::arena::ArenaBlock;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod sim;
#[cfg(feature = "opus")]
pub mod native;

pub use sim::SimulatedOpus;
#[cfg(feature = "opus")]
pub use native::NativeOpus;

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Engine failure codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineError {
    /// One or more invalid/out of range arguments (-1)
    BadArg,
    /// Not enough room in the output buffer (-2)
    BufferTooSmall,
    /// Internal error detected (-3)
    InternalError,
    /// Compressed data is corrupted (-4)
    InvalidPacket,
    /// Invalid/unsupported request (-5)
    Unimplemented,
    /// Encoder or decoder structure is invalid or already freed (-6)
    InvalidState,
    /// Memory allocation failed (-7)
    AllocFail,
    /// Any other code
    Unknown(i32),
}

impl EngineError {
    /// Build from a raw engine return code
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::BadArg,
            -2 => Self::BufferTooSmall,
            -3 => Self::InternalError,
            -4 => Self::InvalidPacket,
            -5 => Self::Unimplemented,
            -6 => Self::InvalidState,
            -7 => Self::AllocFail,
            other => Self::Unknown(other),
        }
    }

    /// Raw engine return code
    pub fn code(self) -> i32 {
        match self {
            Self::BadArg => -1,
            Self::BufferTooSmall => -2,
            Self::InternalError => -3,
            Self::InvalidPacket => -4,
            Self::Unimplemented => -5,
            Self::InvalidState => -6,
            Self::AllocFail => -7,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Encoder application mode; codec instances always open for VoIP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Application {
    /// Speech-optimized
    Voip,
}

/// Signal type hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Speech content
    Voice,
    /// Music content
    Music,
}

/// Audio bandwidth ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bandwidth {
    /// 4 kHz passband
    Narrowband,
    /// 6 kHz passband
    Mediumband,
    /// 8 kHz passband
    Wideband,
    /// 12 kHz passband
    Superwideband,
    /// 20 kHz passband
    Fullband,
}

/// Encoder control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderControl {
    /// Computational complexity (0-10)
    SetComplexity(i32),
    /// Signal type hint
    SetSignal(Signal),
    /// In-band FEC flag
    SetInbandFec(i32),
    /// Target bitrate in bits per second
    SetBitrate(i32),
    /// Maximum coded bandwidth
    SetMaxBandwidth(Bandwidth),
    /// Discontinuous transmission flag
    SetDtx(i32),
}

/// Snapshot of the controls an encoder currently runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Computational complexity
    pub complexity: i32,
    /// Signal type hint, if one was set
    pub signal: Option<Signal>,
    /// In-band FEC flag
    pub inband_fec: i32,
    /// Target bitrate in bits per second
    pub bitrate: i32,
    /// Maximum coded bandwidth
    pub max_bandwidth: Bandwidth,
    /// Discontinuous transmission flag
    pub dtx: i32,
}

/// Initialized encoder state
pub trait EncoderEngine: Send + fmt::Debug {
    /// Encode one frame of interleaved PCM into `output`, returning the packet length
    fn encode(&mut self, pcm: &[i16], output: &mut [u8]) -> EngineResult<usize>;

    /// Apply a control request
    fn control(&mut self, request: EncoderControl) -> EngineResult<()>;

    /// Current control values
    fn settings(&self) -> EncoderSettings;
}

/// Initialized decoder state
pub trait DecoderEngine: Send + fmt::Debug {
    /// Decode `packet` into interleaved PCM, returning samples per channel
    ///
    /// `None` asks the engine to conceal a lost packet. `fec` requests decoding
    /// of the in-band redundancy instead of the primary frame.
    fn decode(&mut self, packet: Option<&[u8]>, pcm: &mut [i16], fec: bool) -> EngineResult<usize>;
}

/// Factory for engine state
pub trait EngineProvider: Send + Sync + fmt::Debug {
    /// Engine name for diagnostics
    fn name(&self) -> &'static str;

    /// Bytes of state an encoder needs for `channels`
    fn encoder_state_size(&self, channels: u8) -> usize;

    /// Bytes of state a decoder needs for `channels`
    fn decoder_state_size(&self, channels: u8) -> usize;

    /// Initialize an encoder in the zeroed `state` block
    fn init_encoder(
        &self,
        state: ArenaBlock,
        sample_rate: u32,
        channels: u8,
        application: Application,
    ) -> EngineResult<Box<dyn EncoderEngine>>;

    /// Initialize a decoder in the zeroed `state` block
    fn init_decoder(
        &self,
        state: ArenaBlock,
        sample_rate: u32,
        channels: u8,
    ) -> EngineResult<Box<dyn DecoderEngine>>;
}
