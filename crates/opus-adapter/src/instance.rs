//! Codec instance state machine
//!
//! An instance is checked out of the factory's slot table in the `Created`
//! state. `open` builds encoder and decoder state inside the instance's own
//! arena; `close` only drops readiness, so the state memory stays in the arena
//! until the instance goes back to the factory.

use crate::arena::Arena;
use crate::config::AdapterConfig;
use crate::engine::{
    Application, DecoderEngine, EncoderControl, EncoderEngine, EncoderSettings, EngineProvider,
    Signal,
};
use crate::error::{AdapterError, Result};
use crate::negotiation::apply_incoming_modify;
use crate::types::{CodecParameters, Frame, FrameType, Timestamp};
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Lifecycle state of a codec instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Allocated but not open (also the state after `close`)
    Created,
    /// Encoder and decoder are ready
    Open,
}

/// Encoder tuning applied on every open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EncoderTuning {
    pub complexity: u8,
    pub signal: Signal,
}

impl From<&AdapterConfig> for EncoderTuning {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            complexity: config.complexity,
            signal: config.signal,
        }
    }
}

/// Storage behind one slot of the factory's slot table
///
/// Cores are boxed so a slot can be reused without moving its storage.
pub(crate) struct InstanceCore {
    arena: Option<Arc<Arena>>,
    engine: Arc<dyn EngineProvider>,
    tuning: EncoderTuning,
    encoder: Option<Box<dyn EncoderEngine>>,
    decoder: Option<Box<dyn DecoderEngine>>,
    enc_ready: bool,
    dec_ready: bool,
    channels: u8,
}

impl InstanceCore {
    pub(crate) fn new(engine: Arc<dyn EngineProvider>, tuning: EncoderTuning) -> Self {
        Self {
            arena: None,
            engine,
            tuning,
            encoder: None,
            decoder: None,
            enc_ready: false,
            dec_ready: false,
            channels: 1,
        }
    }

    /// Prepare a (possibly recycled) core for a new checkout
    pub(crate) fn attach(&mut self, arena: Arc<Arena>) {
        self.enc_ready = false;
        self.dec_ready = false;
        self.arena = Some(arena);
    }

    /// Drop engine state and give the instance arena back
    pub(crate) fn detach(&mut self) {
        self.enc_ready = false;
        self.dec_ready = false;
        self.encoder = None;
        self.decoder = None;
        if let Some(arena) = self.arena.take() {
            arena.release();
        }
    }
}

impl fmt::Debug for InstanceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCore")
            .field("engine", &self.engine.name())
            .field("arena", &self.arena.as_ref().map(|a| a.name().to_string()))
            .field("enc_ready", &self.enc_ready)
            .field("dec_ready", &self.dec_ready)
            .field("channels", &self.channels)
            .finish()
    }
}

/// A codec instance checked out of an [`OpusCodecFactory`](crate::OpusCodecFactory)
///
/// Instances are single-threaded: the host must not call into one instance
/// from two threads at once, which `&mut self` enforces here.
#[derive(Debug)]
pub struct CodecInstance {
    slot: usize,
    generation: u64,
    core: Box<InstanceCore>,
}

impl CodecInstance {
    pub(crate) fn new(slot: usize, generation: u64, core: Box<InstanceCore>) -> Self {
        Self {
            slot,
            generation,
            core,
        }
    }

    pub(crate) fn into_parts(self) -> (usize, u64, Box<InstanceCore>) {
        (self.slot, self.generation, self.core)
    }

    /// Slot index in the factory's slot table
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current lifecycle state
    pub fn state(&self) -> InstanceState {
        if self.core.enc_ready && self.core.dec_ready {
            InstanceState::Open
        } else {
            InstanceState::Created
        }
    }

    /// Check if the instance is open
    pub fn is_open(&self) -> bool {
        self.state() == InstanceState::Open
    }

    /// Controls the encoder currently runs with, once one has been built
    pub fn encoder_settings(&self) -> Option<EncoderSettings> {
        self.core.encoder.as_ref().map(|e| e.settings())
    }

    /// Host hook; nothing to do
    pub fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Build encoder and decoder state for `params`
    pub fn open(&mut self, params: &CodecParameters) -> Result<()> {
        let core = &mut *self.core;
        if core.enc_ready || core.dec_ready {
            return Err(AdapterError::invalid_state("codec instance is already open"));
        }
        params.validate()?;

        let arena = core
            .arena
            .clone()
            .ok_or_else(|| AdapterError::invalid_state("codec instance has no arena"))?;
        let channels = params.channel_count;
        let rate = params.clock_rate;

        let state = arena.allocate_zeroed(core.engine.encoder_state_size(channels))?;
        let mut encoder = core
            .engine
            .init_encoder(state, rate, channels, Application::Voip)
            .map_err(|e| {
                error!("Unable to init encoder: {}", e);
                AdapterError::invalid_argument(format!("encoder init failed: {}", e))
            })?;

        let mut controls = vec![
            EncoderControl::SetComplexity(core.tuning.complexity as i32),
            EncoderControl::SetSignal(core.tuning.signal),
        ];
        controls.extend(apply_incoming_modify(&params.enc_fmtp));
        for control in controls {
            if let Err(e) = encoder.control(control) {
                warn!("Encoder ignored {:?}: {}", control, e);
            }
        }

        let state = arena.allocate_zeroed(core.engine.decoder_state_size(channels))?;
        let decoder = core.engine.init_decoder(state, rate, channels).map_err(|e| {
            error!("Unable to init decoder: {}", e);
            AdapterError::invalid_argument(format!("decoder init failed: {}", e))
        })?;

        core.encoder = Some(encoder);
        core.decoder = Some(decoder);
        core.channels = channels;
        core.enc_ready = true;
        core.dec_ready = true;
        debug!(
            "Opened {} codec: {}Hz, {} channel(s), fmtp [{}]",
            core.engine.name(),
            rate,
            channels,
            params.enc_fmtp
        );
        Ok(())
    }

    /// Drop readiness; engine state stays in the arena
    pub fn close(&mut self) -> Result<()> {
        self.core.enc_ready = false;
        self.core.dec_ready = false;
        debug!("Closed codec instance in slot {}", self.slot);
        Ok(())
    }

    /// Parameters are not re-applied to a running codec
    pub fn modify(&mut self, _params: &CodecParameters) -> Result<()> {
        Ok(())
    }

    /// Split a packet into frames; Opus carries one frame per RTP payload
    pub fn parse(&self, packet: Bytes, timestamp: Timestamp) -> Vec<Frame> {
        vec![Frame::audio(packet, timestamp)]
    }

    /// Encode one PCM frame into a packet of at most `output_capacity` bytes
    pub fn encode(&mut self, input: &Frame, output_capacity: usize) -> Result<Frame> {
        let core = &mut *self.core;
        let encoder = match core.encoder.as_mut() {
            Some(encoder) if core.enc_ready => encoder,
            _ => return Err(AdapterError::invalid_state("encoder is not ready")),
        };

        let pcm = pcm_samples(&input.payload);
        let mut output = BytesMut::zeroed(output_capacity);
        let size = encoder.encode(&pcm, &mut output).map_err(|e| {
            error!("Encoder failed: {}", e);
            AdapterError::from(e)
        })?;
        output.truncate(size);

        trace!("Encoded {} samples into {} bytes", pcm.len(), size);
        Ok(Frame {
            frame_type: FrameType::Audio,
            payload: output.freeze(),
            timestamp: input.timestamp,
            samples: None,
        })
    }

    /// Decode one packet; failures come back as a `None` frame
    pub fn decode(&mut self, input: &Frame, output_capacity: usize) -> Frame {
        let core = &mut *self.core;
        let channels = core.channels as usize;
        let decoder = match core.decoder.as_mut() {
            Some(decoder) if core.dec_ready => decoder,
            _ => {
                debug!("Decode on a closed codec instance");
                return Frame::none();
            }
        };

        let mut pcm = vec![0i16; output_capacity / 2];
        match decoder.decode(Some(&input.payload[..]), &mut pcm, false) {
            Ok(0) => Frame::none(),
            Ok(samples) => {
                let total = (samples * channels).min(pcm.len());
                trace!("Decoded {} bytes into {} samples", input.payload.len(), samples);
                Frame::decoded(pcm_bytes(&pcm[..total]), samples, input.timestamp)
            }
            Err(e) => {
                error!("Decoder failed: {}", e);
                Frame::none()
            }
        }
    }

    /// Conceal one lost frame
    pub fn recover(&mut self, output_capacity: usize) -> Result<Frame> {
        let core = &mut *self.core;
        let channels = core.channels as usize;
        let decoder = match core.decoder.as_mut() {
            Some(decoder) if core.dec_ready => decoder,
            _ => return Err(AdapterError::invalid_state("decoder is not ready")),
        };

        let mut pcm = vec![0i16; output_capacity / 2];
        match decoder.decode(None, &mut pcm, false) {
            Ok(0) => Ok(Frame::none()),
            Ok(samples) => {
                let total = (samples * channels).min(pcm.len());
                debug!("Recovered {} samples", samples);
                Ok(Frame::decoded(pcm_bytes(&pcm[..total]), samples, None))
            }
            Err(e) => {
                error!("Concealment failed: {}", e);
                Err(AdapterError::invalid_argument(format!(
                    "packet loss concealment failed: {}",
                    e
                )))
            }
        }
    }
}

/// Read a payload as native-endian 16-bit samples; a trailing odd byte is ignored
fn pcm_samples(payload: &[u8]) -> Cow<'_, [i16]> {
    let even = &payload[..payload.len() & !1];
    match bytemuck::try_cast_slice::<u8, i16>(even) {
        Ok(samples) => Cow::Borrowed(samples),
        // Unaligned payload
        Err(_) => Cow::Owned(
            even.chunks_exact(2)
                .map(|b| i16::from_ne_bytes([b[0], b[1]]))
                .collect(),
        ),
    }
}

fn pcm_bytes(samples: &[i16]) -> Bytes {
    Bytes::copy_from_slice(bytemuck::cast_slice(samples))
}
