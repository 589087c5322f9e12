//! libopus engine through the `opus` crate
//!
//! Only the controls the crate exposes are honoured (bitrate and in-band FEC).
//! The rest come back as `Unimplemented`, which the adapter logs and ignores.
//! libopus owns its own state, so the arena blocks handed in are only kept
//! for accounting.

use super::{
    Application, Bandwidth, DecoderEngine, EncoderControl, EncoderEngine, EncoderSettings,
    EngineError, EngineProvider, EngineResult,
};
use crate::arena::ArenaBlock;
use opus::{Bitrate, Channels};
use std::fmt;
use tracing::trace;

const DEFAULT_COMPLEXITY: i32 = 9;
const DEFAULT_BITRATE: i32 = 32000;
/// Nominal bookkeeping charge per channel
const STATE_BYTES_PER_CHANNEL: usize = 64;

fn engine_error(err: opus::Error) -> EngineError {
    EngineError::from_code(err.code() as i32)
}

fn channels_of(channels: u8) -> EngineResult<Channels> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        _ => Err(EngineError::BadArg),
    }
}

/// Native Opus engine provider
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOpus;

impl NativeOpus {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

impl EngineProvider for NativeOpus {
    fn name(&self) -> &'static str {
        "libopus"
    }

    fn encoder_state_size(&self, channels: u8) -> usize {
        STATE_BYTES_PER_CHANNEL * channels as usize
    }

    fn decoder_state_size(&self, channels: u8) -> usize {
        STATE_BYTES_PER_CHANNEL * channels as usize
    }

    fn init_encoder(
        &self,
        state: ArenaBlock,
        sample_rate: u32,
        channels: u8,
        application: Application,
    ) -> EngineResult<Box<dyn EncoderEngine>> {
        let mode = match application {
            Application::Voip => opus::Application::Voip,
        };
        let encoder = opus::Encoder::new(sample_rate, channels_of(channels)?, mode)
            .map_err(engine_error)?;
        trace!("libopus encoder init: {}Hz, {} ch", sample_rate, channels);
        Ok(Box::new(NativeEncoder {
            encoder,
            _state: state,
            settings: EncoderSettings {
                complexity: DEFAULT_COMPLEXITY,
                signal: None,
                inband_fec: 0,
                bitrate: DEFAULT_BITRATE,
                max_bandwidth: Bandwidth::Fullband,
                dtx: 0,
            },
        }))
    }

    fn init_decoder(
        &self,
        state: ArenaBlock,
        sample_rate: u32,
        channels: u8,
    ) -> EngineResult<Box<dyn DecoderEngine>> {
        let decoder =
            opus::Decoder::new(sample_rate, channels_of(channels)?).map_err(engine_error)?;
        Ok(Box::new(NativeDecoder {
            decoder,
            _state: state,
        }))
    }
}

struct NativeEncoder {
    encoder: opus::Encoder,
    _state: ArenaBlock,
    settings: EncoderSettings,
}

impl fmt::Debug for NativeEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEncoder")
            .field("settings", &self.settings)
            .finish()
    }
}

impl EncoderEngine for NativeEncoder {
    fn encode(&mut self, pcm: &[i16], output: &mut [u8]) -> EngineResult<usize> {
        self.encoder.encode(pcm, output).map_err(engine_error)
    }

    fn control(&mut self, request: EncoderControl) -> EngineResult<()> {
        match request {
            EncoderControl::SetBitrate(value) => {
                self.encoder
                    .set_bitrate(Bitrate::Bits(value))
                    .map_err(engine_error)?;
                self.settings.bitrate = value;
            }
            EncoderControl::SetInbandFec(value) => {
                if !(0..=1).contains(&value) {
                    return Err(EngineError::BadArg);
                }
                self.encoder
                    .set_inband_fec(value == 1)
                    .map_err(engine_error)?;
                self.settings.inband_fec = value;
            }
            EncoderControl::SetComplexity(_)
            | EncoderControl::SetSignal(_)
            | EncoderControl::SetMaxBandwidth(_)
            | EncoderControl::SetDtx(_) => return Err(EngineError::Unimplemented),
        }
        Ok(())
    }

    fn settings(&self) -> EncoderSettings {
        self.settings
    }
}

struct NativeDecoder {
    decoder: opus::Decoder,
    _state: ArenaBlock,
}

impl fmt::Debug for NativeDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDecoder").finish()
    }
}

impl DecoderEngine for NativeDecoder {
    fn decode(&mut self, packet: Option<&[u8]>, pcm: &mut [i16], fec: bool) -> EngineResult<usize> {
        // An empty packet asks libopus to conceal
        let packet = packet.unwrap_or(&[]);
        self.decoder.decode(packet, pcm, fec).map_err(engine_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn test_libopus_round_trip_and_controls() {
        let engine = NativeOpus::new();
        let arena = Arena::new("native", 1024, 1024, None);

        let block = arena.allocate_zeroed(engine.encoder_state_size(1)).unwrap();
        let mut encoder = engine.init_encoder(block, 48000, 1, Application::Voip).unwrap();
        assert_eq!(encoder.control(EncoderControl::SetBitrate(24000)), Ok(()));
        assert_eq!(encoder.settings().bitrate, 24000);
        assert_eq!(
            encoder.control(EncoderControl::SetDtx(1)),
            Err(EngineError::Unimplemented)
        );

        let block = arena.allocate_zeroed(engine.decoder_state_size(1)).unwrap();
        let mut decoder = engine.init_decoder(block, 48000, 1).unwrap();

        let pcm = vec![0i16; 960];
        let mut packet = vec![0u8; 1275];
        let len = encoder.encode(&pcm, &mut packet).unwrap();
        assert!(len > 0);

        let mut out = vec![0i16; 960];
        assert_eq!(decoder.decode(Some(&packet[..len]), &mut out, false), Ok(960));
        assert_eq!(decoder.decode(None, &mut out, false), Ok(960));
    }

    #[test]
    fn test_three_channels_are_rejected() {
        let block = Arena::new("native", 64, 64, None).allocate_zeroed(0).unwrap();
        assert!(matches!(
            NativeOpus::new().init_decoder(block, 48000, 3),
            Err(EngineError::BadArg)
        ));
    }
}
