//! Simulated Opus engine
//!
//! A deterministic stand-in for libopus so the adapter can run end-to-end
//! without a native library. It honours the same contract as the real engine
//! (frame durations, buffer limits, control ranges, error codes, concealment)
//! but its packets are a crude decimated 8-bit representation:
//!
//! ```text
//! byte 0     : 0xB0 | flags (bit0 stereo, bit1 silence, bit2 fec)
//! byte 1     : frame duration in 2.5 ms units (1, 2, 4, 8, 16, 24)
//! bytes 2..4 : kept samples per channel, big endian
//! bytes 4..  : kept * channels signed high bytes, interleaved
//! ```
//!
//! The layout is private to this module and may change.

use super::{
    Application, Bandwidth, DecoderEngine, EncoderControl, EncoderEngine, EncoderSettings,
    EngineError, EngineProvider, EngineResult,
};
use crate::arena::ArenaBlock;
use crate::types::SUPPORTED_CLOCK_RATES;
use tracing::trace;

const MAGIC: u8 = 0xB0;
const MAGIC_MASK: u8 = 0xF0;
const FLAG_STEREO: u8 = 0x01;
const FLAG_SILENCE: u8 = 0x02;
const FLAG_FEC: u8 = 0x04;

const HEADER_LEN: usize = 4;
const MAX_PACKET: usize = 1275;
/// 60 ms at 48 kHz
const MAX_FRAME_SAMPLES: usize = 2880;
/// Frame durations in 2.5 ms units
const DURATION_CODES: [u32; 6] = [1, 2, 4, 8, 16, 24];

const DEFAULT_COMPLEXITY: i32 = 9;
const DEFAULT_BITRATE: i32 = 32000;
const MIN_BITRATE: i32 = 500;
const MAX_BITRATE: i32 = 512000;

/// Simulated Opus engine provider
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedOpus;

impl SimulatedOpus {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

fn check_format(sample_rate: u32, channels: u8) -> EngineResult<()> {
    if !SUPPORTED_CLOCK_RATES.contains(&sample_rate) || !(1..=2).contains(&channels) {
        return Err(EngineError::BadArg);
    }
    Ok(())
}

/// Duration code for `frame` samples per channel at `sample_rate`
fn duration_code(frame: usize, sample_rate: u32) -> Option<u8> {
    let scaled = frame as u64 * 400;
    DURATION_CODES
        .iter()
        .find(|&&code| scaled == sample_rate as u64 * code as u64)
        .map(|&code| code as u8)
}

impl EngineProvider for SimulatedOpus {
    fn name(&self) -> &'static str {
        "opus-sim"
    }

    fn encoder_state_size(&self, channels: u8) -> usize {
        MAX_PACKET + 64 * channels as usize
    }

    fn decoder_state_size(&self, channels: u8) -> usize {
        MAX_FRAME_SAMPLES * channels as usize * 2
    }

    fn init_encoder(
        &self,
        state: ArenaBlock,
        sample_rate: u32,
        channels: u8,
        application: Application,
    ) -> EngineResult<Box<dyn EncoderEngine>> {
        check_format(sample_rate, channels)?;
        if state.len() < self.encoder_state_size(channels) {
            return Err(EngineError::AllocFail);
        }
        trace!(
            "sim encoder init: {}Hz, {} ch, {:?}",
            sample_rate,
            channels,
            application
        );
        Ok(Box::new(SimEncoder {
            sample_rate,
            channels: channels as usize,
            scratch: state,
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
        check_format(sample_rate, channels)?;
        if state.len() < self.decoder_state_size(channels) {
            return Err(EngineError::AllocFail);
        }
        Ok(Box::new(SimDecoder {
            sample_rate,
            channels: channels as usize,
            history: state,
            last_frame: 0,
        }))
    }
}

#[derive(Debug)]
struct SimEncoder {
    sample_rate: u32,
    channels: usize,
    scratch: ArenaBlock,
    settings: EncoderSettings,
}

impl EncoderEngine for SimEncoder {
    fn encode(&mut self, pcm: &[i16], output: &mut [u8]) -> EngineResult<usize> {
        let ch = self.channels;
        if pcm.is_empty() || pcm.len() % ch != 0 {
            return Err(EngineError::BadArg);
        }
        let frame = pcm.len() / ch;
        let code = duration_code(frame, self.sample_rate).ok_or(EngineError::BadArg)?;
        if output.len() < HEADER_LEN {
            return Err(EngineError::BufferTooSmall);
        }

        let mut flags = MAGIC;
        if ch == 2 {
            flags |= FLAG_STEREO;
        }
        if self.settings.inband_fec != 0 {
            flags |= FLAG_FEC;
        }

        let silent = self.settings.dtx != 0 && pcm.iter().all(|&s| s == 0);
        let kept = if silent {
            flags |= FLAG_SILENCE;
            0
        } else {
            let budget = (self.settings.bitrate as i64 * frame as i64
                / self.sample_rate as i64
                / 8) as usize;
            let budget = budget
                .clamp(ch, MAX_PACKET - HEADER_LEN)
                .min(output.len() - HEADER_LEN);
            if budget < ch {
                return Err(EngineError::BufferTooSmall);
            }
            (budget / ch).min(frame)
        };

        let scratch = &mut self.scratch[..];
        scratch[0] = flags;
        scratch[1] = code;
        scratch[2..4].copy_from_slice(&(kept as u16).to_be_bytes());
        let mut len = HEADER_LEN;
        for k in 0..kept {
            let src = k * frame / kept;
            for c in 0..ch {
                scratch[len] = (pcm[src * ch + c] >> 8) as i8 as u8;
                len += 1;
            }
        }

        output[..len].copy_from_slice(&scratch[..len]);
        Ok(len)
    }

    fn control(&mut self, request: EncoderControl) -> EngineResult<()> {
        match request {
            EncoderControl::SetComplexity(value) => {
                if !(0..=10).contains(&value) {
                    return Err(EngineError::BadArg);
                }
                self.settings.complexity = value;
            }
            EncoderControl::SetSignal(signal) => self.settings.signal = Some(signal),
            EncoderControl::SetInbandFec(value) => {
                if !(0..=1).contains(&value) {
                    return Err(EngineError::BadArg);
                }
                self.settings.inband_fec = value;
            }
            EncoderControl::SetBitrate(value) => {
                if !(MIN_BITRATE..=MAX_BITRATE).contains(&value) {
                    return Err(EngineError::BadArg);
                }
                self.settings.bitrate = value;
            }
            EncoderControl::SetMaxBandwidth(bandwidth) => self.settings.max_bandwidth = bandwidth,
            EncoderControl::SetDtx(value) => {
                if !(0..=1).contains(&value) {
                    return Err(EngineError::BadArg);
                }
                self.settings.dtx = value;
            }
        }
        Ok(())
    }

    fn settings(&self) -> EncoderSettings {
        self.settings
    }
}

#[derive(Debug)]
struct SimDecoder {
    sample_rate: u32,
    channels: usize,
    /// Last decoded frame as little-endian PCM, used for concealment
    history: ArenaBlock,
    last_frame: usize,
}

impl SimDecoder {
    fn remember(&mut self, pcm: &[i16]) {
        for (slot, sample) in self.history.chunks_exact_mut(2).zip(pcm) {
            slot.copy_from_slice(&sample.to_le_bytes());
        }
    }

    fn conceal(&mut self, pcm: &mut [i16]) -> EngineResult<usize> {
        let frame = self.last_frame;
        if frame == 0 {
            return Ok(0);
        }
        let values = frame * self.channels;
        if pcm.len() < values {
            return Err(EngineError::BufferTooSmall);
        }
        for (out, slot) in pcm[..values].iter_mut().zip(self.history.chunks_exact(2)) {
            *out = i16::from_le_bytes([slot[0], slot[1]]) / 2;
        }
        self.remember(&pcm[..values]);
        Ok(frame)
    }
}

impl DecoderEngine for SimDecoder {
    fn decode(&mut self, packet: Option<&[u8]>, pcm: &mut [i16], fec: bool) -> EngineResult<usize> {
        let packet = match packet {
            Some(p) if !p.is_empty() => p,
            _ => return self.conceal(pcm),
        };
        if packet.len() < HEADER_LEN || packet[0] & MAGIC_MASK != MAGIC {
            return Err(EngineError::InvalidPacket);
        }

        let flags = packet[0];
        if fec && flags & FLAG_FEC == 0 {
            // No redundancy carried: fall back to concealment
            return self.conceal(pcm);
        }

        let code = packet[1] as u32;
        if !DURATION_CODES.contains(&code) {
            return Err(EngineError::InvalidPacket);
        }
        let kept = u16::from_be_bytes([packet[2], packet[3]]) as usize;
        let pkt_ch = if flags & FLAG_STEREO != 0 { 2 } else { 1 };
        let silent = flags & FLAG_SILENCE != 0;
        let payload = &packet[HEADER_LEN..];
        if (silent && kept != 0) || (!silent && kept == 0) || payload.len() != kept * pkt_ch {
            return Err(EngineError::InvalidPacket);
        }

        let ch = self.channels;
        let frame = (self.sample_rate * code / 400) as usize;
        let values = frame * ch;
        if pcm.len() < values {
            return Err(EngineError::BufferTooSmall);
        }

        let sample_at = |k: usize, c: usize| (payload[k * pkt_ch + c] as i8 as i16) << 8;
        for j in 0..frame {
            let k = j * kept / frame;
            for c in 0..ch {
                pcm[j * ch + c] = if silent {
                    0
                } else if pkt_ch == ch {
                    sample_at(k, c)
                } else if pkt_ch == 2 {
                    ((sample_at(k, 0) as i32 + sample_at(k, 1) as i32) / 2) as i16
                } else {
                    sample_at(k, 0)
                };
            }
        }

        self.remember(&pcm[..values]);
        self.last_frame = frame;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn encoder(rate: u32, channels: u8) -> Box<dyn EncoderEngine> {
        let engine = SimulatedOpus::new();
        let arena = Arena::new("test", 4096, 4096, None);
        let block = arena.allocate_zeroed(engine.encoder_state_size(channels)).unwrap();
        engine.init_encoder(block, rate, channels, Application::Voip).unwrap()
    }

    fn decoder(rate: u32, channels: u8) -> Box<dyn DecoderEngine> {
        let engine = SimulatedOpus::new();
        let arena = Arena::new("test", 16384, 4096, None);
        let block = arena.allocate_zeroed(engine.decoder_state_size(channels)).unwrap();
        engine.init_decoder(block, rate, channels).unwrap()
    }

    fn tone(samples: usize, channels: usize) -> Vec<i16> {
        (0..samples * channels)
            .map(|i| (((i / channels) as f32 * 0.05).sin() * 12000.0) as i16)
            .collect()
    }

    #[test]
    fn test_rejects_unsupported_format() {
        let engine = SimulatedOpus::new();
        let block = Arena::new("t", 4096, 0, None).allocate_zeroed(2048).unwrap();
        let err = engine
            .init_encoder(block, 44100, 1, Application::Voip)
            .unwrap_err();
        assert_eq!(err, EngineError::BadArg);
    }

    #[test]
    fn test_rejects_undersized_state() {
        let engine = SimulatedOpus::new();
        let block = Arena::new("t", 16, 0, None).allocate_zeroed(16).unwrap();
        assert_eq!(
            engine.init_decoder(block, 16000, 1).unwrap_err(),
            EngineError::AllocFail
        );
    }

    #[test]
    fn test_frame_duration_validation() {
        let mut enc = encoder(16000, 1);
        let mut out = [0u8; 512];
        assert!(enc.encode(&[0i16; 160], &mut out).is_ok());
        assert_eq!(enc.encode(&[0i16; 161], &mut out), Err(EngineError::BadArg));
        assert_eq!(enc.encode(&[], &mut out), Err(EngineError::BadArg));
    }

    #[test]
    fn test_small_output_buffer() {
        let mut enc = encoder(48000, 2);
        let mut out = [0u8; 3];
        assert_eq!(
            enc.encode(&[0i16; 960], &mut out),
            Err(EngineError::BufferTooSmall)
        );
    }

    #[test]
    fn test_packet_respects_bitrate() {
        let mut enc = encoder(16000, 1);
        enc.control(EncoderControl::SetBitrate(8000)).unwrap();
        let mut out = [0u8; 1500];
        // 20 ms at 8 kbit/s -> 20 bytes
        let len = enc.encode(&tone(320, 1), &mut out).unwrap();
        assert_eq!(len, HEADER_LEN + 20);
    }

    #[test]
    fn test_dtx_silence_packet() {
        let mut enc = encoder(8000, 1);
        enc.control(EncoderControl::SetDtx(1)).unwrap();
        let mut out = [0u8; 256];
        let len = enc.encode(&[0i16; 160], &mut out).unwrap();
        assert_eq!(len, HEADER_LEN);

        let mut dec = decoder(8000, 1);
        let mut pcm = [1i16; 160];
        assert_eq!(dec.decode(Some(&out[..len]), &mut pcm, false), Ok(160));
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_decode_restores_frame_length() {
        let mut enc = encoder(24000, 2);
        let mut dec = decoder(24000, 2);
        let mut out = [0u8; 1500];
        let len = enc.encode(&tone(480, 2), &mut out).unwrap();
        let mut pcm = vec![0i16; 960];
        assert_eq!(dec.decode(Some(&out[..len]), &mut pcm, false), Ok(480));
    }

    #[test]
    fn test_stereo_packet_into_mono_decoder() {
        let mut enc = encoder(48000, 2);
        let mut dec = decoder(48000, 1);
        let mut out = [0u8; 1500];
        let len = enc.encode(&tone(960, 2), &mut out).unwrap();
        let mut pcm = vec![0i16; 960];
        assert_eq!(dec.decode(Some(&out[..len]), &mut pcm, false), Ok(960));
    }

    #[test]
    fn test_corrupt_packet() {
        let mut dec = decoder(16000, 1);
        let mut pcm = [0i16; 320];
        assert_eq!(
            dec.decode(Some(&[0x12u8, 0x34, 0x56][..]), &mut pcm, false),
            Err(EngineError::InvalidPacket)
        );
        assert_eq!(
            dec.decode(Some(&[MAGIC, 4, 0, 9, 1, 2][..]), &mut pcm, false),
            Err(EngineError::InvalidPacket)
        );
    }

    #[test]
    fn test_concealment() {
        let mut dec = decoder(16000, 1);
        let mut pcm = [0i16; 320];
        // Nothing decoded yet, nothing to conceal
        assert_eq!(dec.decode(None, &mut pcm, false), Ok(0));

        let mut enc = encoder(16000, 1);
        let mut out = [0u8; 512];
        let len = enc.encode(&tone(160, 1), &mut out).unwrap();
        assert_eq!(dec.decode(Some(&out[..len]), &mut pcm, false), Ok(160));
        assert_eq!(dec.decode(None, &mut pcm, false), Ok(160));
        assert_eq!(dec.decode(Some(&[][..]), &mut pcm[..100], false), Err(EngineError::BufferTooSmall));
    }

    #[test]
    fn test_control_ranges() {
        let mut enc = encoder(16000, 1);
        assert_eq!(enc.control(EncoderControl::SetComplexity(11)), Err(EngineError::BadArg));
        assert_eq!(enc.control(EncoderControl::SetInbandFec(2)), Err(EngineError::BadArg));
        assert_eq!(enc.control(EncoderControl::SetBitrate(100)), Err(EngineError::BadArg));
        assert_eq!(enc.control(EncoderControl::SetDtx(-1)), Err(EngineError::BadArg));
        enc.control(EncoderControl::SetMaxBandwidth(Bandwidth::Wideband)).unwrap();
        enc.control(EncoderControl::SetComplexity(2)).unwrap();
        let settings = enc.settings();
        assert_eq!(settings.max_bandwidth, Bandwidth::Wideband);
        assert_eq!(settings.complexity, 2);
    }
}
