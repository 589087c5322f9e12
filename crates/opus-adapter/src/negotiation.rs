//! Parameter negotiation
//!
//! Maps between [`CodecParameters`] and the Opus fmtp vocabulary of RFC 7587:
//! building the defaults and the advertisement sent to the peer, and turning
//! the peer's request into an encoder control.

use crate::engine::{Bandwidth, EncoderControl};
use crate::types::{CodecDescriptor, CodecParameters, FmtpParams};
use tracing::{debug, trace};

/// `useinbandfec` fmtp parameter
pub const FMTP_USE_INBAND_FEC: &str = "useinbandfec";
/// `maxaveragebitrate` fmtp parameter
pub const FMTP_MAX_AVERAGE_BITRATE: &str = "maxaveragebitrate";
/// `maxcodedaudiobandwidth` fmtp parameter
pub const FMTP_MAX_CODED_AUDIO_BANDWIDTH: &str = "maxcodedaudiobandwidth";
/// `usedtx` fmtp parameter
pub const FMTP_USE_DTX: &str = "usedtx";
/// `stereo` fmtp parameter
pub const FMTP_STEREO: &str = "stereo";

/// Lowest bitrate accepted from `maxaveragebitrate`
pub const MIN_NEGOTIATED_BITRATE: u32 = 6000;
/// Highest bitrate accepted from `maxaveragebitrate`
pub const MAX_NEGOTIATED_BITRATE: u32 = 510000;

/// Default frame duration in milliseconds
pub const DEFAULT_FRAME_MS: u16 = 10;

// Voice mode bitrates per sample rate (RFC 6716):
//   8 kHz: 6-20 kbit/s, 12 kHz: 7-25, 16 kHz: 8-30, 24 kHz: 18-28, 48 kHz: 24-32
const DEFAULT_CLOCK_RATE: u32 = 16000;
const DEFAULT_AVG_BITRATE: u32 = 20000;
const DEFAULT_MAX_BITRATE: u32 = 32000;

/// Default attributes for a descriptor
///
/// Mono at 16 kHz with FEC on and DTX off; the payload type comes from the
/// descriptor. The advertisement is derived from these values.
pub fn default_parameters(descriptor: &CodecDescriptor) -> CodecParameters {
    let mut params = CodecParameters {
        // Opus defaults to mono
        channel_count: 1,
        clock_rate: DEFAULT_CLOCK_RATE,
        avg_bitrate: DEFAULT_AVG_BITRATE,
        max_bitrate: DEFAULT_MAX_BITRATE,
        frame_ms: DEFAULT_FRAME_MS,
        bits_per_sample: 16,
        frames_per_packet: 1,
        payload_type: descriptor.payload_type,
        plc: true,
        vad: false,
        enc_fmtp: FmtpParams::new(),
        dec_fmtp: FmtpParams::new(),
    };
    params.dec_fmtp = derive_advertised_parameters(&params);
    params
}

/// Build the fmtp advertisement for `params`
///
/// Rules fire in a fixed order and may repeat a name: a stereo session
/// advertises `stereo=1` twice, which peers tolerate.
pub fn derive_advertised_parameters(params: &CodecParameters) -> FmtpParams {
    let mut fmtp = FmtpParams::new();

    if !params.plc {
        fmtp.push(FMTP_USE_INBAND_FEC, "0");
    }
    if params.vad {
        fmtp.push(FMTP_USE_DTX, "1");
    }
    if params.channel_count == 2 {
        fmtp.push(FMTP_STEREO, "1");
    }
    if params.channel_count == 2 {
        fmtp.push(FMTP_STEREO, "1");
    }
    if params.clock_rate < 48000 {
        fmtp.push(FMTP_MAX_CODED_AUDIO_BANDWIDTH, params.clock_rate.to_string());
    }

    trace!("advertised fmtp: {}", fmtp);
    fmtp
}

/// Turn the peer's fmtp request into an encoder control
///
/// Only the first recognized parameter is considered; everything after it is
/// ignored. A recognized parameter with an unusable value (bitrate out of
/// range, bandwidth above 48 kHz) still ends the scan and yields `None`.
pub fn apply_incoming_modify(fmtp: &FmtpParams) -> Option<EncoderControl> {
    for param in fmtp {
        let name = param.name.as_str();
        let value = parse_unsigned(&param.value);

        if name.eq_ignore_ascii_case(FMTP_USE_INBAND_FEC) {
            return Some(EncoderControl::SetInbandFec(value as i32));
        }
        if name.eq_ignore_ascii_case(FMTP_MAX_AVERAGE_BITRATE) {
            if (MIN_NEGOTIATED_BITRATE as u64..=MAX_NEGOTIATED_BITRATE as u64).contains(&value) {
                return Some(EncoderControl::SetBitrate(value as i32));
            }
            debug!("ignoring maxaveragebitrate={} (out of range)", param.value);
            return None;
        }
        if name.eq_ignore_ascii_case(FMTP_MAX_CODED_AUDIO_BANDWIDTH) {
            let bandwidth = bandwidth_for(value);
            if bandwidth.is_none() {
                debug!("ignoring maxcodedaudiobandwidth={}", param.value);
            }
            return bandwidth.map(EncoderControl::SetMaxBandwidth);
        }
        if name.eq_ignore_ascii_case(FMTP_USE_DTX) {
            return Some(EncoderControl::SetDtx(value as i32));
        }
    }
    None
}

/// Bandwidth ceiling for a maximum coded sample rate
pub fn bandwidth_for(rate: u64) -> Option<Bandwidth> {
    match rate {
        0..=8000 => Some(Bandwidth::Narrowband),
        8001..=12000 => Some(Bandwidth::Mediumband),
        12001..=16000 => Some(Bandwidth::Wideband),
        16001..=24000 => Some(Bandwidth::Superwideband),
        24001..=48000 => Some(Bandwidth::Fullband),
        _ => None,
    }
}

/// Parse leading decimal digits; anything unparsable reads as zero
fn parse_unsigned(text: &str) -> u64 {
    text.trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| {
            acc.saturating_mul(10).saturating_add((d - b'0') as u64)
        })
}
