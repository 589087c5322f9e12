//! Opus Loopback Demo
//!
//! Registers the Opus factory with an in-process endpoint, negotiates a
//! stereo 48 kHz session, then pushes a tone through encode, packetization
//! and decode, concealing every fifth packet as if it had been lost.
//!
//! Run with `RUST_LOG=debug` to see the adapter's lifecycle logging.

use rvoip_opus_adapter::negotiation::derive_advertised_parameters;
use rvoip_opus_adapter::{
    init, AdapterError, CodecFactoryOps, Frame, LocalEndpoint, OpusCodecFactory, Timestamp,
};
use std::sync::Arc;

const CLOCK_RATE: u32 = 48000;
const CHANNELS: u8 = 2;
const FRAME_MS: u32 = 20;

fn tone(frame: u64) -> Vec<i16> {
    let samples = (CLOCK_RATE / 1000 * FRAME_MS) as usize;
    let mut pcm = Vec::with_capacity(samples * CHANNELS as usize);
    for i in 0..samples {
        let t = (frame as usize * samples + i) as f32 / CLOCK_RATE as f32;
        let s = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 12000.0) as i16;
        pcm.push(s);
        pcm.push(s / 2);
    }
    pcm
}

fn main() -> Result<(), AdapterError> {
    init()?;

    println!("🎧 Opus Loopback Demo");
    println!("=====================");

    let endpoint = Arc::new(LocalEndpoint::new());
    let factory = Arc::new(OpusCodecFactory::with_defaults());
    factory.initialize(endpoint.clone())?;
    println!("✅ Factory registered ({} factory)", endpoint.manager().len());

    let offered = factory.enum_codecs(4)?;
    println!("📋 Offering: {:?}", offered.iter().map(|c| c.to_string()).collect::<Vec<_>>());

    let descriptor = &offered[0];
    let mut params = factory.default_attr(descriptor)?;
    params.clock_rate = CLOCK_RATE;
    params.channel_count = CHANNELS;
    params.frame_ms = FRAME_MS as u16;
    params.vad = true;
    params.dec_fmtp = derive_advertised_parameters(&params);
    println!("📤 a=fmtp:{} {}", params.payload_type, params.dec_fmtp);

    // What the peer answered with
    params.enc_fmtp.push("maxaveragebitrate", "64000");
    println!("📥 peer fmtp: {}", params.enc_fmtp);

    let mut codec = factory.alloc_codec(descriptor)?;
    codec.init()?;
    codec.open(&params)?;
    if let Some(settings) = codec.encoder_settings() {
        println!("🔧 Encoder: {:?}", settings);
    }

    let pcm_bytes = params.pcm_frame_bytes();
    for frame in 0..10u64 {
        let ts = Timestamp(frame * (CLOCK_RATE / 1000 * FRAME_MS) as u64);
        let packet = codec.encode(&Frame::from_pcm(&tone(frame), ts), 1275)?;

        let decoded = if frame % 5 == 4 {
            codec.recover(pcm_bytes)?
        } else {
            let mut out = None;
            for parsed in codec.parse(packet.payload.clone(), ts) {
                out = Some(codec.decode(&parsed, pcm_bytes));
            }
            out.unwrap_or_else(Frame::none)
        };

        println!(
            "   frame {:2}: {:4} bytes -> {:?} {:5} samples (ts {:?})",
            frame,
            packet.size(),
            decoded.frame_type,
            decoded.size(),
            decoded.timestamp.map(|t| t.0)
        );
    }

    codec.close()?;
    factory.dealloc_codec(codec)?;
    factory.deinitialize()?;
    println!("✅ Done");
    Ok(())
}
