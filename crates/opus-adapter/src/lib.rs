//! # Opus Adapter: Opus codec plugin for the RVOIP media framework
//!
//! This crate exposes an Opus codec to a host media framework through the
//! framework's codec-factory contract. It decides which descriptors it can
//! serve, negotiates SDP format parameters (RFC 7587), pools codec instances
//! and runs each instance through its open/encode/decode/close lifecycle.
//!
//! ## Components
//!
//! - **Capability query** ([`capability`]): accepts `opus` at 8/12/16/24/48 kHz,
//!   advertises 48 kHz mono
//! - **Negotiation** ([`negotiation`]): default attributes, the fmtp
//!   advertisement and the encoder control requested by the peer
//! - **Factory** ([`OpusCodecFactory`]): arena-backed slot table with a
//!   free-list, registered with the host codec manager
//! - **Instances** ([`CodecInstance`]): per-call encoder/decoder state
//! - **Engines** ([`engine`]): the compression engine behind a trait, with a
//!   deterministic simulated engine built in
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_opus_adapter::{
//!     CodecDescriptor, CodecFactoryOps, Frame, LocalEndpoint, OpusCodecFactory, Timestamp,
//! };
//!
//! let factory = Arc::new(OpusCodecFactory::with_defaults());
//! factory.initialize(Arc::new(LocalEndpoint::new()))?;
//!
//! let descriptor = CodecDescriptor::audio("opus", 48000, 1, 111);
//! let mut params = factory.default_attr(&descriptor)?;
//! params.clock_rate = 48000;
//!
//! let mut codec = factory.alloc_codec(&descriptor)?;
//! codec.open(&params)?;
//!
//! // 10 ms at 48 kHz
//! let pcm = Frame::from_pcm(&[0i16; 480], Timestamp(0));
//! let packet = codec.encode(&pcm, 1275)?;
//! let decoded = codec.decode(&packet, 960);
//! assert!(decoded.is_audio());
//!
//! factory.dealloc_codec(codec)?;
//! factory.deinitialize()?;
//! # Ok::<(), rvoip_opus_adapter::AdapterError>(())
//! ```

#![warn(missing_docs)]

pub mod arena;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod host;
pub mod instance;
pub mod negotiation;
pub mod types;

// Re-export commonly used types and traits
pub use arena::{Arena, ArenaBlock};
pub use config::{AdapterConfig, PoolConfig};
pub use engine::{EngineError, EngineProvider, SimulatedOpus};
#[cfg(feature = "opus")]
pub use engine::NativeOpus;
pub use error::{AdapterError, ErrorCategory, Result, UnsupportedReason};
pub use factory::{OpusCodecFactory, PoolStats};
pub use host::{CodecFactoryOps, CodecManager, LocalCodecManager, LocalEndpoint, MediaEndpoint};
pub use instance::{CodecInstance, InstanceState};
pub use types::{
    CodecDescriptor, CodecParameters, FmtpParam, FmtpParams, Frame, FrameType, MediaType,
    Timestamp,
};

use tracing_subscriber::EnvFilter;

/// Version information for the adapter
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging for the adapter
///
/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG` (default
/// `info`). Safe to call more than once, and a no-op when the application
/// already installed a subscriber.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    tracing::info!("Opus adapter v{} initialized", VERSION);
    Ok(())
}

/// Get library information
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        encoding_name: types::OPUS_ENCODING_NAME,
        clock_rates: types::SUPPORTED_CLOCK_RATES.to_vec(),
        default_engine: SimulatedOpus::new().name(),
    }
}

/// Library information structure
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    /// Library version
    pub version: &'static str,
    /// Encoding name served by the factory
    pub encoding_name: &'static str,
    /// Clock rates accepted by the capability query
    pub clock_rates: Vec<u32>,
    /// Engine used by [`OpusCodecFactory::with_defaults`]
    pub default_engine: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
        // Second call must not fail even though a subscriber is installed
        assert!(init().is_ok());
    }

    #[test]
    fn test_info() {
        let info = info();
        assert_eq!(info.version, VERSION);
        assert_eq!(info.encoding_name, "opus");
        assert_eq!(info.clock_rates, vec![8000, 12000, 16000, 24000, 48000]);
        assert_eq!(info.default_engine, "opus-sim");
    }
}
