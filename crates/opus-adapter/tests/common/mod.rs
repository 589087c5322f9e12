//! Shared helpers for the integration tests
//!
//! - `ScriptedEngine`: an engine whose results are set by the test
//! - `TestEndpoint`: a media endpoint that records the pools it hands out and
//!   can be told to refuse pools or to have no codec manager
//! - `RefusingManager`: a codec manager that rejects every registration

#![allow(dead_code)]

use parking_lot::Mutex;
use rvoip_opus_adapter::arena::{Arena, ArenaBlock};
use rvoip_opus_adapter::engine::{
    Application, Bandwidth, DecoderEngine, EncoderControl, EncoderEngine, EncoderSettings,
    EngineError, EngineProvider, EngineResult,
};
use rvoip_opus_adapter::{
    AdapterError, CodecFactoryOps, CodecManager, LocalCodecManager, MediaEndpoint, Result,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// What the scripted engine will do next
#[derive(Debug, Default)]
pub struct Script {
    pub encoder_init: Option<EngineError>,
    pub decoder_init: Option<EngineError>,
    /// `None` echoes the input length, capped by the output buffer
    pub encode_result: Option<EngineResult<usize>>,
    /// Consumed front to back; an empty queue decodes nothing
    pub decode_results: VecDeque<EngineResult<usize>>,
    pub reject_controls: bool,
    pub controls: Vec<EncoderControl>,
    /// Packet length seen by each decode call, `None` for concealment
    pub decode_calls: Vec<Option<usize>>,
}

/// Engine provider driven by a [`Script`]
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_encoder_init(&self, error: EngineError) {
        self.script.lock().encoder_init = Some(error);
    }

    pub fn fail_decoder_init(&self, error: EngineError) {
        self.script.lock().decoder_init = Some(error);
    }

    pub fn set_encode_result(&self, result: EngineResult<usize>) {
        self.script.lock().encode_result = Some(result);
    }

    pub fn push_decode_result(&self, result: EngineResult<usize>) {
        self.script.lock().decode_results.push_back(result);
    }

    pub fn reject_controls(&self) {
        self.script.lock().reject_controls = true;
    }

    pub fn controls(&self) -> Vec<EncoderControl> {
        self.script.lock().controls.clone()
    }

    pub fn decode_calls(&self) -> Vec<Option<usize>> {
        self.script.lock().decode_calls.clone()
    }
}

impl EngineProvider for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn encoder_state_size(&self, channels: u8) -> usize {
        32 * channels as usize
    }

    fn decoder_state_size(&self, channels: u8) -> usize {
        16 * channels as usize
    }

    fn init_encoder(
        &self,
        _state: ArenaBlock,
        _sample_rate: u32,
        _channels: u8,
        _application: Application,
    ) -> EngineResult<Box<dyn EncoderEngine>> {
        if let Some(error) = self.script.lock().encoder_init {
            return Err(error);
        }
        Ok(Box::new(ScriptedEncoder {
            script: self.script.clone(),
            settings: EncoderSettings {
                complexity: 9,
                signal: None,
                inband_fec: 0,
                bitrate: 32000,
                max_bandwidth: Bandwidth::Fullband,
                dtx: 0,
            },
        }))
    }

    fn init_decoder(
        &self,
        _state: ArenaBlock,
        _sample_rate: u32,
        channels: u8,
    ) -> EngineResult<Box<dyn DecoderEngine>> {
        if let Some(error) = self.script.lock().decoder_init {
            return Err(error);
        }
        Ok(Box::new(ScriptedDecoder {
            script: self.script.clone(),
            channels: channels as usize,
        }))
    }
}

#[derive(Debug)]
struct ScriptedEncoder {
    script: Arc<Mutex<Script>>,
    settings: EncoderSettings,
}

impl EncoderEngine for ScriptedEncoder {
    fn encode(&mut self, pcm: &[i16], output: &mut [u8]) -> EngineResult<usize> {
        let result = self
            .script
            .lock()
            .encode_result
            .unwrap_or(Ok(pcm.len().min(output.len())));
        let size = result?;
        let size = size.min(output.len());
        output[..size].fill(0xAA);
        Ok(size)
    }

    fn control(&mut self, request: EncoderControl) -> EngineResult<()> {
        let mut script = self.script.lock();
        script.controls.push(request);
        if script.reject_controls {
            return Err(EngineError::Unimplemented);
        }
        match request {
            EncoderControl::SetComplexity(v) => self.settings.complexity = v,
            EncoderControl::SetSignal(s) => self.settings.signal = Some(s),
            EncoderControl::SetInbandFec(v) => self.settings.inband_fec = v,
            EncoderControl::SetBitrate(v) => self.settings.bitrate = v,
            EncoderControl::SetMaxBandwidth(b) => self.settings.max_bandwidth = b,
            EncoderControl::SetDtx(v) => self.settings.dtx = v,
        }
        Ok(())
    }

    fn settings(&self) -> EncoderSettings {
        self.settings
    }
}

#[derive(Debug)]
struct ScriptedDecoder {
    script: Arc<Mutex<Script>>,
    channels: usize,
}

impl DecoderEngine for ScriptedDecoder {
    fn decode(&mut self, packet: Option<&[u8]>, pcm: &mut [i16], _fec: bool) -> EngineResult<usize> {
        let mut script = self.script.lock();
        script.decode_calls.push(packet.map(<[u8]>::len));
        let samples = script.decode_results.pop_front().unwrap_or(Ok(0))?;
        let values = (samples * self.channels).min(pcm.len());
        pcm[..values].fill(7);
        Ok(samples)
    }
}

/// Media endpoint with switchable failures
pub struct TestEndpoint {
    manager: Option<Arc<dyn CodecManager>>,
    refused_pools: Vec<String>,
    pools: Mutex<Vec<Arc<Arena>>>,
}

impl TestEndpoint {
    /// Endpoint backed by a fresh [`LocalCodecManager`]
    pub fn new() -> (Arc<Self>, Arc<LocalCodecManager>) {
        let manager = Arc::new(LocalCodecManager::new());
        let shared: Arc<dyn CodecManager> = manager.clone();
        let endpoint = Arc::new(Self::with_manager(Some(shared)));
        (endpoint, manager)
    }

    pub fn with_manager(manager: Option<Arc<dyn CodecManager>>) -> Self {
        Self {
            manager,
            refused_pools: Vec::new(),
            pools: Mutex::new(Vec::new()),
        }
    }

    /// Return `None` whenever a pool with `name` is requested
    pub fn refuse_pool(mut self, name: &str) -> Self {
        self.refused_pools.push(name.to_string());
        self
    }

    /// Every pool created so far named `name`
    pub fn pools_named(&self, name: &str) -> Vec<Arc<Arena>> {
        self.pools
            .lock()
            .iter()
            .filter(|p| p.name() == name)
            .cloned()
            .collect()
    }
}

impl MediaEndpoint for TestEndpoint {
    fn create_pool(
        &self,
        name: &str,
        initial: usize,
        increment: usize,
        limit: Option<usize>,
    ) -> Option<Arc<Arena>> {
        if self.refused_pools.iter().any(|n| n == name) {
            return None;
        }
        let pool = Arc::new(Arena::new(name, initial, increment, limit));
        self.pools.lock().push(pool.clone());
        Some(pool)
    }

    fn codec_manager(&self) -> Option<Arc<dyn CodecManager>> {
        self.manager.clone()
    }
}

/// Codec manager that refuses every factory
pub struct RefusingManager;

impl CodecManager for RefusingManager {
    fn register_factory(&self, factory: Arc<dyn CodecFactoryOps>) -> Result<()> {
        Err(AdapterError::registration_failed(format!(
            "'{}' refused by test manager",
            factory.name()
        )))
    }

    fn unregister_factory(&self, _factory: &Arc<dyn CodecFactoryOps>) -> Result<()> {
        Err(AdapterError::registration_failed("nothing registered"))
    }
}

/// Interleaved silence for one frame of `ms` milliseconds
pub fn silence(clock_rate: u32, channels: u8, ms: u32) -> Vec<i16> {
    vec![0i16; (clock_rate / 1000 * ms) as usize * channels as usize]
}
