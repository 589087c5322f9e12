//! Opus codec factory
//!
//! The factory owns a shared arena and a slot table of instance cores. Slots
//! are never freed individually: a returned instance goes onto a free-list and
//! the next allocation reuses it. Everything goes back to the host in one step
//! when the factory is deinitialized.

use crate::arena::Arena;
use crate::capability;
use crate::config::AdapterConfig;
use crate::engine::{EngineProvider, SimulatedOpus};
use crate::error::{AdapterError, Result};
use crate::host::{CodecFactoryOps, CodecManager, MediaEndpoint};
use crate::instance::{CodecInstance, EncoderTuning, InstanceCore};
use crate::negotiation;
use crate::types::{CodecDescriptor, CodecParameters};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Name of the factory-wide arena
pub const FACTORY_POOL_NAME: &str = "opus codecs";
/// Name of each instance's arena
pub const INSTANCE_POOL_NAME: &str = "opuscodec";

/// Slot table usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots ever carved from the factory arena
    pub slots: usize,
    /// Slots waiting on the free-list
    pub free: usize,
    /// Slots currently checked out
    pub checked_out: usize,
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct SlotTable {
    slots: Vec<Option<Box<InstanceCore>>>,
    /// Indices of returned slots; the last entry is reused first
    free: Vec<usize>,
}

struct FactoryState {
    /// Unique across every factory and initialization in the process
    generation: u64,
    endpoint: Arc<dyn MediaEndpoint>,
    manager: Arc<dyn CodecManager>,
    arena: Arc<Arena>,
    slots: Mutex<SlotTable>,
}

/// Opus codec factory
pub struct OpusCodecFactory {
    config: AdapterConfig,
    engine: Arc<dyn EngineProvider>,
    state: RwLock<Option<FactoryState>>,
}

impl OpusCodecFactory {
    /// Create a factory backed by `engine`
    pub fn new(config: AdapterConfig, engine: Arc<dyn EngineProvider>) -> Self {
        Self {
            config,
            engine,
            state: RwLock::new(None),
        }
    }

    /// Default configuration with the built-in simulated engine
    pub fn with_defaults() -> Self {
        Self::new(AdapterConfig::default(), Arc::new(SimulatedOpus::new()))
    }

    /// Adapter configuration
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Create the factory arena and register with the endpoint's codec manager
    ///
    /// Calling this on an initialized factory does nothing.
    pub fn initialize(self: &Arc<Self>, endpoint: Arc<dyn MediaEndpoint>) -> Result<()> {
        let mut state = self.state.write();
        if state.is_some() {
            debug!("Opus codec factory already initialized");
            return Ok(());
        }
        self.config.validate()?;

        let pool = &self.config.factory_pool;
        let arena = endpoint
            .create_pool(FACTORY_POOL_NAME, pool.initial, pool.increment, pool.limit)
            .ok_or_else(|| AdapterError::OutOfMemory {
                pool: FACTORY_POOL_NAME.to_string(),
                requested: pool.initial,
            })?;

        let manager = match endpoint.codec_manager() {
            Some(manager) => manager,
            None => {
                arena.release();
                return Err(AdapterError::invalid_state(
                    "media endpoint has no codec manager",
                ));
            }
        };

        let ops: Arc<dyn CodecFactoryOps> = self.clone();
        if let Err(e) = manager.register_factory(ops) {
            error!("Unable to register Opus codec factory: {}", e);
            arena.release();
            return Err(e);
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        *state = Some(FactoryState {
            generation,
            endpoint,
            manager,
            arena,
            slots: Mutex::new(SlotTable::default()),
        });
        info!("Opus codec factory initialized ({} engine)", self.engine.name());
        Ok(())
    }

    /// Unregister from the codec manager and release the factory arena
    ///
    /// Teardown always completes; an unregistration error is returned after it.
    pub fn deinitialize(self: &Arc<Self>) -> Result<()> {
        let state = self.state.write().take().ok_or(AdapterError::NotInitialized)?;

        let ops: Arc<dyn CodecFactoryOps> = self.clone();
        let unregistered = state.manager.unregister_factory(&ops);
        if let Err(e) = &unregistered {
            error!("Unable to unregister Opus codec factory: {}", e);
        }

        let FactoryState { arena, slots, .. } = state;
        drop(slots);
        arena.release();
        info!("Opus codec factory deinitialized");
        unregistered
    }

    /// Check if the factory is initialized
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Slot table usage
    pub fn pool_stats(&self) -> Result<PoolStats> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(AdapterError::NotInitialized)?;
        let table = state.slots.lock();
        let checked_out = table.slots.iter().filter(|s| s.is_none()).count();
        Ok(PoolStats {
            slots: table.slots.len(),
            free: table.free.len(),
            checked_out,
        })
    }

    /// Pop a recycled core, or carve a new slot from the factory arena
    fn checkout(&self, state: &FactoryState) -> Result<(usize, Box<InstanceCore>)> {
        let mut table = state.slots.lock();
        if let Some(slot) = table.free.pop() {
            if let Some(core) = table.slots.get_mut(slot).and_then(Option::take) {
                trace!("Reusing codec slot {}", slot);
                return Ok((slot, core));
            }
            error!("Free-list entry {} has no core", slot);
            return Err(AdapterError::InternalFailure {
                details: format!("free-list entry {} is empty", slot),
            });
        }

        state.arena.reserve(std::mem::size_of::<InstanceCore>())?;
        let core = Box::new(InstanceCore::new(
            self.engine.clone(),
            EncoderTuning::from(&self.config),
        ));
        table.slots.push(None);
        let slot = table.slots.len() - 1;
        trace!("Carved codec slot {}", slot);
        Ok((slot, core))
    }

    fn checkin(state: &FactoryState, slot: usize, core: Box<InstanceCore>) {
        let mut table = state.slots.lock();
        table.slots[slot] = Some(core);
        table.free.push(slot);
    }
}

impl CodecFactoryOps for OpusCodecFactory {
    fn name(&self) -> &str {
        "opus"
    }

    fn test_alloc(&self, descriptor: &CodecDescriptor) -> Result<()> {
        capability::test_alloc(descriptor)
    }

    fn default_attr(&self, descriptor: &CodecDescriptor) -> Result<CodecParameters> {
        Ok(negotiation::default_parameters(descriptor))
    }

    fn enum_codecs(&self, max_count: usize) -> Result<Vec<CodecDescriptor>> {
        capability::enum_codecs(max_count, self.config.payload_type)
    }

    fn alloc_codec(&self, descriptor: &CodecDescriptor) -> Result<CodecInstance> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(AdapterError::NotInitialized)?;

        let (slot, mut core) = self.checkout(state)?;

        let pool = &self.config.instance_pool;
        let arena = match state.endpoint.create_pool(
            INSTANCE_POOL_NAME,
            pool.initial,
            pool.increment,
            pool.limit,
        ) {
            Some(arena) => arena,
            None => {
                Self::checkin(state, slot, core);
                return Err(AdapterError::OutOfMemory {
                    pool: INSTANCE_POOL_NAME.to_string(),
                    requested: pool.initial,
                });
            }
        };
        core.attach(arena);

        debug!("Allocated {} codec in slot {}", descriptor, slot);
        Ok(CodecInstance::new(slot, state.generation, core))
    }

    fn dealloc_codec(&self, instance: CodecInstance) -> Result<()> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(AdapterError::NotInitialized)?;

        let mut instance = instance;
        if instance.is_open() {
            instance.close()?;
        }

        let (slot, generation, mut core) = instance.into_parts();
        let owned = generation == state.generation
            && matches!(state.slots.lock().slots.get(slot), Some(None));
        if !owned {
            warn!("Rejecting codec instance from slot {} of another factory", slot);
            core.detach();
            return Err(AdapterError::invalid_argument(format!(
                "codec instance in slot {} does not belong to this factory",
                slot
            )));
        }

        core.detach();
        Self::checkin(state, slot, core);
        debug!("Returned codec slot {}", slot);
        Ok(())
    }
}

impl fmt::Debug for OpusCodecFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpusCodecFactory")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
