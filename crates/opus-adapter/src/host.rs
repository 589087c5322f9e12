//! Host media framework surface
//!
//! The adapter plugs into a media endpoint that owns memory pools and a codec
//! manager. These traits describe the parts of the host it consumes and the
//! factory contract it exposes; [`LocalEndpoint`] and [`LocalCodecManager`]
//! are in-process implementations for applications without a larger host.

use crate::arena::Arena;
use crate::error::{AdapterError, Result};
use crate::instance::CodecInstance;
use crate::types::{CodecDescriptor, CodecParameters};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Codec factory contract registered with a [`CodecManager`]
pub trait CodecFactoryOps: Send + Sync + fmt::Debug {
    /// Factory name for diagnostics
    fn name(&self) -> &str;

    /// Check whether the factory can serve `descriptor`
    fn test_alloc(&self, descriptor: &CodecDescriptor) -> Result<()>;

    /// Default parameters for `descriptor`
    fn default_attr(&self, descriptor: &CodecDescriptor) -> Result<CodecParameters>;

    /// Descriptors this factory advertises, at most `max_count`
    fn enum_codecs(&self, max_count: usize) -> Result<Vec<CodecDescriptor>>;

    /// Check out a codec instance
    fn alloc_codec(&self, descriptor: &CodecDescriptor) -> Result<CodecInstance>;

    /// Return a codec instance
    fn dealloc_codec(&self, instance: CodecInstance) -> Result<()>;
}

/// Host registry of codec factories
pub trait CodecManager: Send + Sync {
    /// Register a factory
    fn register_factory(&self, factory: Arc<dyn CodecFactoryOps>) -> Result<()>;

    /// Remove a previously registered factory
    fn unregister_factory(&self, factory: &Arc<dyn CodecFactoryOps>) -> Result<()>;
}

/// Host media endpoint
pub trait MediaEndpoint: Send + Sync {
    /// Create a named arena; `None` when the host is out of memory
    fn create_pool(
        &self,
        name: &str,
        initial: usize,
        increment: usize,
        limit: Option<usize>,
    ) -> Option<Arc<Arena>>;

    /// The endpoint's codec manager, if it has one
    fn codec_manager(&self) -> Option<Arc<dyn CodecManager>>;
}

fn same_factory(a: &Arc<dyn CodecFactoryOps>, b: &Arc<dyn CodecFactoryOps>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// In-process codec manager
#[derive(Default)]
pub struct LocalCodecManager {
    factories: Mutex<Vec<Arc<dyn CodecFactoryOps>>>,
}

impl LocalCodecManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// First registered factory able to serve `descriptor`
    pub fn find_factory(&self, descriptor: &CodecDescriptor) -> Option<Arc<dyn CodecFactoryOps>> {
        self.factories
            .lock()
            .iter()
            .find(|f| f.test_alloc(descriptor).is_ok())
            .cloned()
    }

    /// Descriptors advertised by every registered factory
    pub fn enum_all(&self, max_per_factory: usize) -> Vec<CodecDescriptor> {
        let factories = self.factories.lock().clone();
        let mut codecs = Vec::new();
        for factory in factories {
            match factory.enum_codecs(max_per_factory) {
                Ok(mut found) => codecs.append(&mut found),
                Err(e) => warn!("Factory '{}' failed to enumerate: {}", factory.name(), e),
            }
        }
        codecs
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.lock().len()
    }

    /// Check if no factory is registered
    pub fn is_empty(&self) -> bool {
        self.factories.lock().is_empty()
    }
}

impl CodecManager for LocalCodecManager {
    fn register_factory(&self, factory: Arc<dyn CodecFactoryOps>) -> Result<()> {
        let mut factories = self.factories.lock();
        if factories.iter().any(|f| same_factory(f, &factory)) {
            return Err(AdapterError::registration_failed(format!(
                "factory '{}' already registered",
                factory.name()
            )));
        }
        debug!("Registered codec factory '{}'", factory.name());
        factories.push(factory);
        Ok(())
    }

    fn unregister_factory(&self, factory: &Arc<dyn CodecFactoryOps>) -> Result<()> {
        let mut factories = self.factories.lock();
        match factories.iter().position(|f| same_factory(f, factory)) {
            Some(index) => {
                factories.remove(index);
                debug!("Unregistered codec factory '{}'", factory.name());
                Ok(())
            }
            None => Err(AdapterError::registration_failed(format!(
                "factory '{}' is not registered",
                factory.name()
            ))),
        }
    }
}

impl fmt::Debug for LocalCodecManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCodecManager")
            .field("factories", &self.len())
            .finish()
    }
}

/// In-process media endpoint
#[derive(Debug, Default)]
pub struct LocalEndpoint {
    manager: Arc<LocalCodecManager>,
}

impl LocalEndpoint {
    /// Create an endpoint with an empty codec manager
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete codec manager
    pub fn manager(&self) -> &Arc<LocalCodecManager> {
        &self.manager
    }
}

impl MediaEndpoint for LocalEndpoint {
    fn create_pool(
        &self,
        name: &str,
        initial: usize,
        increment: usize,
        limit: Option<usize>,
    ) -> Option<Arc<Arena>> {
        Some(Arc::new(Arena::new(name, initial, increment, limit)))
    }

    fn codec_manager(&self) -> Option<Arc<dyn CodecManager>> {
        Some(self.manager.clone())
    }
}
