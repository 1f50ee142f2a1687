//! Client registry
//!
//! Maps each [`ProtocolGeneration`] to the library that serves it. Host
//! applications register one library per generation they ship; contexts and
//! resolvers look their dialect up here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::memory::{MemoryLibrary, MemoryServer};
use super::{Dialect, LibraryAdapter, SmbLibrary};
use crate::error::{Result, StatusError};
use crate::generation::ProtocolGeneration;

/// Generation to client library table
pub struct ClientRegistry {
    dialects: RwLock<HashMap<ProtocolGeneration, Arc<dyn Dialect>>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            dialects: RwLock::new(HashMap::new()),
        }
    }

    /// Registry serving every generation from one in-memory server
    pub fn with_memory_clients(server: Arc<MemoryServer>) -> Self {
        let registry = Self::new();
        for generation in ProtocolGeneration::ALL {
            registry.register_library(MemoryLibrary::new(generation, Arc::clone(&server)));
        }
        registry
    }

    /// Register a typed library under its own generation
    ///
    /// Returns the dialect previously registered for that generation.
    pub fn register_library<L: SmbLibrary>(&self, library: L) -> Option<Arc<dyn Dialect>> {
        self.register(Arc::new(LibraryAdapter::new(library)))
    }

    /// Register an already erased dialect
    pub fn register(&self, dialect: Arc<dyn Dialect>) -> Option<Arc<dyn Dialect>> {
        let generation = dialect.generation();
        debug!(%generation, "Registering client library");
        let mut dialects = self.dialects.write().unwrap_or_else(|e| e.into_inner());
        dialects.insert(generation, dialect)
    }

    /// Unregister a generation
    pub fn unregister(&self, generation: ProtocolGeneration) -> bool {
        let mut dialects = self.dialects.write().unwrap_or_else(|e| e.into_inner());
        dialects.remove(&generation).is_some()
    }

    /// Check if a generation has a library
    pub fn is_registered(&self, generation: ProtocolGeneration) -> bool {
        let dialects = self.dialects.read().unwrap_or_else(|e| e.into_inner());
        dialects.contains_key(&generation)
    }

    /// Registered generations, oldest first
    pub fn generations(&self) -> Vec<ProtocolGeneration> {
        let dialects = self.dialects.read().unwrap_or_else(|e| e.into_inner());
        let mut generations: Vec<_> = dialects.keys().copied().collect();
        generations.sort();
        generations
    }

    /// Dialect serving `generation`
    pub fn get(&self, generation: ProtocolGeneration) -> Result<Arc<dyn Dialect>> {
        let dialects = self.dialects.read().unwrap_or_else(|e| e.into_inner());
        dialects.get(&generation).cloned().ok_or_else(|| {
            StatusError::construction(format!("No client library registered for {}", generation))
                .with_generation(generation)
        })
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
