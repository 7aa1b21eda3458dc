//! Compiler seam and the language context programs compile against.

use std::collections::BTreeMap;

use async_trait::async_trait;
use remote_exec_core::{LanguageConfig, SourceError};

use crate::{
    device_types::{DeviceType, InternalFunction},
    program::CompiledProgram,
};

/// Source files keyed by path.
pub type SourceFiles = BTreeMap<String, String>;

/// Language context for one connected device.
///
/// `errors` is shared across compile attempts and cleared before each one.
/// The device type is fixed for the context's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageContext {
    pub device_type: &'static DeviceType,
    pub config: LanguageConfig,
    pub errors: Vec<SourceError>,
}

impl LanguageContext {
    /// Context restricted to a device type's primitives.
    #[must_use]
    pub fn for_device(device_type: &'static DeviceType) -> Self {
        Self {
            device_type,
            config: device_type.language_config(),
            errors: Vec::new(),
        }
    }

    /// Call index of a device primitive.
    #[must_use]
    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.primitive(symbol).map(|(index, _)| index)
    }

    /// Call index and signature of a device primitive.
    #[must_use]
    pub fn primitive(&self, symbol: &str) -> Option<(usize, &'static InternalFunction)> {
        self.device_type.function(symbol)
    }

    /// Record a compile error.
    pub fn push_error(&mut self, error: SourceError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Source-to-bytecode compiler.
///
/// Implementations report problems by pushing onto `context.errors` and
/// returning `None`.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `files` starting at `entrypoint`.
    async fn compile(
        &self,
        files: &SourceFiles,
        entrypoint: &str,
        context: &mut LanguageContext,
    ) -> Option<CompiledProgram>;
}
