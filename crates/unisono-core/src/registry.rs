//! Generator registry for creation by string id.
//!
//! Extension discovery is an explicit registration step: whoever provides
//! a generator registers a factory and its metadata at startup, and hosts
//! create instances by id. No runtime type introspection is involved.

use crate::{AudioContext, Error, ParamSpec, Result, SoundGenerator};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Broad grouping used by hosts when listing generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorCategory {
    #[default]
    Synth,
    Sampler,
    Drum,
    Modular,
}

/// Metadata a generator provider registers alongside its factory.
#[derive(Debug, Clone)]
pub struct GeneratorInfo {
    pub id: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub category: GeneratorCategory,
    pub params: Vec<ParamSpec>,
}

/// Function that constructs a generator for a given audio format.
pub type GeneratorFactory =
    Arc<dyn Fn(&AudioContext) -> Arc<dyn SoundGenerator> + Send + Sync>;

struct Registered {
    info: GeneratorInfo,
    factory: GeneratorFactory,
}

/// Registry mapping generator ids to factories.
#[derive(Default)]
pub struct GeneratorRegistry {
    entries: RwLock<HashMap<String, Registered>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator factory under `info.id`.
    pub fn register(
        &self,
        info: GeneratorInfo,
        factory: impl Fn(&AudioContext) -> Arc<dyn SoundGenerator> + Send + Sync + 'static,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&info.id) {
            return Err(Error::DuplicateGenerator(info.id));
        }
        log::debug!("registering generator '{}'", info.id);
        entries.insert(
            info.id.clone(),
            Registered {
                info,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    /// Create a generator instance by id.
    pub fn create(&self, id: &str, context: &AudioContext) -> Result<Arc<dyn SoundGenerator>> {
        let entries = self.entries.read();
        let entry = entries
            .get(id)
            .ok_or_else(|| Error::UnknownGenerator(id.to_string()))?;
        Ok((entry.factory)(context))
    }

    /// Metadata for a registered generator.
    pub fn info(&self, id: &str) -> Option<GeneratorInfo> {
        self.entries.read().get(id).map(|e| e.info.clone())
    }

    /// Ids of all registered generators, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamSpec;

    struct NullGenerator;

    impl SoundGenerator for NullGenerator {
        fn note_on(&self, _note: u8, _velocity: u8) {}
        fn note_off(&self, _note: u8) {}
        fn all_notes_off(&self) {}
        fn set_parameter(&self, _name: &str, _value: f32) {}
        fn parameters(&self) -> &[ParamSpec] {
            &[]
        }
        fn render(&self, buffer: &mut [f32], offset: usize, count: usize) -> usize {
            buffer[offset..offset + count].fill(0.0);
            count
        }
    }

    fn null_info(id: &str) -> GeneratorInfo {
        GeneratorInfo {
            id: id.to_string(),
            name: "Null".to_string(),
            author: "test".to_string(),
            description: "renders silence".to_string(),
            category: GeneratorCategory::Synth,
            params: Vec::new(),
        }
    }

    #[test]
    fn test_register_and_create() {
        let registry = GeneratorRegistry::new();
        registry
            .register(null_info("null"), |_ctx| Arc::new(NullGenerator))
            .unwrap();

        let generator = registry.create("null", &AudioContext::default()).unwrap();
        let mut buf = vec![1.0f32; 64];
        assert_eq!(generator.render(&mut buf, 0, 64), 64);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_unknown_id() {
        let registry = GeneratorRegistry::new();
        assert!(matches!(
            registry.create("missing", &AudioContext::default()),
            Err(Error::UnknownGenerator(_))
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = GeneratorRegistry::new();
        registry
            .register(null_info("null"), |_ctx| Arc::new(NullGenerator))
            .unwrap();
        assert!(matches!(
            registry.register(null_info("null"), |_ctx| Arc::new(NullGenerator)),
            Err(Error::DuplicateGenerator(_))
        ));
    }
}
