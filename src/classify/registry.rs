use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::Classifier;

/// Classifier handle shared between the registry and the inference adapter.
///
/// `Mutex` because `Classifier::infer` takes `&mut self`.
pub type SharedClassifier = Arc<Mutex<dyn Classifier>>;

/// Backends the daemon can choose from, in registration order.
///
/// Selection order for `resolve(None)`: the backend named by `prefer`, then
/// the first one registered.
#[derive(Default)]
pub struct ClassifierRegistry {
    backends: Vec<(&'static str, SharedClassifier)>,
    preferred: Option<&'static str>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. Registering a second backend with the same name replaces
    /// the first one in place.
    pub fn register<C: Classifier + 'static>(&mut self, backend: C) {
        let name = backend.name();
        let shared: SharedClassifier = Arc::new(Mutex::new(backend));
        match self.backends.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = shared,
            None => self.backends.push((name, shared)),
        }
    }

    /// Make `name` the backend chosen when config names none.
    pub fn prefer(&mut self, name: &str) -> Result<()> {
        let name = self.lookup(name)?.0;
        self.preferred = Some(name);
        Ok(())
    }

    /// Registered backend names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|(name, _)| *name).collect()
    }

    /// The named backend, or the preferred/first one when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<SharedClassifier> {
        let chosen = match name.or(self.preferred) {
            Some(name) => self.lookup(name)?,
            None => self
                .backends
                .first()
                .ok_or_else(|| anyhow!("no classifier backend registered"))?,
        };
        log::debug!("ClassifierRegistry: using backend {}", chosen.0);
        Ok(chosen.1.clone())
    }

    fn lookup(&self, name: &str) -> Result<&(&'static str, SharedClassifier)> {
        self.backends
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| {
                anyhow!(
                    "classifier backend '{}' not registered (available: {})",
                    name,
                    self.names().join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burst::BurstTensor;
    use crate::classify::StubClassifier;

    struct Named(&'static str);

    impl Classifier for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn infer(&mut self, _tensor: &BurstTensor) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    fn chosen(registry: &ClassifierRegistry, name: Option<&str>) -> &'static str {
        let backend = registry.resolve(name).unwrap();
        let name = backend.lock().unwrap().name();
        name
    }

    #[test]
    fn first_registered_backend_is_chosen_by_default() {
        let mut registry = ClassifierRegistry::new();
        assert!(registry.resolve(None).is_err());

        registry.register(StubClassifier::new(3));
        registry.register(Named("onnx"));
        assert_eq!(chosen(&registry, None), "stub");
        assert_eq!(chosen(&registry, Some("onnx")), "onnx");
        assert_eq!(registry.names(), vec!["stub", "onnx"]);
    }

    #[test]
    fn preferred_backend_wins_over_registration_order() {
        let mut registry = ClassifierRegistry::new();
        registry.register(StubClassifier::new(3));
        registry.register(Named("onnx"));
        registry.prefer("onnx").unwrap();
        assert_eq!(chosen(&registry, None), "onnx");
        assert_eq!(chosen(&registry, Some("stub")), "stub");
    }

    #[test]
    fn re_registering_a_name_keeps_one_entry() {
        let mut registry = ClassifierRegistry::new();
        registry.register(Named("onnx"));
        registry.register(StubClassifier::new(3));
        registry.register(Named("onnx"));
        assert_eq!(registry.names(), vec!["onnx", "stub"]);
    }

    #[test]
    fn unknown_backend_names_are_rejected() {
        let mut registry = ClassifierRegistry::new();
        registry.register(StubClassifier::new(3));
        assert!(registry.prefer("tract").is_err());
        let err = registry.resolve(Some("tract")).err().unwrap();
        assert!(err.to_string().contains("available: stub"));
    }
}
