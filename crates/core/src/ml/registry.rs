//! Shared handle to the currently active model artifacts.

use std::sync::{Arc, RwLock};

use crate::ml::train::ArtifactSet;

/// Process-wide registry of trained artifacts. Installing a new set is an
/// atomic swap: in-flight predictions keep the Arc they already cloned,
/// later calls see the replacement.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<ArtifactSet>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, artifacts: ArtifactSet) {
        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(artifacts));
    }

    pub fn current(&self) -> Option<Arc<ArtifactSet>> {
        let guard = match self.current.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::FEATURE_NAMES;
    use crate::ml::scaler::RobustScaler;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn artifacts(trained_at: chrono::DateTime<Utc>) -> ArtifactSet {
        let rows = vec![vec![0.0; FEATURE_NAMES.len()], vec![1.0; FEATURE_NAMES.len()]];
        ArtifactSet {
            scaler: RobustScaler::fit(&rows).unwrap(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            models: BTreeMap::new(),
            trained_at,
        }
    }

    #[test]
    fn starts_empty_and_swaps_atomically() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_loaded());
        assert!(registry.current().is_none());

        let first = Utc::now();
        registry.install(artifacts(first));

        assert!(registry.is_loaded());
        let held = registry.current().unwrap();
        assert_eq!(held.trained_at, first);

        // A second install does not disturb the Arc handed out earlier.
        registry.install(artifacts(first + Duration::hours(1)));
        assert_eq!(held.trained_at, first);
        assert_eq!(
            registry.current().unwrap().trained_at,
            first + Duration::hours(1)
        );
    }
}
