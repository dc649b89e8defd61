//! Processor registry: a mapping from `processor_type` string to handler.
//!
//! Registration is idempotent only in the sense that re-registering the same
//! type is rejected, not silently replaced — a collision almost always means
//! two processors were wired up for the same document family by mistake.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use nf_common::{Envelope, NotificationDraft, NotifyError, Result};
use thiserror::Error;
use tracing::info;

use crate::Processor;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a processor is already registered for type '{0}'")]
    DuplicateRegistration(String),
}

#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn Processor>) -> std::result::Result<(), RegistryError> {
        let key = processor.processor_type().to_string();
        if self.processors.contains_key(&key) {
            return Err(RegistryError::DuplicateRegistration(key));
        }
        self.processors.insert(key, processor);
        Ok(())
    }

    pub fn known_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.processors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get(&self, processor_type: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(processor_type).cloned()
    }

    /// Dispatch algorithm from the Processor Registry component: lookup,
    /// validate, transform, process, all wrapped with trace context on
    /// failure.
    pub fn dispatch(&self, envelope: Envelope) -> Result<Vec<NotificationDraft>> {
        let trace_id = envelope.trace_id.clone();
        let user_id = envelope.request.user_id.clone();
        let subscription_id = envelope.request.subscription_id.clone();
        let processor_type = envelope.processor_type.to_string();

        info!(
            trace_id = %trace_id,
            user_id = %user_id,
            subscription_id = %subscription_id,
            processor_type = %processor_type,
            "dispatching envelope to processor"
        );

        let processor = self.get(&processor_type).ok_or_else(|| {
            NotifyError::UnknownProcessor(processor_type.clone(), self.known_types())
        })?;

        if !processor.validate(&envelope) {
            return Err(NotifyError::ProcessorValidation(format!(
                "processor '{processor_type}' rejected envelope (trace={trace_id})"
            )));
        }

        let started = Instant::now();
        let transformed = processor.transform(envelope);
        let drafts = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            processor.process(&transformed)
        }))
        .map_err(|_| NotifyError::ProcessorExecution {
            trace_id: trace_id.clone(),
            source: anyhow::anyhow!("processor '{processor_type}' panicked"),
        })?;
        let elapsed = started.elapsed();

        info!(
            trace_id = %trace_id,
            processor_type = %processor_type,
            drafts = drafts.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "processor finished"
        );

        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoeProcessor, RealEstateProcessor};

    #[test]
    fn rejects_duplicate_registration() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(BoeProcessor)).unwrap();
        let err = registry.register(Arc::new(BoeProcessor)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRegistration(_)));
    }

    #[test]
    fn known_types_are_sorted() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(RealEstateProcessor)).unwrap();
        registry.register(Arc::new(BoeProcessor)).unwrap();
        assert_eq!(registry.known_types(), vec!["boe".to_string(), "real-estate".to_string()]);
    }
}
