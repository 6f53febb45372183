//! Per-class constant caches
//!
//! Link-time constants are evaluated once per class and shared by every
//! carrier. Anchor-rooted constants get one slot per (carrier, constant).
//! Both maps keep the first inserted value when evaluations race.

use std::sync::Arc;

use dashmap::DashMap;
use reify_core::{AmbientScope, ClassAnalysis, Evaluator, FunctionRegistry, LinkCache, Value};
use tracing::trace;

use crate::carrier::Carrier;

#[derive(Debug, Default)]
pub(crate) struct LinkConstants(DashMap<Arc<str>, Value>);

impl LinkCache for LinkConstants {
    fn get(&self, constant: &str) -> Option<Value> {
        self.0.get(constant).map(|entry| entry.value().clone())
    }

    fn put(&self, constant: &str, value: Value) {
        self.0.entry(Arc::from(constant)).or_insert(value);
    }
}

#[derive(Debug, Default)]
pub(crate) struct ClassConstants {
    link: LinkConstants,
    accessors: DashMap<(u64, Arc<str>), Value>,
}

impl ClassConstants {
    pub(crate) fn evaluate(
        &self,
        analysis: &ClassAnalysis,
        functions: &FunctionRegistry,
        scope: &dyn AmbientScope,
        constant: &str,
    ) -> reify_core::Result<Value> {
        Evaluator::new(analysis, functions, scope)
            .with_link_cache(&self.link)
            .evaluate(constant)
    }

    pub(crate) fn accessor(
        &self,
        analysis: &ClassAnalysis,
        functions: &FunctionRegistry,
        carrier: &Carrier,
        constant: &str,
    ) -> reify_core::Result<Value> {
        let key = (carrier.id(), Arc::from(constant));
        if let Some(hit) = self.accessors.get(&key) {
            trace!(constant, carrier = carrier.id(), "accessor cache hit");
            return Ok(hit.value().clone());
        }

        let value = self.evaluate(analysis, functions, carrier, constant)?;
        let winner = self.accessors.entry(key).or_insert(value);
        Ok(winner.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn link_len(&self) -> usize {
        self.link.0.len()
    }

    #[cfg(test)]
    pub(crate) fn accessor_len(&self) -> usize {
        self.accessors.len()
    }
}
