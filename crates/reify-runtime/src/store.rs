//! The specialization store
//!
//! Maps (location, erased parameters) to one carrier for the life of the
//! store. Lookups are lock-free reads on a `DashMap`; a miss synthesizes a
//! candidate and inserts it through the entry API, so when threads race on
//! the same key exactly one candidate wins and the rest are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use reify_core::{CoreError, FunctionRegistry, Value};
use tracing::{debug, instrument, trace};

use crate::carrier::{Carrier, Instance};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::model::{ClassRef, Location};

static GLOBAL: Lazy<Arc<SpecializationStore>> =
    Lazy::new(|| Arc::new(SpecializationStore::new(RuntimeConfig::default())));

/// Reduce `requested` to the shape of `default`.
///
/// A list default is a positional vector: slot `i` keeps `requested[i]` when
/// that value is a specialization argument and takes `default[i]` otherwise.
/// The result always has the default's arity. A scalar default is a single
/// slot. Absent parameters erase to the default.
pub fn erase(requested: Option<&Value>, default: &Value) -> Value {
    let Some(requested) = requested else {
        return default.clone();
    };

    match default {
        Value::List(slots) => {
            let given = requested.as_list();
            Value::list(slots.iter().enumerate().map(|(i, fallback)| {
                match given.and_then(|g| g.get(i)) {
                    Some(value) if value.is_specialization_argument() => value.clone(),
                    _ => fallback.clone(),
                }
            }))
        }
        _ if requested.is_specialization_argument() => requested.clone(),
        _ => default.clone(),
    }
}

/// Point-in-time store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub lost_races: u64,
    pub carriers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    lost_races: AtomicU64,
}

#[derive(Debug)]
pub struct SpecializationStore {
    config: RuntimeConfig,
    carriers: DashMap<(Location, Value), Arc<Carrier>>,
    supers: DashMap<(u64, ClassRef), Arc<Carrier>>,
    backing_names: AtomicU64,
    counters: Counters,
}

impl SpecializationStore {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            carriers: DashMap::new(),
            supers: DashMap::new(),
            backing_names: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// The process-wide store.
    pub fn global() -> Arc<SpecializationStore> {
        Arc::clone(&*GLOBAL)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The carrier for `location` instantiated with `requested`.
    ///
    /// Equal (location, erased parameters) pairs always yield the same
    /// carrier instance.
    #[instrument(level = "debug", skip_all, fields(location = %location))]
    pub fn resolve(&self, location: &Location, requested: Option<&Value>) -> Result<Arc<Carrier>> {
        let default = location
            .defaults()
            .ok_or_else(|| RuntimeError::NotSpecializable {
                class: location.to_string(),
            })?;
        let key = (location.clone(), erase(requested, default));

        if let Some(hit) = self.carriers.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            if self.config.trace_cache_hits {
                trace!(carrier = hit.id(), parameters = %key.1, "specialization store hit");
            }
            return Ok(Arc::clone(hit.value()));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let candidate = Carrier::synthesize(location.clone(), key.1.clone(), self.backing_name(location));

        match self.carriers.entry(key) {
            Entry::Occupied(winner) => {
                self.counters.lost_races.fetch_add(1, Ordering::Relaxed);
                debug!(
                    discarded = candidate.id(),
                    winner = winner.get().id(),
                    "lost specialization race"
                );
                Ok(Arc::clone(winner.get()))
            }
            Entry::Vacant(slot) => {
                debug!(carrier = %candidate, "synthesized carrier");
                let inserted = slot.insert(candidate);
                Ok(Arc::clone(inserted.value()))
            }
        }
    }

    fn backing_name(&self, location: &Location) -> Option<String> {
        if !self.config.synthesize_backing_types || !location.is_class_level() {
            return None;
        }
        let n = self.backing_names.fetch_add(1, Ordering::Relaxed);
        Some(format!("{}$Carrier${}", location.owner().descriptor(), n))
    }

    /// Recover the carrier an instance was created for.
    pub fn carrier_of(&self, instance: &Instance) -> Option<Arc<Carrier>> {
        instance.carrier()
    }

    /// The carrier of `ancestor` as seen from the class-level `carrier`.
    ///
    /// Returns `None` when the ancestor is not specializable and no
    /// specialized class between them maps onto it.
    #[instrument(level = "debug", skip_all, fields(carrier = carrier.id(), ancestor = %ancestor))]
    pub fn supertype_carrier(
        &self,
        carrier: &Arc<Carrier>,
        ancestor: &ClassRef,
        functions: &FunctionRegistry,
    ) -> Result<Option<Arc<Carrier>>> {
        let class = carrier.class();
        let not_a_supertype = || RuntimeError::NotASupertype {
            class: class.descriptor().to_string(),
            ancestor: ancestor.descriptor().to_string(),
        };

        if !carrier.location().is_class_level() {
            return Err(not_a_supertype());
        }
        let distance = class.distance_to(ancestor).ok_or_else(not_a_supertype)?;
        if distance > self.config.max_supertype_depth {
            return Err(RuntimeError::SupertypeDepthExceeded {
                class: class.descriptor().to_string(),
                limit: self.config.max_supertype_depth,
            });
        }

        let mut current = Some(Arc::clone(carrier));
        let mut cursor = class.clone();
        for _ in 0..distance {
            let Some(superclass) = cursor.superclass().cloned() else {
                break;
            };
            current = match current {
                Some(sub) => self.direct_supertype(&sub, &superclass, functions)?,
                None if superclass.is_specializable() => {
                    Some(self.resolve(&Location::class(&superclass), None)?)
                }
                None => None,
            };
            cursor = superclass;
        }

        Ok(current)
    }

    /// One step up the hierarchy, memoized per subtype carrier.
    fn direct_supertype(
        &self,
        sub: &Arc<Carrier>,
        superclass: &ClassRef,
        functions: &FunctionRegistry,
    ) -> Result<Option<Arc<Carrier>>> {
        let key = (sub.id(), superclass.clone());
        if let Some(hit) = self.supers.get(&key) {
            return Ok(Some(Arc::clone(hit.value())));
        }

        let class = sub.class();
        let resolved = match class.analysis().super_mapping() {
            Some(constant) => {
                let mapping = class.accessor_value(constant, sub, functions)?;
                let species = mapping.as_species().ok_or_else(|| {
                    CoreError::linkage("super", &[&mapping], "supertype mapping must be a species")
                })?;
                if &species.raw != superclass.descriptor() {
                    return Err(RuntimeError::SupertypeMismatch {
                        class: class.descriptor().to_string(),
                        expected: superclass.descriptor().to_string(),
                        found: species.raw.to_string(),
                    });
                }
                Some(self.resolve(&Location::class(superclass), Some(&species.parameters))?)
            }
            None if superclass.is_specializable() => {
                Some(self.resolve(&Location::class(superclass), None)?)
            }
            None => None,
        };

        Ok(resolved.map(|found| {
            let winner = self.supers.entry(key).or_insert(found);
            Arc::clone(winner.value())
        }))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            lost_races: self.counters.lost_races.load(Ordering::Relaxed),
            carriers: self.carriers.len(),
        }
    }
}

impl Default for SpecializationStore {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
