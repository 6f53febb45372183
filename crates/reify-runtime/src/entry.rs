//! Entry points called from generated code
//!
//! Generated code marks the constant it is about to read with
//! [`mark_in_flight`], makes a carrier ambient with [`enter`], and then calls
//! [`Runtime::resolve_ambient_constant`]. Both markers are thread-local.

use std::cell::RefCell;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use reify_core::{CoreError, FunctionRegistry, TypeDescriptor, Value};
use tracing::{debug, instrument, warn};

use crate::carrier::{Carrier, Instance};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::model::{ClassDef, ClassRef, ClassSpec, Location};
use crate::store::SpecializationStore;

thread_local! {
    static IN_FLIGHT: RefCell<Option<(TypeDescriptor, Arc<str>)>> = const { RefCell::new(None) };
    static AMBIENT: RefCell<Option<Arc<Carrier>>> = const { RefCell::new(None) };
}

/// Name the constant the next `resolve_ambient_constant` call on this thread
/// should produce.
pub fn mark_in_flight(class: &str, constant: &str) {
    IN_FLIGHT.with(|marker| {
        *marker.borrow_mut() = Some((TypeDescriptor::new(class), Arc::from(constant)));
    });
}

fn take_in_flight() -> Option<(TypeDescriptor, Arc<str>)> {
    IN_FLIGHT.with(|marker| marker.borrow_mut().take())
}

/// The carrier currently ambient on this thread.
pub fn current_carrier() -> Option<Arc<Carrier>> {
    AMBIENT.with(|ambient| ambient.borrow().clone())
}

/// Make `carrier` ambient until the guard drops. Guards nest.
pub fn enter(carrier: Arc<Carrier>) -> AmbientGuard {
    let previous = AMBIENT.with(|ambient| ambient.borrow_mut().replace(carrier));
    AmbientGuard { previous }
}

#[must_use = "the carrier stops being ambient when the guard is dropped"]
pub struct AmbientGuard {
    previous: Option<Arc<Carrier>>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        AMBIENT.with(|ambient| *ambient.borrow_mut() = previous);
    }
}

/// A class loader plus the store its classes specialize through.
pub struct Runtime {
    store: Arc<SpecializationStore>,
    classes: DashMap<TypeDescriptor, ClassRef>,
    functions: FunctionRegistry,
}

impl Runtime {
    /// A runtime with its own store.
    pub fn new(config: RuntimeConfig, functions: FunctionRegistry) -> Self {
        Self::with_store(Arc::new(SpecializationStore::new(config)), functions)
    }

    /// A runtime sharing the process-wide store.
    pub fn shared(functions: FunctionRegistry) -> Self {
        Self::with_store(SpecializationStore::global(), functions)
    }

    pub fn with_store(store: Arc<SpecializationStore>, functions: FunctionRegistry) -> Self {
        Self {
            store,
            classes: DashMap::new(),
            functions,
        }
    }

    pub fn store(&self) -> &SpecializationStore {
        &self.store
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Load a class. Its superclass must already be loaded; analysis errors
    /// reject the whole class.
    #[instrument(skip_all, fields(class = %spec.descriptor))]
    pub fn define_class(&self, spec: ClassSpec) -> Result<ClassRef> {
        let superclass = spec
            .superclass
            .as_deref()
            .map(|name| self.class(name))
            .transpose()?;

        let class = ClassDef::load(&spec, superclass).map_err(|e| {
            warn!(error = %e, "rejected class");
            e
        })?;

        match self.classes.entry(class.descriptor().clone()) {
            Entry::Occupied(_) => Err(RuntimeError::DuplicateClass {
                class: spec.descriptor,
            }),
            Entry::Vacant(slot) => {
                slot.insert(class.clone());
                debug!("defined class");
                Ok(class)
            }
        }
    }

    pub fn class(&self, descriptor: &str) -> Result<ClassRef> {
        self.classes
            .get(descriptor)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::unknown_class(descriptor))
    }

    /// Raw carrier creation: the carrier of `location` for `payload`.
    pub fn create_raw_carrier(
        &self,
        location: &Location,
        payload: Option<&Value>,
    ) -> Result<Arc<Carrier>> {
        self.store.resolve(location, payload)
    }

    /// Specialize a class by descriptor and create an instance of it.
    pub fn instantiate(&self, descriptor: &str, parameters: Option<&Value>) -> Result<Instance> {
        let class = self.class(descriptor)?;
        let carrier = self.store.resolve(&Location::class(&class), parameters)?;
        Ok(Instance::of(&carrier))
    }

    /// Resolve a `Linkage(Species)` request to the carrier it names.
    pub fn link(&self, request: &Value) -> Result<Arc<Carrier>> {
        let species = match request {
            Value::Linkage(inner) => inner.as_species(),
            _ => None,
        }
        .ok_or_else(|| {
            CoreError::linkage("linkage", &[request], "expected a linkage of a species")
        })?;

        let class = self.class(species.raw.as_str())?;
        self.store
            .resolve(&Location::class(&class), Some(&species.parameters))
    }

    /// The carrier of the supertype named `super_raw`, as seen from `carrier`.
    pub fn supertype_carrier(
        &self,
        carrier: &Arc<Carrier>,
        super_raw: &str,
    ) -> Result<Option<Arc<Carrier>>> {
        let ancestor = self.class(super_raw)?;
        self.store
            .supertype_carrier(carrier, &ancestor, &self.functions)
    }

    pub fn carrier_of(&self, instance: &Instance) -> Option<Arc<Carrier>> {
        self.store.carrier_of(instance)
    }

    /// Produce the value of the in-flight constant under the ambient carrier.
    ///
    /// Consumes the in-flight marker. Link-time constants need no carrier.
    pub fn resolve_ambient_constant(&self) -> Result<Value> {
        let (class, constant) = take_in_flight().ok_or(RuntimeError::NoConstantInFlight)?;
        let class = self.class(class.as_str())?;

        if !class.analysis().contains(&constant) {
            return Err(CoreError::UnresolvedReference {
                constant: class.descriptor().to_string(),
                reference: constant.to_string(),
            }
            .into());
        }

        if !class.analysis().needs_accessor(&constant) {
            return Ok(class.evaluate(&constant, &reify_core::Unbound, &self.functions)?);
        }

        let ambient = current_carrier().ok_or_else(|| RuntimeError::NoAmbientCarrier {
            constant: constant.to_string(),
        })?;
        let carrier = self.scoped_carrier(&class, &constant, &ambient)?;
        class.accessor_value(&constant, &carrier, &self.functions)
    }

    /// The carrier `constant` of `class` is read under, starting from
    /// `carrier`: itself when it belongs to the constant's carrier class,
    /// else that class's supertype carrier.
    pub(crate) fn scoped_carrier(
        &self,
        class: &ClassRef,
        constant: &str,
        carrier: &Arc<Carrier>,
    ) -> Result<Arc<Carrier>> {
        let Some(expected) = class.carrier_class(constant) else {
            return Ok(Arc::clone(carrier));
        };
        let found = carrier.class();
        if found.descriptor() == expected {
            return Ok(Arc::clone(carrier));
        }

        let mismatch = || RuntimeError::CarrierMismatch {
            constant: constant.to_string(),
            expected: expected.to_string(),
            found: found.descriptor().to_string(),
        };
        let ancestor = self.class(expected.as_str()).map_err(|_| mismatch())?;
        if !carrier.location().is_class_level() || found.distance_to(&ancestor).is_none() {
            return Err(mismatch());
        }
        self.store
            .supertype_carrier(carrier, &ancestor, &self.functions)?
            .ok_or_else(mismatch)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default(), FunctionRegistry::with_builtins())
    }
}
