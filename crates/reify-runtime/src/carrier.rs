//! Carriers, backing types and instances
//!
//! A `Carrier` is the immutable specialization context of one
//! (location, erased parameters) pair. Class-level carriers may own a
//! synthesized `BackingType`: a nominal class minted only so an instance can
//! reach its carrier through its own runtime class. The backing type points
//! back at its carrier weakly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use reify_core::{AmbientScope, Value};

use crate::model::{ClassRef, Location};

static NEXT_CARRIER_ID: AtomicU64 = AtomicU64::new(1);

pub struct Carrier {
    id: u64,
    location: Location,
    class_parameters: Option<Value>,
    method_parameters: Option<Value>,
    backing: Option<Arc<BackingType>>,
}

impl Carrier {
    /// Build a candidate carrier. Method-level carriers take their class
    /// parameters from the location and `erased` as method parameters.
    pub(crate) fn synthesize(
        location: Location,
        erased: Value,
        backing_name: Option<String>,
    ) -> Arc<Self> {
        let (class_parameters, method_parameters) = match &location {
            Location::Class(_) => (Some(erased), None),
            Location::Method {
                class_parameters, ..
            } => (class_parameters.clone(), Some(erased)),
        };
        let raw = location.owner().clone();
        let id = NEXT_CARRIER_ID.fetch_add(1, Ordering::Relaxed);

        Arc::new_cyclic(|weak| Carrier {
            id,
            location,
            class_parameters,
            method_parameters,
            backing: backing_name.map(|name| {
                Arc::new(BackingType {
                    name,
                    raw,
                    carrier: weak.clone(),
                })
            }),
        })
    }

    /// Process-unique id, stable for the carrier's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn class(&self) -> &ClassRef {
        self.location.owner()
    }

    pub fn class_parameters(&self) -> Option<&Value> {
        self.class_parameters.as_ref()
    }

    pub fn method_parameters(&self) -> Option<&Value> {
        self.method_parameters.as_ref()
    }

    pub fn backing(&self) -> Option<&Arc<BackingType>> {
        self.backing.as_ref()
    }
}

impl AmbientScope for Carrier {
    fn class_parameters(&self) -> Option<&Value> {
        self.class_parameters.as_ref()
    }

    fn method_parameters(&self) -> Option<&Value> {
        self.method_parameters.as_ref()
    }
}

impl fmt::Debug for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Carrier")
            .field("id", &self.id)
            .field("location", &self.location.to_string())
            .field("class_parameters", &self.class_parameters)
            .field("method_parameters", &self.method_parameters)
            .field("backing", &self.backing.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "carrier#{} {}", self.id, self.location)?;
        if let Some(parameters) = &self.class_parameters {
            write!(f, " class={}", parameters)?;
        }
        if let Some(parameters) = &self.method_parameters {
            write!(f, " method={}", parameters)?;
        }
        Ok(())
    }
}

/// Loader-scoped nominal type bound to exactly one carrier.
pub struct BackingType {
    name: String,
    raw: ClassRef,
    carrier: Weak<Carrier>,
}

impl BackingType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw(&self) -> &ClassRef {
        &self.raw
    }

    pub fn carrier(&self) -> Option<Arc<Carrier>> {
        self.carrier.upgrade()
    }
}

impl fmt::Debug for BackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackingType({})", self.name)
    }
}

/// The class an instance reports at runtime.
#[derive(Debug, Clone)]
pub enum RuntimeClass {
    Raw(ClassRef),
    Backing(Arc<BackingType>),
}

impl RuntimeClass {
    pub fn raw(&self) -> &ClassRef {
        match self {
            RuntimeClass::Raw(class) => class,
            RuntimeClass::Backing(backing) => backing.raw(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RuntimeClass::Raw(class) => class.descriptor().as_str(),
            RuntimeClass::Backing(backing) => backing.name(),
        }
    }
}

impl PartialEq for RuntimeClass {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeClass::Raw(a), RuntimeClass::Raw(b)) => a == b,
            (RuntimeClass::Backing(a), RuntimeClass::Backing(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for RuntimeClass {}

/// An object of a loaded class.
#[derive(Debug, Clone)]
pub struct Instance {
    class: RuntimeClass,
    /// Set only when the carrier has no backing type to carry it.
    carrier: Option<Arc<Carrier>>,
}

impl Instance {
    /// A specialized instance of `carrier`'s class.
    pub fn of(carrier: &Arc<Carrier>) -> Self {
        match carrier.backing() {
            Some(backing) => Self {
                class: RuntimeClass::Backing(Arc::clone(backing)),
                carrier: None,
            },
            None => Self {
                class: RuntimeClass::Raw(carrier.class().clone()),
                carrier: Some(Arc::clone(carrier)),
            },
        }
    }

    /// An unspecialized instance.
    pub fn plain(class: &ClassRef) -> Self {
        Self {
            class: RuntimeClass::Raw(class.clone()),
            carrier: None,
        }
    }

    pub fn runtime_class(&self) -> &RuntimeClass {
        &self.class
    }

    pub fn class(&self) -> &ClassRef {
        self.class.raw()
    }

    /// The carrier this instance was created for, recovered through its
    /// runtime class or its carrier field.
    pub fn carrier(&self) -> Option<Arc<Carrier>> {
        match &self.class {
            RuntimeClass::Backing(backing) => backing.carrier(),
            RuntimeClass::Raw(_) => self.carrier.clone(),
        }
    }
}
