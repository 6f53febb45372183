//! Self-specializing call sites
//!
//! An [`InlineCache`] remembers one resolved target under a guard. A call
//! whose guard key matches goes straight to the target; any other key takes
//! the slow path, which resolves a fresh target and replaces the cached link
//! wholesale. Alternating between two keys therefore relinks on every switch.
//!
//! Two guard flavors are provided: carrier identity
//! ([`SpecializedCallSite`]) and receiver class ([`ReceiverCallSite`]).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use reify_core::{BoundFunction, CoreError, Unbound, Value};
use tracing::debug;

use crate::carrier::{Carrier, Instance, RuntimeClass};
use crate::entry::Runtime;
use crate::error::{Result, RuntimeError};
use crate::model::{ClassRef, Location};
use crate::restriction;

/// Key compared by a call site's guard.
pub trait GuardKey: Clone {
    fn matches(&self, other: &Self) -> bool;
}

impl GuardKey for Arc<Carrier> {
    fn matches(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// Receiver guard: the receiver's runtime class, plus its carrier field when
/// the class alone does not identify the carrier.
#[derive(Debug, Clone)]
pub struct ReceiverGuard {
    class: RuntimeClass,
    carrier: Option<Arc<Carrier>>,
}

impl ReceiverGuard {
    pub fn of(receiver: &Instance) -> Self {
        let class = receiver.runtime_class().clone();
        let carrier = match class {
            RuntimeClass::Raw(_) => receiver.carrier(),
            RuntimeClass::Backing(_) => None,
        };
        Self { class, carrier }
    }
}

impl GuardKey for ReceiverGuard {
    fn matches(&self, other: &Self) -> bool {
        self.class == other.class
            && match (&self.carrier, &other.carrier) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// How a resolved function is fitted to the call site's argument shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Adaptation {
    #[default]
    None,
    /// Prepend the carrier's class parameters.
    InsertCarrier,
    /// Prepend the carrier's method parameters.
    InsertMethodCarrier,
    /// Drop this many leading call-site arguments.
    DropLeading(usize),
}

/// A resolved, adapted call target.
#[derive(Debug, Clone)]
pub struct Target {
    function: BoundFunction,
    prefix: Vec<Value>,
    drop_leading: usize,
    restrictions: Vec<(usize, Value)>,
}

impl Target {
    /// Fit `function` to the call site. Inserting carrier parameters fails
    /// when `carrier` is absent or has none of the requested kind.
    pub fn adapt(
        function: BoundFunction,
        adaptation: Adaptation,
        carrier: Option<&Carrier>,
    ) -> Result<Self> {
        let parameters = |select: fn(&Carrier) -> Option<&Value>| {
            carrier.and_then(select).cloned().ok_or_else(|| {
                RuntimeError::MissingCarrierParameters {
                    adaptation: format!("{:?}", adaptation),
                }
            })
        };

        let (prefix, drop_leading) = match adaptation {
            Adaptation::None => (Vec::new(), 0),
            Adaptation::InsertCarrier => (vec![parameters(Carrier::class_parameters)?], 0),
            Adaptation::InsertMethodCarrier => (vec![parameters(Carrier::method_parameters)?], 0),
            Adaptation::DropLeading(n) => (Vec::new(), n),
        };

        Ok(Self {
            function,
            prefix,
            drop_leading,
            restrictions: Vec::new(),
        })
    }

    /// Check call-site argument `slot` against `restriction` on every call.
    pub fn restrict(mut self, slot: usize, restriction: Value) -> Self {
        self.restrictions.push((slot, restriction));
        self
    }

    pub fn function(&self) -> &BoundFunction {
        &self.function
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        for (slot, restriction) in &self.restrictions {
            let value = args
                .get(*slot)
                .ok_or(RuntimeError::MissingArgument { slot: *slot })?;
            restriction::check(restriction, *slot, value)?;
        }

        let args = args.get(self.drop_leading..).unwrap_or(&[]);
        let mut full = Vec::with_capacity(self.prefix.len() + args.len());
        full.extend(self.prefix.iter().cloned());
        full.extend_from_slice(args);
        Ok(self.function.invoke(&full)?)
    }
}

/// One guarded target.
#[derive(Debug)]
pub struct Link<K> {
    guard: K,
    target: Target,
}

impl<K> Link<K> {
    pub fn guard(&self) -> &K {
        &self.guard
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

/// A single-entry guarded cache owned by one call site.
#[derive(Debug)]
pub struct InlineCache<K> {
    cell: RwLock<Option<Arc<Link<K>>>>,
    relinks: AtomicUsize,
}

impl<K: GuardKey> InlineCache<K> {
    pub fn new() -> Self {
        Self {
            cell: RwLock::new(None),
            relinks: AtomicUsize::new(0),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Slow-path resolutions so far.
    pub fn relinks(&self) -> usize {
        self.relinks.load(Ordering::Relaxed)
    }

    /// The link for `key`, resolving and installing a new one on a guard
    /// miss. Concurrent misses may each resolve; the last install stays.
    pub fn link(&self, key: &K, resolve: impl FnOnce() -> Result<Target>) -> Result<Arc<Link<K>>> {
        let current = self
            .cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(link) = current.filter(|link| link.guard.matches(key)) {
            return Ok(link);
        }

        let target = resolve()?;
        let relinks = self.relinks.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(relinks, target = %target.function, "relinked call site");

        let link = Arc::new(Link {
            guard: key.clone(),
            target,
        });
        *self.cell.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&link));
        Ok(link)
    }

    pub fn invoke(
        &self,
        key: &K,
        args: &[Value],
        resolve: impl FnOnce() -> Result<Target>,
    ) -> Result<Value> {
        self.link(key, resolve)?.target.invoke(args)
    }
}

impl<K: GuardKey> Default for InlineCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_function(action: &str, value: Value) -> Result<BoundFunction> {
    match value {
        Value::Function(function) => Ok(function),
        other => Err(CoreError::linkage(
            action,
            &[&other],
            format!("call target must be a function, got {}", other.kind()),
        )
        .into()),
    }
}

/// Call site guarded on carrier identity. Its target is a function-valued
/// constant of `owner` evaluated under the carrier.
#[derive(Debug)]
pub struct SpecializedCallSite {
    owner: ClassRef,
    constant: String,
    adaptation: Adaptation,
    restrictions: Vec<(usize, String)>,
    cache: InlineCache<Arc<Carrier>>,
}

impl SpecializedCallSite {
    pub fn new(owner: &ClassRef, constant: impl Into<String>, adaptation: Adaptation) -> Self {
        Self {
            owner: owner.clone(),
            constant: constant.into(),
            adaptation,
            restrictions: Vec::new(),
            cache: InlineCache::new(),
        }
    }

    /// Check argument `slot` against the restriction held by `constant`.
    pub fn with_restriction(mut self, slot: usize, constant: impl Into<String>) -> Self {
        self.restrictions.push((slot, constant.into()));
        self
    }

    pub fn invoke(&self, runtime: &Runtime, carrier: &Arc<Carrier>, args: &[Value]) -> Result<Value> {
        self.cache
            .invoke(carrier, args, || self.resolve(runtime, carrier))
    }

    pub fn relinks(&self) -> usize {
        self.cache.relinks()
    }

    fn resolve(&self, runtime: &Runtime, carrier: &Arc<Carrier>) -> Result<Target> {
        let functions = runtime.functions();
        let scoped = runtime.scoped_carrier(&self.owner, &self.constant, carrier)?;
        let value = self
            .owner
            .accessor_value(&self.constant, &scoped, functions)?;
        let mut target = Target::adapt(
            expect_function(&self.constant, value)?,
            self.adaptation,
            Some(&scoped),
        )?;

        for (slot, constant) in &self.restrictions {
            let scoped = runtime.scoped_carrier(&self.owner, constant, carrier)?;
            let restriction = self.owner.accessor_value(constant, &scoped, functions)?;
            target = target.restrict(*slot, restriction);
        }
        Ok(target)
    }
}

/// Call site guarded on the receiver's runtime class. The method is looked
/// up on the receiver's class and its supertypes.
#[derive(Debug)]
pub struct ReceiverCallSite {
    method: String,
    adaptation: Adaptation,
    cache: InlineCache<ReceiverGuard>,
}

impl ReceiverCallSite {
    pub fn new(method: impl Into<String>, adaptation: Adaptation) -> Self {
        Self {
            method: method.into(),
            adaptation,
            cache: InlineCache::new(),
        }
    }

    pub fn invoke(&self, runtime: &Runtime, receiver: &Instance, args: &[Value]) -> Result<Value> {
        self.cache.invoke(&ReceiverGuard::of(receiver), args, || {
            self.resolve(runtime, receiver)
        })
    }

    pub fn relinks(&self) -> usize {
        self.cache.relinks()
    }

    fn resolve(&self, runtime: &Runtime, receiver: &Instance) -> Result<Target> {
        let class = receiver.class();
        let (declaring, method) =
            class
                .find_method(&self.method)
                .ok_or_else(|| RuntimeError::UnknownMethod {
                    class: class.descriptor().to_string(),
                    method: self.method.clone(),
                })?;

        let carrier = match runtime.carrier_of(receiver) {
            Some(own) if declaring != *class => {
                runtime
                    .store()
                    .supertype_carrier(&own, &declaring, runtime.functions())?
            }
            Some(own) => Some(own),
            None if declaring.is_specializable() => Some(
                runtime
                    .store()
                    .resolve(&Location::class(&declaring), None)?,
            ),
            None => None,
        };
        let carrier = match carrier {
            Some(carrier) => Some(runtime.scoped_carrier(
                &declaring,
                &method.implementation,
                &carrier,
            )?),
            None => None,
        };

        let value = match &carrier {
            Some(carrier) => {
                declaring.accessor_value(&method.implementation, carrier, runtime.functions())?
            }
            None => declaring.evaluate(&method.implementation, &Unbound, runtime.functions())?,
        };

        Target::adapt(
            expect_function(&method.implementation, value)?,
            self.adaptation,
            carrier.as_deref(),
        )
    }
}
