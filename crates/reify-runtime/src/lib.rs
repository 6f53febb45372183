//! Reify runtime
//!
//! Runtime half of reified generics:
//!
//! - **Specialization store**: one carrier per (location, erased parameters),
//!   shared process-wide and safe to race on
//! - **Carriers and backing types**: the specialization context of an
//!   instance, reachable through the instance's runtime class
//! - **Entry points**: what generated code calls to read ambient constants,
//!   create carriers and look up supertype carriers
//! - **Call sites**: guarded inline caches that relink on a guard miss
//!
//! # Example
//!
//! ```rust
//! use reify_core::{Anchor, ConstantDecl, Value};
//! use reify_runtime::{enter, mark_in_flight, ClassSpec, Runtime};
//!
//! let runtime = Runtime::default();
//! runtime
//!     .define_class(ClassSpec {
//!         defaults: vec!["Object".into()],
//!         anchors: vec![Anchor::class("T")],
//!         constants: vec![ConstantDecl::parse("T", "anchor", &[]).unwrap()],
//!         ..ClassSpec::new("Box")
//!     })
//!     .unwrap();
//!
//! let instance = runtime.instantiate("Box", Some(&Value::ty("String"))).unwrap();
//! let _ambient = enter(runtime.carrier_of(&instance).unwrap());
//! mark_in_flight("Box", "T");
//! assert_eq!(runtime.resolve_ambient_constant().unwrap(), Value::ty("String"));
//! ```

mod callsite;
mod carrier;
mod config;
mod constants;
mod entry;
mod error;
mod model;
mod restriction;
mod store;

pub use callsite::{
    Adaptation, GuardKey, InlineCache, Link, ReceiverCallSite, ReceiverGuard,
    SpecializedCallSite, Target,
};
pub use carrier::{BackingType, Carrier, Instance, RuntimeClass};
pub use config::RuntimeConfig;
pub use entry::{current_carrier, enter, mark_in_flight, AmbientGuard, Runtime};
pub use error::{Result, RuntimeError};
pub use model::{ClassDef, ClassRef, ClassSpec, ImportedAnchor, Location, MethodDef, MethodSpec};
pub use restriction::{check as check_restriction, runtime_type};
pub use store::{erase, SpecializationStore, StoreStats};
