//! Core analysis and evaluation for reify's runtime specialization
//!
//! A rewritten class hands over its constant declarations and anchors. This
//! crate classifies those constants (link-time versus anchor-rooted), checks
//! the anchor nesting topology, and evaluates constants under the parameters
//! of one specialization.
//!
//! ```rust
//! use reify_core::{analyze, Anchor, AnchorTable, BoundParameters, ClassDecls, ConstantDecl,
//!     Evaluator, FunctionRegistry, Value};
//!
//! let decls = ClassDecls::new("Box")
//!     .with_anchor(Anchor::class("T"))
//!     .with_constant(ConstantDecl::parse("T", "anchor", &[]).unwrap())
//!     .with_constant(ConstantDecl::parse("elem", "list", &["&T"]).unwrap());
//! let analysis = analyze(&decls, &AnchorTable::default()).unwrap();
//! assert!(analysis.is_anchored("elem"));
//!
//! let functions = FunctionRegistry::with_builtins();
//! let scope = BoundParameters { class: Some(Value::ty("String")), method: None };
//! let value = Evaluator::new(&analysis, &functions, &scope).evaluate("elem").unwrap();
//! assert_eq!(value, Value::list([Value::ty("String")]));
//! ```

pub mod analyzer;
pub mod decl;
pub mod error;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod value;

pub use analyzer::{analyze, ClassAnalysis, RootClassification};
pub use decl::{Anchor, AnchorScope, AnchorTable, ClassDecls, ConstantDecl, Operand};
pub use error::{CoreError, Result};
pub use eval::{AmbientScope, BoundParameters, Evaluator, LinkCache, Unbound};
pub use expr::ConstantExpr;
pub use functions::{BoundFunction, FunctionRegistry, NativeFunction};
pub use value::{Species, TypeDescriptor, Value};
