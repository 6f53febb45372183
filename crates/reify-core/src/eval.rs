//! Constant expression evaluation (the bootstrap protocol)
//!
//! An `Evaluator` runs one evaluation pass over a class's analyzed constants
//! under one ambient scope. Within the pass every constant is evaluated at
//! most once. Across passes only constants classified as link-time
//! constants may be reused, through an optional `LinkCache`; anything rooted
//! at an anchor is recomputed for each scope.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use tracing::trace;

use crate::analyzer::ClassAnalysis;
use crate::decl::{AnchorScope, Operand};
use crate::error::{CoreError, Result};
use crate::expr::ConstantExpr;
use crate::functions::FunctionRegistry;
use crate::value::{TypeDescriptor, Value};

/// The parameters currently bound for anchor dereference.
pub trait AmbientScope {
    fn class_parameters(&self) -> Option<&Value>;

    fn method_parameters(&self) -> Option<&Value>;
}

/// Link-time scope: no anchor is bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

impl AmbientScope for Unbound {
    fn class_parameters(&self) -> Option<&Value> {
        None
    }

    fn method_parameters(&self) -> Option<&Value> {
        None
    }
}

/// Explicit parameters, for evaluating without a store-produced carrier.
#[derive(Debug, Clone, Default)]
pub struct BoundParameters {
    pub class: Option<Value>,
    pub method: Option<Value>,
}

impl AmbientScope for BoundParameters {
    fn class_parameters(&self) -> Option<&Value> {
        self.class.as_ref()
    }

    fn method_parameters(&self) -> Option<&Value> {
        self.method.as_ref()
    }
}

/// Storage for link-time constant values shared across evaluation passes.
pub trait LinkCache {
    fn get(&self, constant: &str) -> Option<Value>;

    fn put(&self, constant: &str, value: Value);
}

pub struct Evaluator<'a> {
    analysis: &'a ClassAnalysis,
    functions: &'a FunctionRegistry,
    scope: &'a dyn AmbientScope,
    link_cache: Option<&'a dyn LinkCache>,
    memo: HashMap<NodeIndex, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        analysis: &'a ClassAnalysis,
        functions: &'a FunctionRegistry,
        scope: &'a dyn AmbientScope,
    ) -> Self {
        Self {
            analysis,
            functions,
            scope,
            link_cache: None,
            memo: HashMap::new(),
        }
    }

    pub fn with_link_cache(mut self, cache: &'a dyn LinkCache) -> Self {
        self.link_cache = Some(cache);
        self
    }

    /// Evaluate `constant` and whatever it depends on.
    pub fn evaluate(&mut self, constant: &str) -> Result<Value> {
        let root = self
            .analysis
            .node(constant)
            .ok_or_else(|| CoreError::UnresolvedReference {
                constant: self.analysis.class().to_string(),
                reference: constant.to_string(),
            })?;

        if let Some(value) = self.memo.get(&root) {
            return Ok(value.clone());
        }

        for idx in self.analysis.evaluation_plan(root) {
            if self.memo.contains_key(&idx) {
                continue;
            }

            let link_time = !self.analysis.root_at(idx).is_anchor();
            let name = self.analysis.name_of(idx);

            if link_time {
                if let Some(value) = self.link_cache.and_then(|cache| cache.get(name)) {
                    self.memo.insert(idx, value);
                    continue;
                }
            }

            let value = self.eval_node(idx)?;
            trace!(constant = %name, %value, "evaluated constant");

            if link_time {
                if let Some(cache) = self.link_cache {
                    cache.put(name, value.clone());
                }
            }
            self.memo.insert(idx, value);
        }

        Ok(self.memo[&root].clone())
    }

    fn eval_node(&self, idx: NodeIndex) -> Result<Value> {
        let expr = self.analysis.expr_at(idx);
        let action = expr.action();

        match expr {
            ConstantExpr::Literal(value) => Ok(value.clone()),
            ConstantExpr::TypeRef(descriptor) => Ok(Value::Type(descriptor.clone())),
            ConstantExpr::List(items) => {
                let values = items
                    .iter()
                    .map(|op| self.operand(action, op))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            ConstantExpr::ListGet { list, index } => {
                let list = self.operand(action, list)?;
                let index = self.operand(action, index)?;
                match (&list, &index) {
                    (Value::List(items), Value::Int(i)) => usize::try_from(*i)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or_else(|| {
                            CoreError::linkage(action, &[list.clone(), index.clone()], "index out of range")
                        }),
                    _ => Err(CoreError::linkage(
                        action,
                        &[list.clone(), index.clone()],
                        format!("expected list and int, got {} and {}", list.kind(), index.kind()),
                    )),
                }
            }
            ConstantExpr::SpeciesMake { raw, parameters } => {
                let raw = self.operand(action, raw)?;
                let parameters = self.operand(action, parameters)?;
                match raw {
                    Value::Type(descriptor) => Ok(Value::species(descriptor, parameters)),
                    other => Err(CoreError::linkage(
                        action,
                        &[other.clone(), parameters],
                        format!("species raw type must be a type, got {}", other.kind()),
                    )),
                }
            }
            ConstantExpr::SpeciesRaw(operand) => {
                let species = self.species_operand(action, operand)?;
                Ok(Value::Type(species.raw.clone()))
            }
            ConstantExpr::SpeciesParams(operand) => {
                let species = self.species_operand(action, operand)?;
                Ok(species.parameters.clone())
            }
            ConstantExpr::Linkage(operand) => Ok(Value::linkage(self.operand(action, operand)?)),
            ConstantExpr::MethodHandleRef { function, bound } => {
                let base = self.function(action, function)?;
                let bound = bound
                    .iter()
                    .map(|op| self.operand(action, op))
                    .collect::<Result<Vec<_>>>()?;
                if bound.len() > base.remaining_arity() {
                    return Err(CoreError::linkage(
                        action,
                        &bound,
                        format!(
                            "cannot bind {} argument(s) to '{}' of arity {}",
                            bound.len(),
                            function,
                            base.remaining_arity()
                        ),
                    ));
                }
                Ok(Value::Function(base.bind_trailing(bound)))
            }
            ConstantExpr::Restriction(items) => {
                let mut types: Vec<TypeDescriptor> = Vec::with_capacity(items.len());
                for op in items {
                    match self.operand(action, op)? {
                        Value::Type(t) => types.push(t),
                        other => {
                            return Err(CoreError::linkage(
                                action,
                                &[other.clone()],
                                format!("restriction entries must be types, got {}", other.kind()),
                            ))
                        }
                    }
                }
                Ok(Value::restriction(types))
            }
            ConstantExpr::AnchorRef { anchor, .. } => self.dereference(action, anchor),
            ConstantExpr::Super(operand) => {
                let value = self.operand(action, operand)?;
                if value.as_species().is_none() {
                    return Err(CoreError::linkage(
                        action,
                        &[value.clone()],
                        format!("supertype mapping must be a species, got {}", value.kind()),
                    ));
                }
                Ok(value)
            }
            ConstantExpr::Eval { function, args } => {
                let target = self.operand(action, function)?;
                let args = args
                    .iter()
                    .map(|op| self.operand(action, op))
                    .collect::<Result<Vec<_>>>()?;
                match target {
                    Value::Function(f) => f.invoke(&args),
                    other => Err(CoreError::linkage(
                        action,
                        &[other.clone()],
                        format!("eval target must be a function, got {}", other.kind()),
                    )),
                }
            }
        }
    }

    fn operand(&self, action: &str, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Ref(name) => self
                .analysis
                .node(name)
                .and_then(|idx| self.memo.get(&idx))
                .cloned()
                .ok_or_else(|| {
                    CoreError::linkage(action, &[operand], "dependency was not evaluated")
                }),
            Operand::Int(v) => Ok(Value::Int(*v)),
            Operand::Double(v) => Ok(Value::Double(*v)),
            Operand::Str(s) => Ok(Value::string(s)),
            Operand::Type(t) => Ok(Value::ty(t)),
            Operand::Function(name) => self.function(action, name).map(Value::Function),
        }
    }

    fn species_operand(
        &self,
        action: &str,
        operand: &Operand,
    ) -> Result<std::sync::Arc<crate::value::Species>> {
        match self.operand(action, operand)? {
            Value::Species(species) => Ok(species),
            other => Err(CoreError::linkage(
                action,
                &[other.clone()],
                format!("expected a species, got {}", other.kind()),
            )),
        }
    }

    fn function(&self, action: &str, name: &str) -> Result<crate::functions::BoundFunction> {
        self.functions
            .lookup(name)
            .ok_or_else(|| CoreError::linkage(action, &[name], format!("no function named '{}'", name)))
    }

    fn dereference(&self, action: &str, anchor: &str) -> Result<Value> {
        let scope = self
            .analysis
            .anchor(anchor)
            .map(|a| a.scope)
            .ok_or_else(|| CoreError::linkage(action, &[anchor], "anchor is not declared"))?;

        let parameters = match scope {
            AnchorScope::Class => self.scope.class_parameters(),
            AnchorScope::Method => self.scope.method_parameters(),
        };

        parameters.cloned().ok_or_else(|| {
            CoreError::linkage(
                action,
                &[anchor],
                format!("no {:?}-scope parameters are bound", scope).to_lowercase(),
            )
        })
    }
}
