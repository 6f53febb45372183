//! Bound-function registry
//!
//! The `function` action looks a static function up by name and may bind
//! trailing arguments; `eval` applies the result to evaluated operands.
//! Functions are plain Rust closures registered under a dotted name.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::value::{TypeDescriptor, Value};

type NativeFn = dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync;

/// A named function with a fixed arity.
pub struct NativeFunction {
    name: Arc<str>,
    arity: usize,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl AsRef<str>,
        arity: usize,
        func: impl Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            arity,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A function reference with zero or more trailing arguments already bound.
#[derive(Clone, Debug)]
pub struct BoundFunction {
    function: Arc<NativeFunction>,
    bound: Arc<[Value]>,
}

impl BoundFunction {
    pub fn new(function: Arc<NativeFunction>) -> Self {
        Self {
            function,
            bound: Arc::from(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn bound(&self) -> &[Value] {
        &self.bound
    }

    /// Number of arguments a caller still has to supply.
    pub fn remaining_arity(&self) -> usize {
        self.function.arity.saturating_sub(self.bound.len())
    }

    /// Bind `trailing` after any arguments already bound.
    pub fn bind_trailing(&self, trailing: impl IntoIterator<Item = Value>) -> Self {
        let bound: Vec<Value> = self.bound.iter().cloned().chain(trailing).collect();
        Self {
            function: Arc::clone(&self.function),
            bound: Arc::from(bound),
        }
    }

    /// Call with leading `args`; bound trailing arguments are appended.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        let mut full = Vec::with_capacity(args.len() + self.bound.len());
        full.extend_from_slice(args);
        full.extend(self.bound.iter().cloned());

        if full.len() != self.function.arity {
            return Err(CoreError::linkage(
                self.name(),
                &full,
                format!(
                    "arity mismatch: expected {}, got {}",
                    self.function.arity,
                    full.len()
                ),
            ));
        }

        (self.function.func)(&full).map_err(|reason| CoreError::linkage(self.name(), &full, reason))
    }
}

impl PartialEq for BoundFunction {
    fn eq(&self, other: &Self) -> bool {
        self.function.name == other.function.name && self.bound == other.bound
    }
}

impl Eq for BoundFunction {}

impl Hash for BoundFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.function.name.hash(state);
        self.bound.hash(state);
    }
}

impl fmt::Display for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn:{}", self.function.name)?;
        if !self.bound.is_empty() {
            let bound: Vec<String> = self.bound.iter().map(ToString::to_string).collect();
            write!(f, "(.., {})", bound.join(", "))?;
        }
        Ok(())
    }
}

/// Registry of the static functions reachable from `function` expressions.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<Arc<str>, Arc<NativeFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the small standard set used by generated code.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(NativeFunction::new("int.add", 2, |args| {
            match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(*b)
                    .map(Value::Int)
                    .ok_or_else(|| "integer overflow".to_string()),
                (a, b) => Err(format!("expected two ints, got {} and {}", a.kind(), b.kind())),
            }
        }));

        registry.register(NativeFunction::new("list.concat", 2, |args| {
            match (&args[0], &args[1]) {
                (Value::List(a), Value::List(b)) => {
                    Ok(Value::list(a.iter().chain(b.iter()).cloned()))
                }
                (a, b) => Err(format!("expected two lists, got {} and {}", a.kind(), b.kind())),
            }
        }));

        registry.register(NativeFunction::new("species.of", 2, |args| {
            match &args[0] {
                Value::Type(raw) => Ok(Value::species(raw.clone(), args[1].clone())),
                other => Err(format!("species raw must be a type, got {}", other.kind())),
            }
        }));

        registry.register(NativeFunction::new("type.descriptor", 1, |args| {
            match &args[0] {
                Value::Type(t) => Ok(Value::string(t.as_str())),
                Value::Species(s) => Ok(Value::string(s.raw.as_str())),
                Value::Str(s) => Ok(Value::Type(TypeDescriptor::new(s))),
                other => Err(format!("no descriptor for {}", other.kind())),
            }
        }));

        registry
    }

    pub fn register(&mut self, function: NativeFunction) {
        let name = Arc::clone(&function.name);
        self.functions.insert(name, Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<Arc<NativeFunction>> {
        self.functions.get(name).cloned()
    }

    /// Look up `name` as an unbound function reference.
    pub fn lookup(&self, name: &str) -> Option<BoundFunction> {
        self.get(name).map(BoundFunction::new)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}
