//! Declarations handed over by the rewriting front end
//!
//! A class arrives as a set of named constant declarations (action token plus
//! ordered operands) and a set of anchors, the class- or method-scoped
//! specialization points its constants may depend on.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One argument token of a constant declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// Reference to another constant of the same class, by name.
    Ref(String),
    Int(i32),
    Double(f64),
    Str(String),
    /// Reified type, by descriptor.
    Type(String),
    /// Static function, by registry name.
    Function(String),
}

impl Operand {
    pub fn reference(&self) -> Option<&str> {
        match self {
            Operand::Ref(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Ref(name) => write!(f, "&{}", name),
            Operand::Int(v) => write!(f, "{}", v),
            Operand::Double(v) => write!(f, "{:?}", v),
            Operand::Str(s) => write!(f, "{:?}", s),
            Operand::Type(t) => write!(f, "T:{}", t),
            Operand::Function(name) => write!(f, "fn:{}", name),
        }
    }
}

/// Parse the compact token form: `&name`, `T:descriptor`, `fn:name`,
/// `"text"`, a 32-bit integer, or a double written with a decimal point.
impl FromStr for Operand {
    type Err = String;

    fn from_str(token: &str) -> std::result::Result<Self, Self::Err> {
        let token = token.trim();
        if token.is_empty() {
            return Err("empty operand token".to_string());
        }

        if let Some(name) = token.strip_prefix('&') {
            return non_empty(name, "reference").map(Operand::Ref);
        }
        if let Some(descriptor) = token.strip_prefix("T:") {
            return non_empty(descriptor, "type descriptor").map(Operand::Type);
        }
        if let Some(name) = token.strip_prefix("fn:") {
            return non_empty(name, "function name").map(Operand::Function);
        }
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Ok(Operand::Str(token[1..token.len() - 1].to_string()));
        }

        let numeric = token.strip_prefix('-').unwrap_or(token);
        if !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit() || c == '.') {
            if token.contains('.') {
                return token
                    .parse::<f64>()
                    .map(Operand::Double)
                    .map_err(|e| format!("invalid double '{}': {}", token, e));
            }
            return token
                .parse::<i32>()
                .map(Operand::Int)
                .map_err(|e| format!("invalid 32-bit integer '{}': {}", token, e));
        }

        Err(format!("unrecognized operand token '{}'", token))
    }
}

fn non_empty(text: &str, what: &str) -> std::result::Result<String, String> {
    if text.is_empty() {
        Err(format!("missing {} after prefix", what))
    } else {
        Ok(text.to_string())
    }
}

/// A named constant declaration: `name = action(args...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantDecl {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub args: Vec<Operand>,
}

impl ConstantDecl {
    pub fn new(name: impl Into<String>, action: impl Into<String>, args: Vec<Operand>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            args,
        }
    }

    /// Build a declaration from textual tokens, e.g.
    /// `ConstantDecl::parse("elem", "list_get", &["&params", "0"])`.
    pub fn parse(name: &str, action: &str, tokens: &[&str]) -> Result<Self> {
        let args = tokens
            .iter()
            .map(|t| t.parse::<Operand>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|reason| CoreError::malformed(name, reason))?;
        Ok(Self::new(name, action, args))
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Operand::reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorScope {
    Class,
    Method,
}

/// A named specialization point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub name: String,
    pub scope: AnchorScope,
    #[serde(default)]
    pub parent: Option<String>,
}

impl Anchor {
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: AnchorScope::Class,
            parent: None,
        }
    }

    pub fn method(name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            name: name.into(),
            scope: AnchorScope::Method,
            parent: parent.map(str::to_string),
        }
    }
}

/// Everything the front end extracted for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecls {
    pub class: String,
    #[serde(default)]
    pub constants: Vec<ConstantDecl>,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

impl ClassDecls {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            constants: Vec::new(),
            anchors: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchors.push(anchor);
        self
    }

    pub fn with_constant(mut self, decl: ConstantDecl) -> Self {
        self.constants.push(decl);
        self
    }
}

/// Anchors indexed by name, with parent chains validated on construction.
#[derive(Debug, Clone, Default)]
pub struct AnchorTable {
    anchors: Vec<Anchor>,
    index: HashMap<String, usize>,
}

impl AnchorTable {
    /// Every parent must name an anchor declared earlier in `anchors`.
    pub fn new(anchors: impl IntoIterator<Item = Anchor>) -> Result<Self> {
        let mut table = Self::default();
        for anchor in anchors {
            table.push(anchor)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, anchor: Anchor) -> Result<()> {
        if self.index.contains_key(&anchor.name) {
            return Err(CoreError::topology(
                &anchor.name,
                "anchor declared more than once",
            ));
        }
        if let Some(parent) = &anchor.parent {
            if !self.index.contains_key(parent) {
                return Err(CoreError::topology(
                    &anchor.name,
                    format!("parent anchor '{}' is not declared before use", parent),
                ));
            }
        }
        self.index.insert(anchor.name.clone(), self.anchors.len());
        self.anchors.push(anchor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Anchor> {
        self.index.get(name).map(|&i| &self.anchors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
