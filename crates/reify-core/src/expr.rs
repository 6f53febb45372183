//! The constant expression vocabulary
//!
//! Each `ConstantDecl` is parsed into one `ConstantExpr` node. Nodes refer to
//! each other by name through `Operand::Ref`, which makes a class's constants
//! a DAG.

use crate::decl::{ConstantDecl, Operand};
use crate::error::{CoreError, Result};
use crate::value::{TypeDescriptor, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantExpr {
    Literal(Value),
    TypeRef(TypeDescriptor),
    List(Vec<Operand>),
    ListGet {
        list: Operand,
        index: Operand,
    },
    SpeciesMake {
        raw: Operand,
        parameters: Operand,
    },
    SpeciesRaw(Operand),
    SpeciesParams(Operand),
    Linkage(Operand),
    MethodHandleRef {
        function: String,
        bound: Vec<Operand>,
    },
    Restriction(Vec<Operand>),
    /// Reads the ambient parameters of `anchor`. `parent` names the constant
    /// of the enclosing anchor, if nested.
    AnchorRef {
        anchor: String,
        parent: Option<String>,
    },
    Super(Operand),
    Eval {
        function: Operand,
        args: Vec<Operand>,
    },
}

impl ConstantExpr {
    pub fn parse(decl: &ConstantDecl) -> Result<Self> {
        let name = decl.name.as_str();
        let args = decl.args.as_slice();

        let expr = match decl.action.as_str() {
            "literal" => {
                let [operand] = exactly::<1>(name, args)?;
                ConstantExpr::Literal(literal_value(name, operand)?)
            }
            "type" => {
                let [operand] = exactly::<1>(name, args)?;
                match operand {
                    Operand::Type(d) | Operand::Str(d) => {
                        ConstantExpr::TypeRef(TypeDescriptor::new(d))
                    }
                    other => {
                        return Err(CoreError::malformed(
                            name,
                            format!("type expects a descriptor, got {}", other),
                        ))
                    }
                }
            }
            "list" => ConstantExpr::List(args.to_vec()),
            "list_get" => {
                let [list, index] = exactly::<2>(name, args)?;
                ConstantExpr::ListGet {
                    list: list.clone(),
                    index: index.clone(),
                }
            }
            "species" => {
                let [raw, parameters] = exactly::<2>(name, args)?;
                ConstantExpr::SpeciesMake {
                    raw: raw.clone(),
                    parameters: parameters.clone(),
                }
            }
            "species_raw" => {
                let [operand] = exactly::<1>(name, args)?;
                ConstantExpr::SpeciesRaw(operand.clone())
            }
            "species_params" => {
                let [operand] = exactly::<1>(name, args)?;
                ConstantExpr::SpeciesParams(operand.clone())
            }
            "linkage" => {
                let [operand] = exactly::<1>(name, args)?;
                ConstantExpr::Linkage(operand.clone())
            }
            "function" => {
                let (first, rest) = args.split_first().ok_or_else(|| {
                    CoreError::malformed(name, "function expects a function name")
                })?;
                let function = match first {
                    Operand::Function(f) | Operand::Str(f) => f.clone(),
                    other => {
                        return Err(CoreError::malformed(
                            name,
                            format!("function expects a function name, got {}", other),
                        ))
                    }
                };
                ConstantExpr::MethodHandleRef {
                    function,
                    bound: rest.to_vec(),
                }
            }
            "restriction" => {
                for operand in args {
                    if !matches!(operand, Operand::Type(_) | Operand::Ref(_)) {
                        return Err(CoreError::malformed(
                            name,
                            format!("restriction entries must be types, got {}", operand),
                        ));
                    }
                }
                ConstantExpr::Restriction(args.to_vec())
            }
            "anchor" => parse_anchor(name, args)?,
            "super" => {
                let [operand] = exactly::<1>(name, args)?;
                ConstantExpr::Super(operand.clone())
            }
            "eval" => {
                let (function, rest) = args
                    .split_first()
                    .ok_or_else(|| CoreError::malformed(name, "eval expects a function operand"))?;
                if !matches!(function, Operand::Function(_) | Operand::Ref(_)) {
                    return Err(CoreError::malformed(
                        name,
                        format!("eval expects a function operand, got {}", function),
                    ));
                }
                ConstantExpr::Eval {
                    function: function.clone(),
                    args: rest.to_vec(),
                }
            }
            other => {
                return Err(CoreError::malformed(
                    name,
                    format!("unknown action '{}'", other),
                ))
            }
        };

        Ok(expr)
    }

    /// Names of the constants this node reads, in operand order.
    pub fn references(&self) -> Vec<&str> {
        match self {
            ConstantExpr::Literal(_) | ConstantExpr::TypeRef(_) => Vec::new(),
            ConstantExpr::AnchorRef { parent, .. } => parent.as_deref().into_iter().collect(),
            ConstantExpr::List(items) | ConstantExpr::Restriction(items) => {
                items.iter().filter_map(Operand::reference).collect()
            }
            ConstantExpr::ListGet { list, index } => [list, index]
                .into_iter()
                .filter_map(Operand::reference)
                .collect(),
            ConstantExpr::SpeciesMake { raw, parameters } => [raw, parameters]
                .into_iter()
                .filter_map(Operand::reference)
                .collect(),
            ConstantExpr::SpeciesRaw(o)
            | ConstantExpr::SpeciesParams(o)
            | ConstantExpr::Linkage(o)
            | ConstantExpr::Super(o) => o.reference().into_iter().collect(),
            ConstantExpr::MethodHandleRef { bound, .. } => {
                bound.iter().filter_map(Operand::reference).collect()
            }
            ConstantExpr::Eval { function, args } => std::iter::once(function)
                .chain(args.iter())
                .filter_map(Operand::reference)
                .collect(),
        }
    }

    /// The action token this node was parsed from.
    pub fn action(&self) -> &'static str {
        match self {
            ConstantExpr::Literal(_) => "literal",
            ConstantExpr::TypeRef(_) => "type",
            ConstantExpr::List(_) => "list",
            ConstantExpr::ListGet { .. } => "list_get",
            ConstantExpr::SpeciesMake { .. } => "species",
            ConstantExpr::SpeciesRaw(_) => "species_raw",
            ConstantExpr::SpeciesParams(_) => "species_params",
            ConstantExpr::Linkage(_) => "linkage",
            ConstantExpr::MethodHandleRef { .. } => "function",
            ConstantExpr::Restriction(_) => "restriction",
            ConstantExpr::AnchorRef { .. } => "anchor",
            ConstantExpr::Super(_) => "super",
            ConstantExpr::Eval { .. } => "eval",
        }
    }

    pub fn is_anchor(&self) -> bool {
        matches!(self, ConstantExpr::AnchorRef { .. })
    }

    pub fn is_super(&self) -> bool {
        matches!(self, ConstantExpr::Super(_))
    }
}

fn exactly<'a, const N: usize>(constant: &str, args: &'a [Operand]) -> Result<&'a [Operand; N]> {
    args.try_into().map_err(|_| {
        CoreError::malformed(
            constant,
            format!("expected {} operand(s), got {}", N, args.len()),
        )
    })
}

fn literal_value(constant: &str, operand: &Operand) -> Result<Value> {
    match operand {
        Operand::Int(v) => Ok(Value::Int(*v)),
        Operand::Double(v) => Ok(Value::Double(*v)),
        Operand::Str(s) => Ok(Value::string(s)),
        Operand::Type(t) => Ok(Value::ty(t)),
        Operand::Ref(_) | Operand::Function(_) => Err(CoreError::malformed(
            constant,
            format!("literal expects a scalar, got {}", operand),
        )),
    }
}

/// `anchor` takes an optional anchor id (string) and an optional parent
/// reference, in either order. Without an id the constant's own name is the
/// anchor id.
fn parse_anchor(constant: &str, args: &[Operand]) -> Result<ConstantExpr> {
    let mut anchor = None;
    let mut parent = None;

    for operand in args {
        match operand {
            Operand::Str(id) if anchor.is_none() => anchor = Some(id.clone()),
            Operand::Ref(p) if parent.is_none() => parent = Some(p.clone()),
            other => {
                return Err(CoreError::malformed(
                    constant,
                    format!("unexpected anchor operand {}", other),
                ))
            }
        }
    }

    Ok(ConstantExpr::AnchorRef {
        anchor: anchor.unwrap_or_else(|| constant.to_string()),
        parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, action: &str, tokens: &[&str]) -> Result<ConstantExpr> {
        ConstantExpr::parse(&ConstantDecl::parse(name, action, tokens)?)
    }

    #[test]
    fn test_parse_vocabulary() {
        assert_eq!(
            parse("n", "literal", &["3"]).unwrap(),
            ConstantExpr::Literal(Value::Int(3))
        );
        assert_eq!(
            parse("t", "type", &["T:String"]).unwrap(),
            ConstantExpr::TypeRef(TypeDescriptor::new("String"))
        );
        assert_eq!(
            parse("f", "function", &["fn:list.concat", "&tail"]).unwrap(),
            ConstantExpr::MethodHandleRef {
                function: "list.concat".into(),
                bound: vec![Operand::Ref("tail".into())],
            }
        );
        assert_eq!(
            parse("M", "anchor", &["&T"]).unwrap(),
            ConstantExpr::AnchorRef {
                anchor: "M".into(),
                parent: Some("T".into()),
            }
        );
    }

    #[test]
    fn test_references_in_operand_order() {
        let expr = parse("e", "eval", &["&f", "&a", "1", "&b"]).unwrap();
        assert_eq!(expr.references(), vec!["f", "a", "b"]);
    }

    #[test]
    fn test_malformed_declarations() {
        assert!(parse("x", "frobnicate", &[]).is_err());
        assert!(parse("x", "literal", &["&y"]).is_err());
        assert!(parse("x", "species", &["T:Box"]).is_err());
        assert!(parse("x", "restriction", &["3"]).is_err());
        assert!(parse("x", "anchor", &["&a", "&b"]).is_err());
        assert!(parse("x", "function", &[]).is_err());
    }
}
