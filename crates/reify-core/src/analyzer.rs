//! Dependency analysis over a class's constant graph
//!
//! Classifies every constant as either a link-time constant or as rooted at
//! an anchor (its value varies per specialization), and validates that the
//! anchors any single constant depends on lie on one parent chain.
//!
//! The named-reference graph is held in a petgraph arena and classification
//! walks it in topological order, so deep graphs never recurse on the native
//! stack.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use tracing::{debug, instrument, trace};

use crate::decl::{Anchor, AnchorTable, ClassDecls};
use crate::error::{CoreError, Result};
use crate::expr::ConstantExpr;

/// Where a constant's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootClassification {
    /// Fixed at link time; may be evaluated once and folded.
    Constant,
    /// Varies with the anchor constant `name`, nested under `parent`.
    Anchor {
        name: String,
        parent: Option<String>,
    },
}

impl RootClassification {
    pub fn is_anchor(&self) -> bool {
        matches!(self, RootClassification::Anchor { .. })
    }

    pub fn anchor_name(&self) -> Option<&str> {
        match self {
            RootClassification::Anchor { name, .. } => Some(name),
            RootClassification::Constant => None,
        }
    }
}

/// Result of analyzing one class.
#[derive(Debug, Clone)]
pub struct ClassAnalysis {
    class: String,
    /// Edges point from a constant to the constants it reads.
    graph: DiGraph<Arc<str>, ()>,
    index: HashMap<Arc<str>, NodeIndex>,
    exprs: Vec<ConstantExpr>,
    roots: Vec<RootClassification>,
    /// Dependencies first.
    order: Vec<NodeIndex>,
    needs_accessor: BTreeSet<String>,
    anchors: AnchorTable,
    imported: AnchorTable,
    super_mapping: Option<String>,
}

impl ClassAnalysis {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn root(&self, name: &str) -> Option<&RootClassification> {
        self.index.get(name).map(|&idx| &self.roots[idx.index()])
    }

    pub fn expr(&self, name: &str) -> Option<&ConstantExpr> {
        self.index.get(name).map(|&idx| &self.exprs[idx.index()])
    }

    pub fn is_anchored(&self, name: &str) -> bool {
        self.root(name).is_some_and(RootClassification::is_anchor)
    }

    /// Constants that must stay re-evaluable per carrier.
    pub fn needs_accessor(&self, name: &str) -> bool {
        self.needs_accessor.contains(name)
    }

    pub fn accessors(&self) -> impl Iterator<Item = &str> {
        self.needs_accessor.iter().map(String::as_str)
    }

    /// Constant names, dependencies before dependents.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|&idx| &*self.graph[idx])
    }

    /// Declared anchor by id, local first, then imported.
    pub fn anchor(&self, id: &str) -> Option<&Anchor> {
        self.anchors.get(id).or_else(|| self.imported.get(id))
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    /// The constant holding the explicit supertype species mapping.
    pub fn super_mapping(&self) -> Option<&str> {
        self.super_mapping.as_deref()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub(crate) fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub(crate) fn name_of(&self, idx: NodeIndex) -> &Arc<str> {
        &self.graph[idx]
    }

    pub(crate) fn expr_at(&self, idx: NodeIndex) -> &ConstantExpr {
        &self.exprs[idx.index()]
    }

    pub(crate) fn root_at(&self, idx: NodeIndex) -> &RootClassification {
        &self.roots[idx.index()]
    }

    /// `root` and everything it transitively reads, in evaluation order.
    pub(crate) fn evaluation_plan(&self, root: NodeIndex) -> Vec<NodeIndex> {
        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, root);
        while let Some(idx) = dfs.next(&self.graph) {
            reachable.insert(idx);
        }
        self.order
            .iter()
            .copied()
            .filter(|idx| reachable.contains(idx))
            .collect()
    }
}

/// Analyze a class whose anchors may also refer to `imported` (cross-class)
/// anchors. Any error aborts the whole class.
#[instrument(skip_all, fields(class = %decls.class))]
pub fn analyze(decls: &ClassDecls, imported: &AnchorTable) -> Result<ClassAnalysis> {
    let anchors = AnchorTable::new(decls.anchors.iter().cloned())?;

    let mut graph = DiGraph::new();
    let mut index: HashMap<Arc<str>, NodeIndex> = HashMap::new();
    let mut exprs = Vec::with_capacity(decls.constants.len());

    for decl in &decls.constants {
        let name: Arc<str> = Arc::from(decl.name.as_str());
        if index.contains_key(&name) {
            return Err(CoreError::malformed(&decl.name, "constant declared more than once"));
        }
        let expr = ConstantExpr::parse(decl)?;
        let idx = graph.add_node(Arc::clone(&name));
        debug_assert_eq!(idx.index(), exprs.len());
        index.insert(name, idx);
        exprs.push(expr);
    }

    for (i, expr) in exprs.iter().enumerate() {
        let from = NodeIndex::new(i);
        for reference in expr.references() {
            let to = *index
                .get(reference)
                .ok_or_else(|| CoreError::UnresolvedReference {
                    constant: graph[from].to_string(),
                    reference: reference.to_string(),
                })?;
            graph.add_edge(from, to, ());
        }
    }

    let mut order = toposort(&graph, None).map_err(|cycle| {
        CoreError::topology(
            graph[cycle.node_id()].to_string(),
            "constant participates in a reference cycle",
        )
    })?;
    order.reverse();

    let mut classifier = Classifier {
        anchors: &anchors,
        imported,
        anchor_parents: HashMap::new(),
        anchor_ids: HashMap::new(),
        cross_class: BTreeSet::new(),
    };

    let mut roots = vec![RootClassification::Constant; exprs.len()];
    for &idx in &order {
        let name = &graph[idx];
        let root = classifier.classify(name, &exprs[idx.index()], &index, &roots)?;
        trace!(constant = %name, ?root, "classified constant");
        roots[idx.index()] = root;
    }

    let mut needs_accessor = classifier.cross_class;
    for &idx in &order {
        if roots[idx.index()].is_anchor() {
            needs_accessor.insert(graph[idx].to_string());
        }
    }

    let mut super_mapping = None;
    for (i, expr) in exprs.iter().enumerate() {
        if expr.is_super() {
            let name = graph[NodeIndex::new(i)].to_string();
            if let Some(previous) = super_mapping.replace(name.clone()) {
                return Err(CoreError::malformed(
                    name,
                    format!("second supertype mapping (first was '{}')", previous),
                ));
            }
        }
    }

    debug!(
        constants = exprs.len(),
        anchored = needs_accessor.len(),
        "analyzed class constants"
    );

    Ok(ClassAnalysis {
        class: decls.class.clone(),
        graph,
        index,
        exprs,
        roots,
        order,
        needs_accessor,
        anchors,
        imported: imported.clone(),
        super_mapping,
    })
}

struct Classifier<'a> {
    anchors: &'a AnchorTable,
    imported: &'a AnchorTable,
    /// Anchor constant -> parent anchor constant, filled as anchors are met.
    anchor_parents: HashMap<String, Option<String>>,
    /// Anchor constant -> declared anchor id.
    anchor_ids: HashMap<String, String>,
    cross_class: BTreeSet<String>,
}

fn root_of<'r>(
    index: &HashMap<Arc<str>, NodeIndex>,
    roots: &'r [RootClassification],
    reference: &str,
) -> &'r RootClassification {
    // references were checked when the graph was built
    &roots[index[reference].index()]
}

impl Classifier<'_> {
    fn classify(
        &mut self,
        name: &str,
        expr: &ConstantExpr,
        index: &HashMap<Arc<str>, NodeIndex>,
        roots: &[RootClassification],
    ) -> Result<RootClassification> {
        let ConstantExpr::AnchorRef { anchor, parent } = expr else {
            let mut root = RootClassification::Constant;
            for reference in expr.references() {
                root = self.merge(name, &root, root_of(index, roots, reference))?;
            }
            return Ok(root);
        };

        let (anchors, imported) = (self.anchors, self.imported);
        let declared = match anchors.get(anchor) {
            Some(a) => a,
            None => {
                let a = imported
                    .get(anchor)
                    .ok_or_else(|| CoreError::UndeclaredAnchor {
                        constant: name.to_string(),
                        anchor: anchor.clone(),
                    })?;
                self.cross_class.insert(name.to_string());
                a
            }
        };

        let parent_id = match parent {
            Some(parent) => {
                if !matches!(
                    root_of(index, roots, parent),
                    RootClassification::Anchor { name: p, .. } if p == parent
                ) {
                    return Err(CoreError::topology(
                        name,
                        format!("parent '{}' is not an anchor", parent),
                    ));
                }
                self.anchor_ids.get(parent).cloned()
            }
            None => None,
        };

        if declared.parent != parent_id {
            return Err(CoreError::topology(
                name,
                format!(
                    "anchor '{}' is declared under {:?} but nested under {:?}",
                    declared.name, declared.parent, parent_id
                ),
            ));
        }

        self.anchor_parents.insert(name.to_string(), parent.clone());
        self.anchor_ids.insert(name.to_string(), declared.name.clone());
        Ok(RootClassification::Anchor {
            name: name.to_string(),
            parent: parent.clone(),
        })
    }

    fn merge(
        &self,
        constant: &str,
        current: &RootClassification,
        incoming: &RootClassification,
    ) -> Result<RootClassification> {
        use RootClassification::*;

        match (current, incoming) {
            (_, Constant) => Ok(current.clone()),
            (Constant, Anchor { .. }) => Ok(incoming.clone()),
            (Anchor { name: a, .. }, Anchor { name: b, .. }) => {
                if a == b || self.is_ancestor(b, a) {
                    Ok(current.clone())
                } else if self.is_ancestor(a, b) {
                    Ok(incoming.clone())
                } else {
                    Err(CoreError::DivergentAnchor {
                        constant: constant.to_string(),
                        first: a.clone(),
                        second: b.clone(),
                    })
                }
            }
        }
    }

    /// Whether anchor constant `ancestor` encloses anchor constant `of`.
    fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        let mut cursor = self.anchor_parents.get(of).cloned().flatten();
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.anchor_parents.get(&parent).cloned().flatten();
        }
        false
    }
}
