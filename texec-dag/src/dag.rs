use serde::{Deserialize, Serialize};

/// Type of a vertex, driving how the DAG renderer styles its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexKind {
    /// A plain point-shaped node.
    Node,
    /// The origin of a chain of operators.
    Origin,
    /// An intermediate operator in a chain.
    Operator,
    /// A process vertex, rendered with its label and no shape override.
    Process,
    /// Anything else, rendered with `shape=none`.
    Other,
}

/// A vertex in the workflow graph. Two vertices with the same `name` are the
/// same vertex to the renderer (see `spec.md` §4.8's worked example, where a
/// vertex reachable from two edges is declared once per edge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    /// Unique name, used directly as the dot node identifier.
    pub name: String,
    /// Optional human-readable label.
    pub label: Option<String>,
    /// The vertex's type.
    pub kind: VertexKind,
}

impl Vertex {
    /// Build a new, unlabelled vertex of the given kind.
    pub fn new(name: impl Into<String>, kind: VertexKind) -> Self {
        Vertex {
            name: name.into(),
            label: None,
            kind,
        }
    }

    /// Attach a label to this vertex.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A directed edge between two vertices, with an optional label.
///
/// Invariant: both endpoints are always present (non-null), enforced simply
/// by `Vertex` being owned, not optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source vertex.
    pub from: Vertex,
    /// Destination vertex.
    pub to: Vertex,
    /// Optional edge label.
    pub label: Option<String>,
}

impl Edge {
    /// Build a new, unlabelled edge.
    pub fn new(from: Vertex, to: Vertex) -> Self {
        Edge {
            from,
            to,
            label: None,
        }
    }

    /// Attach a label to this edge.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// The workflow graph: an insertion-ordered set of directed edges. Ordering
/// is preserved (a `Vec`, not a `HashSet`) because the renderer's output is
/// only deterministic if iteration order is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dag {
    /// Edges of the graph, in insertion order.
    pub edges: Vec<Edge>,
}

impl Dag {
    /// Build an empty DAG.
    pub fn new() -> Self {
        Dag { edges: Vec::new() }
    }

    /// Append an edge.
    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }
}
