use crate::dag::{Dag, Edge, Vertex, VertexKind};

/// Render a `Dag` in a dot-style directed-graph textual format.
///
/// Every edge contributes exactly one block — a declaration line for each
/// endpoint that has any attributes, followed by the edge line itself —
/// joined with the rest of the output by newlines. A vertex reachable from
/// more than one edge is declared once per edge it appears in (see the
/// worked example in `spec.md` §8, scenario 6, where `p` is declared twice).
///
/// Deterministic for a given insertion-order-preserving iteration of
/// `dag.edges`.
pub fn render(dag: &Dag) -> String {
    let mut lines = Vec::with_capacity(dag.edges.len() * 3 + 2);
    lines.push("digraph graphname {".to_string());
    for edge in &dag.edges {
        if let Some(decl) = vertex_decl(&edge.from) {
            lines.push(decl);
        }
        if let Some(decl) = vertex_decl(&edge.to) {
            lines.push(decl);
        }
        lines.push(edge_line(edge));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn vertex_decl(v: &Vertex) -> Option<String> {
    let attrs = vertex_attrs(v);
    if attrs.is_empty() {
        return None;
    }
    Some(format!("{} [{}];", v.name, attrs.join(",")))
}

fn vertex_attrs(v: &Vertex) -> Vec<String> {
    match v.kind {
        VertexKind::Node => {
            let mut attrs = vec!["shape=point".to_string()];
            if let Some(label) = &v.label {
                attrs.push("label=\"\"".to_string());
                attrs.push(format!("xlabel=\"{label}\""));
            }
            attrs
        }
        VertexKind::Origin => {
            let mut attrs = vec![
                "shape=point".to_string(),
                "label=\"\"".to_string(),
                "fixedsize=true".to_string(),
                "width=0.1".to_string(),
            ];
            if let Some(label) = &v.label {
                attrs.push(format!("xlabel=\"{label}\""));
            }
            attrs
        }
        VertexKind::Operator => {
            let mut attrs = vec![
                "shape=circle".to_string(),
                "label=\"\"".to_string(),
                "fixedsize=true".to_string(),
                "width=0.1".to_string(),
            ];
            if let Some(label) = &v.label {
                attrs.push(format!("xlabel=\"{label}\""));
            }
            attrs
        }
        VertexKind::Process => {
            let mut attrs = vec![];
            if let Some(label) = &v.label {
                attrs.push(format!("label=\"{label}\""));
            }
            attrs
        }
        VertexKind::Other => {
            let mut attrs = vec!["shape=none".to_string()];
            if let Some(label) = &v.label {
                attrs.push(format!("label=\"{label}\""));
            }
            attrs
        }
    }
}

fn edge_line(edge: &Edge) -> String {
    match &edge.label {
        Some(label) => format!(
            "{} -> {} [label=\"{label}\"];",
            edge.from.name, edge.to.name
        ),
        None => format!("{} -> {};", edge.from.name, edge.to.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_spec_worked_example() {
        let mut dag = Dag::new();
        let a = Vertex::new("a", VertexKind::Origin);
        let p = Vertex::new("p", VertexKind::Process).with_label("p");
        let n = Vertex::new("n", VertexKind::Node);
        dag.add_edge(Edge::new(a, p.clone()).with_label("x"));
        dag.add_edge(Edge::new(p, n));

        let expected = "digraph graphname {\n\
a [shape=point,label=\"\",fixedsize=true,width=0.1];\n\
p [label=\"p\"];\n\
a -> p [label=\"x\"];\n\
p [label=\"p\"];\n\
n [shape=point];\n\
p -> n;\n\
}";
        assert_eq!(render(&dag), expected);
    }

    #[test]
    fn empty_dag_renders_header_and_footer_only() {
        let dag = Dag::new();
        assert_eq!(render(&dag), "digraph graphname {\n}");
    }

    #[test]
    fn unlabelled_process_vertex_has_no_declaration() {
        let mut dag = Dag::new();
        let from = Vertex::new("one", VertexKind::Process);
        let to = Vertex::new("two", VertexKind::Process);
        dag.add_edge(Edge::new(from, to));
        assert_eq!(render(&dag), "digraph graphname {\none -> two;\n}");
    }

    #[test]
    fn render_is_deterministic() {
        let mut dag = Dag::new();
        dag.add_edge(Edge::new(
            Vertex::new("a", VertexKind::Operator).with_label("op"),
            Vertex::new("b", VertexKind::Other).with_label("b-label"),
        ));
        assert_eq!(render(&dag), render(&dag));
    }
}
