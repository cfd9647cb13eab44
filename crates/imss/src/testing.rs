//! Fixtures shared by codec tests.

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use crate::model::{FieldKind, Graph, Guid, NodeId, TypeDescriptor, Value, new_identity};

pub(crate) fn composition_type() -> TypeDescriptor {
    TypeDescriptor::new("Composition")
        .field(1, "Name", FieldKind::Text)
        .field(2, "TechName", FieldKind::Text)
        .field(3, "Lead", FieldKind::Object)
        .field(4, "Tracks", FieldKind::Collection)
        .field(5, "Tags", FieldKind::Collection)
}

pub(crate) fn track_type() -> TypeDescriptor {
    TypeDescriptor::new("Track")
        .field(1, "Title", FieldKind::Text)
        .field(2, "Length", FieldKind::Int32)
        .field(3, "Owner", FieldKind::Object)
        .field(4, "Checksum", FieldKind::Bytes)
        .field(5, "Id", FieldKind::Guid)
}

fn set(graph: &mut Graph, node: NodeId, field: &str, value: Value) {
    assert!(graph.set(node, field, value), "cannot set {field}");
}

/// A composition whose lead track points back at it, plus a second track
/// and a null entry in the track list.
pub(crate) fn library() -> (Graph, NodeId) {
    let mut graph = Graph::new();
    graph.register_type(composition_type());
    graph.register_type(track_type());

    let composition = graph.add_object(new_identity(), "Composition");
    let lead = graph.add_object(new_identity(), "Track");
    let other = graph.add_object(new_identity(), "Track");

    set(&mut graph, composition, "Name", Value::text("Sonata {No. 1}"));
    set(&mut graph, composition, "TechName", Value::text("sonata~1\nmain"));
    set(&mut graph, composition, "Lead", Value::object(lead));
    set(
        &mut graph,
        composition,
        "Tracks",
        Value::Collection(vec![Value::object(lead), Value::object(other), Value::Object(None)]),
    );
    set(
        &mut graph,
        composition,
        "Tags",
        Value::Collection(vec![Value::text("a~b"), Value::Int64(7), Value::Float64(1.5)]),
    );

    for (node, title, length) in [(lead, "Allegro", 412), (other, "Adagio", 388)] {
        set(&mut graph, node, "Title", Value::text(title));
        set(&mut graph, node, "Length", Value::Int32(length));
        set(&mut graph, node, "Checksum", Value::Bytes(vec![0xde, 0xad, 0x00, length as u8]));
        set(&mut graph, node, "Id", Value::Guid(new_identity()));
    }
    set(&mut graph, lead, "Owner", Value::object(composition));
    set(&mut graph, other, "Owner", Value::Object(None));

    (graph, composition)
}

/// A(G1).X -> B(G2), B.Y -> A.
pub(crate) fn mutual_pair() -> (Graph, NodeId, Guid, Guid) {
    let mut graph = Graph::new();
    graph.register_type(TypeDescriptor::new("A").field(1, "X", FieldKind::Object));
    graph.register_type(TypeDescriptor::new("B").field(1, "Y", FieldKind::Object));
    let (g1, g2) = (new_identity(), new_identity());
    let a = graph.add_object(g1, "A");
    let b = graph.add_object(g2, "B");
    set(&mut graph, a, "X", Value::object(b));
    set(&mut graph, b, "Y", Value::object(a));
    (graph, a, g1, g2)
}

/// Asserts that the graphs reachable from both roots have the same shape:
/// identities, type names, scalar values and reference topology.
pub(crate) fn assert_isomorphic(left: &Graph, left_root: NodeId, right: &Graph, right_root: NodeId) {
    let mut forward: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut backward: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut stack = vec![(left_root, right_root)];
    forward.insert(left_root, right_root);
    backward.insert(right_root, left_root);

    while let Some((l, r)) = stack.pop() {
        let ln = left.node(l).unwrap();
        let rn = right.node(r).unwrap();
        assert_eq!(ln.identity, rn.identity);
        assert_eq!(ln.type_name, rn.type_name);
        let descriptor = left.schema().get(&ln.type_name).unwrap();
        for field in &descriptor.fields {
            let lv = ln.get(field.id).unwrap();
            let rv = rn.get(field.id).unwrap();
            compare_values(lv, rv, &mut forward, &mut backward, &mut stack);
        }
    }
}

fn compare_values(
    left: &Value,
    right: &Value,
    forward: &mut FxHashMap<NodeId, NodeId>,
    backward: &mut FxHashMap<NodeId, NodeId>,
    stack: &mut Vec<(NodeId, NodeId)>,
) {
    match (left, right) {
        (Value::Object(Some(l)), Value::Object(Some(r))) => match forward.get(l) {
            Some(mapped) => assert_eq!(mapped, r, "reference topology differs"),
            None => {
                assert!(backward.insert(*r, *l).is_none(), "two nodes collapsed into one");
                forward.insert(*l, *r);
                stack.push((*l, *r));
            }
        },
        (Value::Collection(l), Value::Collection(r)) => {
            assert_eq!(l.len(), r.len());
            for (li, ri) in l.iter().zip(r) {
                compare_values(li, ri, forward, backward, stack);
            }
        }
        (Value::Float64(l), Value::Float64(r)) => assert_eq!(l.to_bits(), r.to_bits()),
        (l, r) => assert_eq!(l, r),
    }
}

// =============================================================================
// Random acyclic graphs
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) struct NodeSpec {
    label: String,
    count: i64,
    ratio: f64,
    flag: bool,
    data: Vec<u8>,
    child: Option<prop::sample::Index>,
    tags: Vec<Value>,
}

fn arb_item() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int64),
        "[a-z~{}=\\\\]{0,6}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        any::<u8>().prop_map(Value::Byte),
    ]
}

fn arb_node() -> impl Strategy<Value = NodeSpec> {
    (
        any::<String>(),
        any::<i64>(),
        -1.0e12f64..1.0e12,
        any::<bool>(),
        prop::collection::vec(any::<u8>(), 0..8),
        prop::option::of(any::<prop::sample::Index>()),
        prop::collection::vec(arb_item(), 0..4),
    )
        .prop_map(|(label, count, ratio, flag, data, child, tags)| NodeSpec {
            label,
            count,
            ratio,
            flag,
            data,
            child,
            tags,
        })
}

/// Between one and seven node specs; the first becomes the root.
pub(crate) fn arb_specs() -> impl Strategy<Value = Vec<NodeSpec>> {
    prop::collection::vec(arb_node(), 1..8)
}

/// Builds a graph whose `Child` links only point forward.
pub(crate) fn build_graph(specs: &[NodeSpec]) -> (Graph, NodeId) {
    let mut graph = Graph::new();
    graph.register_type(
        TypeDescriptor::new("Node")
            .field(1, "Label", FieldKind::Text)
            .field(2, "Count", FieldKind::Int64)
            .field(3, "Ratio", FieldKind::Float64)
            .field(4, "Flag", FieldKind::Bool)
            .field(5, "Data", FieldKind::Bytes)
            .field(6, "Child", FieldKind::Object)
            .field(7, "Tags", FieldKind::Collection),
    );
    let nodes: Vec<NodeId> = specs
        .iter()
        .map(|_| graph.add_object(new_identity(), "Node"))
        .collect();
    for (idx, spec) in specs.iter().enumerate() {
        let node = nodes[idx];
        let later = &nodes[idx + 1..];
        let child = match (&spec.child, later.is_empty()) {
            (Some(pick), false) => Some(*pick.get(later)),
            _ => None,
        };
        set(&mut graph, node, "Label", Value::text(spec.label.clone()));
        set(&mut graph, node, "Count", Value::Int64(spec.count));
        set(&mut graph, node, "Ratio", Value::Float64(spec.ratio));
        set(&mut graph, node, "Flag", Value::Bool(spec.flag));
        set(&mut graph, node, "Data", Value::Bytes(spec.data.clone()));
        set(&mut graph, node, "Child", Value::Object(child));
        set(&mut graph, node, "Tags", Value::Collection(spec.tags.clone()));
    }
    (graph, nodes[0])
}
