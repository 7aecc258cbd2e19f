pub mod routing;

pub use routing::{route_edge, route_graph_edges, simplify_path};

use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::graph::{Graph, Node, Point, Rect, traverse_graph, traverse_graph_mut};
use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

/// Lays out `graph` in place.
///
/// Every node receives a size and a position (relative to its parent group
/// for nested nodes), every edge receives the engine's routed polyline in
/// absolute coordinates, and the graph's width/height become the canvas
/// extent. A dangling edge endpoint or a duplicated node id is reported as
/// [`LayoutError::MalformedGraph`] before the engine runs; an abort inside
/// the engine is reported the same way.
///
/// Group boxes are fitted around their members plus `group_padding`, so a
/// child always lies within `[0, parent.width] × [0, parent.height]`.
pub fn compute_layout<N, E>(graph: &mut Graph<N, E>, config: &LayoutConfig) -> Result<()> {
    graph.validate()?;
    let node_total = graph.node_count();
    debug!(
        nodes = node_total,
        edges = graph.edges.len(),
        compound = graph.is_compound(),
        "computing layout"
    );
    if node_total == 0 {
        graph.width = 0.0;
        graph.height = 0.0;
        return Ok(());
    }

    let groups = group_ids(graph);
    let mut dagre_graph = build_dagre_graph(graph, config);
    guard_engine(|| dagre_layout::run_layout(&mut dagre_graph))?;

    let mut boxes = engine_boxes(graph, &dagre_graph);
    enclose_members(&graph.nodes, &mut boxes, config.group_padding.max(0.0));
    let mut routes = engine_routes(graph, &dagre_graph, &groups, &boxes);
    normalize_origin(&mut boxes, &mut routes, config);

    apply_node_positions(graph, &boxes);
    for (edge, points) in graph.edges.iter_mut().zip(routes) {
        edge.points = points;
    }

    if config.router.enabled {
        route_graph_edges(graph, &config.router);
    }
    fit_canvas(graph, config);
    debug!(width = graph.width, height = graph.height, "layout finished");
    Ok(())
}

/// Owned variant of [`compute_layout`], convenient across thread boundaries.
pub fn layout_graph<N, E>(mut graph: Graph<N, E>, config: &LayoutConfig) -> Result<Graph<N, E>> {
    compute_layout(&mut graph, config)?;
    Ok(graph)
}

fn group_ids<N, E>(graph: &Graph<N, E>) -> HashSet<String> {
    let mut groups = HashSet::new();
    traverse_graph(graph, |node, _, _| {
        if node.is_group() {
            groups.insert(node.id.clone());
        }
    });
    groups
}

/// Maps every node to the leaf that stands in for it in the engine: a leaf
/// is its own anchor, a group is anchored on its first leaf descendant.
fn leaf_anchors<N, E>(graph: &Graph<N, E>) -> HashMap<String, String> {
    let mut anchors = HashMap::new();
    traverse_graph(graph, |node, _, _| {
        let mut anchor = node;
        while let Some(first) = anchor.nodes.first() {
            anchor = first;
        }
        anchors.insert(node.id.clone(), anchor.id.clone());
    });
    anchors
}

/// Runs the engine, turning an abort inside it into a `MalformedGraph` error.
fn guard_engine<T>(run: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(run)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown failure".to_string());
        warn!(%reason, "layout engine aborted");
        LayoutError::MalformedGraph(format!("layout engine aborted: {reason}"))
    })
}

/// Only leaves are handed to the engine; group boxes are fitted around their
/// members afterwards, so the engine never sees a cluster.
fn build_dagre_graph<N, E>(
    graph: &Graph<N, E>,
    config: &LayoutConfig,
) -> DagreGraph<DagreConfig, DagreNode, DagreEdge> {
    let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
        DagreGraph::new(Some(GraphOption {
            directed: Some(true),
            multigraph: Some(false),
            compound: Some(false),
        }));

    let mut graph_config = DagreConfig::default();
    graph_config.rankdir = Some(config.rankdir.as_dagre().to_string());
    graph_config.nodesep = Some(config.node_spacing);
    graph_config.ranksep = Some(config.rank_spacing);
    graph_config.marginx = Some(config.margin_x);
    graph_config.marginy = Some(config.margin_y);
    dagre_graph.set_graph(graph_config);

    traverse_graph(graph, |node, _, _| {
        if node.is_group() {
            return;
        }
        let mut dagre_node = DagreNode::default();
        if node.has_declared_size() {
            dagre_node.width = node.width;
            dagre_node.height = node.height;
        } else {
            dagre_node.width = config.default_node_width;
            dagre_node.height = config.default_node_height;
        }
        dagre_graph.set_node(node.id.clone(), Some(dagre_node));
    });

    // Edges with a group endpoint still constrain ranking through the
    // group's anchor leaf.
    let anchors = leaf_anchors(graph);
    let mut edge_set: HashSet<(&str, &str)> = HashSet::new();
    for edge in &graph.edges {
        let (Some(from), Some(to)) = (anchors.get(&edge.source), anchors.get(&edge.target)) else {
            continue;
        };
        if from == to {
            debug!(edge = %edge.describe(), "edge collapses onto one anchor, skipped by the engine");
            continue;
        }
        if !edge_set.insert((from.as_str(), to.as_str())) {
            continue;
        }
        let edge_label = DagreEdge::default();
        let _ = dagre_graph.set_edge(from, to, Some(edge_label), None);
    }

    dagre_graph
}

/// Absolute top-left boxes as placed by the engine.
fn engine_boxes<N, E>(
    graph: &Graph<N, E>,
    dagre_graph: &DagreGraph<DagreConfig, DagreNode, DagreEdge>,
) -> HashMap<String, Rect> {
    let mut boxes = HashMap::new();
    traverse_graph(graph, |node, _, _| {
        if let Some(placed) = dagre_graph.node(&node.id) {
            boxes.insert(
                node.id.clone(),
                Rect::new(
                    placed.x - placed.width / 2.0,
                    placed.y - placed.height / 2.0,
                    placed.width,
                    placed.height,
                ),
            );
        }
    });
    boxes
}

/// Refits every group, innermost first, to the union of its members'
/// boxes grown by `padding`.
fn enclose_members<N>(nodes: &[Node<N>], boxes: &mut HashMap<String, Rect>, padding: f32) {
    for node in nodes.iter().filter(|node| node.is_group()) {
        enclose_members(&node.nodes, boxes, padding);
        let members = node
            .nodes
            .iter()
            .filter_map(|child| boxes.get(&child.id).copied())
            .reduce(|acc, rect| acc.union(&rect));
        if let Some(members) = members {
            boxes.insert(node.id.clone(), members.expand(padding));
        }
    }
}

fn engine_routes<N, E>(
    graph: &Graph<N, E>,
    dagre_graph: &DagreGraph<DagreConfig, DagreNode, DagreEdge>,
    groups: &HashSet<String>,
    boxes: &HashMap<String, Rect>,
) -> Vec<Vec<Point>> {
    graph
        .edges
        .iter()
        .map(|edge| {
            let routed: Vec<Point> = if groups.contains(&edge.source) || groups.contains(&edge.target) {
                Vec::new()
            } else {
                dagre_graph
                    .edge(&edge.source, &edge.target, None)
                    .and_then(|dagre_edge| dagre_edge.points.as_ref())
                    .map(|points| points.iter().map(|p| Point::new(p.x, p.y)).collect())
                    .unwrap_or_default()
            };
            if routed.len() >= 2 {
                return routed;
            }
            match (boxes.get(&edge.source), boxes.get(&edge.target)) {
                (Some(from), Some(to)) => vec![from.center(), to.center()],
                _ => Vec::new(),
            }
        })
        .collect()
}

/// Shifts everything right/down when fitted groups poke past the margins.
fn normalize_origin(boxes: &mut HashMap<String, Rect>, routes: &mut [Vec<Point>], config: &LayoutConfig) {
    let min_x = boxes
        .values()
        .map(|rect| rect.x)
        .chain(routes.iter().flatten().map(|p| p.x))
        .fold(f32::INFINITY, f32::min);
    let min_y = boxes
        .values()
        .map(|rect| rect.y)
        .chain(routes.iter().flatten().map(|p| p.y))
        .fold(f32::INFINITY, f32::min);
    if !min_x.is_finite() || !min_y.is_finite() {
        return;
    }
    let dx = (config.margin_x - min_x).max(0.0);
    let dy = (config.margin_y - min_y).max(0.0);
    if dx == 0.0 && dy == 0.0 {
        return;
    }
    for rect in boxes.values_mut() {
        rect.x += dx;
        rect.y += dy;
    }
    for point in routes.iter_mut().flatten() {
        point.x += dx;
        point.y += dy;
    }
}

/// Writes sizes and parent-relative positions back into the tree.
fn apply_node_positions<N, E>(graph: &mut Graph<N, E>, boxes: &HashMap<String, Rect>) {
    traverse_graph_mut(graph, |node, parent, _| {
        let Some(rect) = boxes.get(&node.id) else {
            return;
        };
        let origin = parent
            .and_then(|id| boxes.get(id))
            .map(|p| Point::new(p.x, p.y))
            .unwrap_or_default();
        node.x = rect.x - origin.x;
        node.y = rect.y - origin.y;
        node.width = rect.width;
        node.height = rect.height;
    });
}

/// Sizes the canvas to the laid-out content plus the configured margins.
fn fit_canvas<N, E>(graph: &mut Graph<N, E>, config: &LayoutConfig) {
    let mut max_x: f32 = 0.0;
    let mut max_y: f32 = 0.0;
    for rect in graph.absolute_rects().values() {
        max_x = max_x.max(rect.right());
        max_y = max_y.max(rect.bottom());
    }
    for point in graph.edges.iter().flat_map(|edge| edge.points.iter()) {
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    graph.width = max_x + config.margin_x;
    graph.height = max_y + config.margin_y;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankDir;
    use crate::error::LayoutError;
    use crate::graph::{Edge, Node};

    type TestGraph = Graph<(), ()>;

    fn chain() -> TestGraph {
        let mut graph = TestGraph::new();
        graph.nodes = vec![Node::new("a"), Node::new("b"), Node::new("c")];
        graph.edges = vec![Edge::new("a", "b"), Edge::new("b", "c")];
        graph
    }

    #[test]
    fn chain_is_layered_top_to_bottom() {
        let mut graph = chain();
        compute_layout(&mut graph, &LayoutConfig::default()).unwrap();
        let ys: Vec<f32> = graph.nodes.iter().map(|n| n.y).collect();
        assert!(ys[0] < ys[1] && ys[1] < ys[2], "{ys:?}");
        for edge in &graph.edges {
            assert!(edge.points.len() >= 2);
        }
        assert!(graph.width > 0.0 && graph.height > ys[2]);
    }

    #[test]
    fn left_right_layering_increases_x() {
        let mut graph = chain();
        let config = LayoutConfig {
            rankdir: RankDir::LeftRight,
            ..LayoutConfig::default()
        };
        compute_layout(&mut graph, &config).unwrap();
        let xs: Vec<f32> = graph.nodes.iter().map(|n| n.x).collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2], "{xs:?}");
    }

    #[test]
    fn undeclared_sizes_use_defaults_and_declared_sizes_survive() {
        let mut graph = TestGraph::new();
        graph.nodes = vec![Node::new("a"), Node::new("b").with_size(120.0, 30.0)];
        let config = LayoutConfig::default();
        compute_layout(&mut graph, &config).unwrap();
        assert_eq!(graph.nodes[0].width, config.default_node_width);
        assert_eq!(graph.nodes[0].height, config.default_node_height);
        assert_eq!(graph.nodes[1].width, 120.0);
        assert_eq!(graph.nodes[1].height, 30.0);
        assert!(graph.nodes[0].x >= 0.0 && graph.nodes[1].x >= 0.0);
    }

    #[test]
    fn dangling_edge_is_rejected_before_layout() {
        let mut graph = chain();
        graph.edges.push(Edge::new("c", "ghost"));
        let err = compute_layout(&mut graph, &LayoutConfig::default()).unwrap_err();
        assert!(matches!(err, LayoutError::MalformedGraph(_)));
        assert!(graph.nodes.iter().all(|n| n.width == 0.0));
    }

    #[test]
    fn nested_children_stay_inside_their_groups() {
        let mut graph = TestGraph::new();
        graph.nodes = vec![
            Node::new("outer").with_children(vec![
                Node::new("inner").with_children(vec![Node::new("x"), Node::new("y")]),
                Node::new("z"),
            ]),
            Node::new("w"),
        ];
        graph.edges = vec![Edge::new("x", "y"), Edge::new("y", "z"), Edge::new("z", "w")];
        let config = LayoutConfig::default();
        compute_layout(&mut graph, &config).unwrap();

        fn check(node: &Node<()>) {
            for child in &node.nodes {
                assert!(child.x >= 0.0 && child.y >= 0.0, "{} at {},{}", child.id, child.x, child.y);
                assert!(child.x + child.width <= node.width + 1e-3, "{} overflows {}", child.id, node.id);
                assert!(child.y + child.height <= node.height + 1e-3, "{} overflows {}", child.id, node.id);
                check(child);
            }
        }
        for node in &graph.nodes {
            assert!(node.x >= 0.0 && node.y >= 0.0);
            check(node);
        }
        let inner = &graph.nodes[0].nodes[0];
        assert!(inner.nodes[0].x >= config.group_padding - 1e-3);
    }

    #[test]
    fn edges_touching_groups_get_direct_routes() {
        let mut graph = TestGraph::new();
        graph.nodes = vec![
            Node::new("g").with_children(vec![Node::new("a")]),
            Node::new("b"),
        ];
        graph.edges = vec![Edge::new("g", "b")];
        compute_layout(&mut graph, &LayoutConfig::default()).unwrap();
        let rects = graph.absolute_rects();
        assert_eq!(graph.edges[0].points, vec![rects["g"].center(), rects["b"].center()]);
    }

    #[test]
    fn single_group_ranks_its_members_in_order() {
        let mut graph = TestGraph::new();
        graph.nodes = vec![
            Node::new("g").with_children(vec![Node::new("a"), Node::new("b")]),
            Node::new("c"),
        ];
        graph.edges = vec![Edge::new("a", "b"), Edge::new("b", "c")];
        compute_layout(&mut graph, &LayoutConfig::default()).unwrap();

        let rects = graph.absolute_rects();
        assert!(rects["a"].y < rects["b"].y && rects["b"].y < rects["c"].y);
        let group = rects["g"];
        for member in ["a", "b"] {
            let rect = rects[member];
            assert!(rect.x >= group.x && rect.right() <= group.right() + 1e-3, "{member} outside g");
            assert!(rect.y >= group.y && rect.bottom() <= group.bottom() + 1e-3, "{member} outside g");
        }
        assert!(graph.edges.iter().all(|edge| edge.points.len() >= 2));
    }

    #[test]
    fn group_members_without_sizes_get_defaults() {
        let mut graph = TestGraph::new();
        graph.nodes = vec![Node::new("g").with_children(vec![Node::new("a"), Node::new("b")])];
        let config = LayoutConfig::default();
        compute_layout(&mut graph, &config).unwrap();
        let group = &graph.nodes[0];
        for member in &group.nodes {
            assert_eq!(member.width, config.default_node_width);
            assert_eq!(member.height, config.default_node_height);
        }
        assert!(group.width >= config.default_node_width + 2.0 * config.group_padding - 1e-3);
        assert!(group.height >= config.default_node_height + 2.0 * config.group_padding - 1e-3);
    }

    #[test]
    fn engine_abort_becomes_malformed_graph() {
        assert_eq!(guard_engine(|| 3), Ok(3));
        let aborted: Result<()> = guard_engine(|| panic!("rank missing"));
        match aborted {
            Err(LayoutError::MalformedGraph(message)) => assert!(message.contains("rank missing")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_graph_is_a_no_op() {
        let mut graph = TestGraph::new();
        compute_layout(&mut graph, &LayoutConfig::default()).unwrap();
        assert_eq!(graph.width, 0.0);
    }
}
