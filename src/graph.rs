use crate::error::{LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box with a top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn expand(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    /// Strict interior test; points on the border are outside.
    pub fn contains(&self, point: Point) -> bool {
        point.x > self.x && point.x < self.right() && point.y > self.y && point.y < self.bottom()
    }

    /// Strict overlap test; touching edges do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

/// A node of the nested graph. A node with children is a group; children
/// coordinates are relative to the group's top-left corner once laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<N = serde_json::Value> {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    /// `0` means "not declared": the layout engine default applies.
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub data: N,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node<N>>,
}

impl<N: Default> Node<N> {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            data: N::default(),
            nodes: Vec::new(),
        }
    }
}

impl<N> Node<N> {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_data(mut self, data: N) -> Self {
        self.data = data;
        self
    }

    pub fn with_children(mut self, children: Vec<Node<N>>) -> Self {
        self.nodes = children;
        self
    }

    pub fn is_group(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn has_declared_size(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<E = serde_json::Value> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    /// Absolute coordinates, never parent-relative.
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub data: E,
}

impl<E: Default> Edge<E> {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            points: Vec::new(),
            data: E::default(),
        }
    }
}

impl<E> Edge<E> {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: E) -> Self {
        self.data = data;
        self
    }

    /// Human readable name for diagnostics.
    pub fn describe(&self) -> String {
        match &self.id {
            Some(id) => format!("'{id}'"),
            None => format!("{} -> {}", self.source, self.target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph<N = serde_json::Value, E = serde_json::Value> {
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub nodes: Vec<Node<N>>,
    #[serde(default)]
    pub edges: Vec<Edge<E>>,
}

impl<N, E> Default for Graph<N, E> {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<N, E> Graph<N, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        traverse_graph(self, |_, _, _| count += 1);
        count
    }

    pub fn is_compound(&self) -> bool {
        self.nodes.iter().any(Node::is_group)
    }

    pub fn find_node(&self, id: &str) -> Option<&Node<N>> {
        let mut found = None;
        traverse_graph(self, |node, _, _| {
            if found.is_none() && node.id == id {
                found = Some(node);
            }
        });
        found
    }

    /// Child id -> parent id for every nested node.
    pub fn parent_map(&self) -> HashMap<String, String> {
        let mut parents = HashMap::new();
        traverse_graph(self, |node, parent, _| {
            if let Some(parent) = parent {
                parents.insert(node.id.clone(), parent.id.clone());
            }
        });
        parents
    }

    /// Absolute boxes for every node, resolving parent-relative coordinates.
    pub fn absolute_rects(&self) -> HashMap<String, Rect> {
        let mut rects: HashMap<String, Rect> = HashMap::new();
        traverse_graph(self, |node, parent, _| {
            let origin = parent
                .and_then(|p| rects.get(&p.id))
                .map(|r| Point::new(r.x, r.y))
                .unwrap_or_default();
            rects.insert(
                node.id.clone(),
                Rect::new(origin.x + node.x, origin.y + node.y, node.width, node.height),
            );
        });
        rects
    }

    /// Rejects empty or duplicated node ids and edges whose endpoints are not
    /// in the tree.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut problem: Option<LayoutError> = None;
        traverse_graph(self, |node, _, _| {
            if problem.is_some() {
                return;
            }
            if node.id.is_empty() {
                problem = Some(LayoutError::MalformedGraph("node with empty id".to_string()));
            } else if !seen.insert(node.id.as_str()) {
                problem = Some(LayoutError::duplicate_id(&node.id));
            }
        });
        if let Some(err) = problem {
            return Err(err);
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(LayoutError::dangling_endpoint(&edge.describe(), endpoint));
                }
            }
        }
        Ok(())
    }
}

/// Visits every node in pre-order: a parent always before its children,
/// siblings in insertion order. `depth` is 0 for top-level nodes.
pub fn traverse_graph<'a, N, E, F>(graph: &'a Graph<N, E>, mut visit: F)
where
    F: FnMut(&'a Node<N>, Option<&'a Node<N>>, usize),
{
    fn walk<'a, N, F>(nodes: &'a [Node<N>], parent: Option<&'a Node<N>>, depth: usize, visit: &mut F)
    where
        F: FnMut(&'a Node<N>, Option<&'a Node<N>>, usize),
    {
        for node in nodes {
            visit(node, parent, depth);
            if node.is_group() {
                walk(&node.nodes, Some(node), depth + 1, visit);
            }
        }
    }

    walk(&graph.nodes, None, 0, &mut visit);
}

/// Mutable pre-order traversal. The parent is identified by id; it has
/// already been visited when its children are.
pub fn traverse_graph_mut<N, E, F>(graph: &mut Graph<N, E>, mut visit: F)
where
    F: FnMut(&mut Node<N>, Option<&str>, usize),
{
    fn walk<N, F>(nodes: &mut [Node<N>], parent: Option<&str>, depth: usize, visit: &mut F)
    where
        F: FnMut(&mut Node<N>, Option<&str>, usize),
    {
        for node in nodes.iter_mut() {
            visit(node, parent, depth);
            let Node {
                id, nodes: children, ..
            } = node;
            if !children.is_empty() {
                walk(children, Some(id.as_str()), depth + 1, visit);
            }
        }
    }

    walk(&mut graph.nodes, None, 0, &mut visit);
}
