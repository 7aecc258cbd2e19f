use crate::graph::{Graph, traverse_graph};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Flat view of a laid-out graph in absolute canvas coordinates, for
/// consumers that do not want to walk the nesting.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub label: String,
    pub parent: Option<String>,
    pub depth: usize,
    pub group: bool,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_graph<N, E>(graph: &Graph<N, E>) -> Self {
        let rects = graph.absolute_rects();
        let mut nodes = Vec::with_capacity(graph.node_count());
        traverse_graph(graph, |node, parent, depth| {
            let rect = rects.get(&node.id).copied().unwrap_or_else(|| node.rect());
            nodes.push(NodeDump {
                id: node.id.clone(),
                label: node.label.clone(),
                parent: parent.map(|p| p.id.clone()),
                depth,
                group: node.is_group(),
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        });

        let edges = graph
            .edges
            .iter()
            .map(|edge| EdgeDump {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
            })
            .collect();

        LayoutDump {
            width: graph.width,
            height: graph.height,
            nodes,
            edges,
        }
    }
}

pub fn write_layout_dump<N, E>(path: &Path, graph: &Graph<N, E>) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_graph(graph);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
