#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod layout;
pub mod layout_dump;
pub mod matrix;
pub mod render;
pub mod theme;
pub mod worker;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, MatrixConfig, RankDir, RouterConfig};
pub use error::{LayoutError, Result};
pub use graph::{Edge, Graph, Node, Point, Rect, traverse_graph, traverse_graph_mut};
pub use layout::{compute_layout, layout_graph, route_edge};
pub use worker::{LayoutTicket, LayoutWorker};

use crate::render::{render_fallback_svg, render_svg};
use crate::theme::Theme;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub theme: Theme,
    pub layout: LayoutConfig,
}

impl RenderOptions {
    pub fn modern() -> Self {
        Self {
            theme: Theme::modern(),
            layout: LayoutConfig::default(),
        }
    }

    pub fn classic() -> Self {
        Self {
            theme: Theme::classic(),
            layout: LayoutConfig::default(),
        }
    }

    pub fn with_router(mut self, enabled: bool) -> Self {
        self.layout.router.enabled = enabled;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::modern()
    }
}

/// Lays out a JSON graph and returns it, positions filled in, as JSON.
pub fn layout_json(graph_json: &str, config: &LayoutConfig) -> anyhow::Result<String> {
    let graph: Graph = serde_json::from_str(graph_json)?;
    let graph = layout_graph(graph, config)?;
    Ok(serde_json::to_string(&graph)?)
}

/// Renders a JSON graph to SVG. Unparseable input is an error; a graph the
/// layout rejects renders as a placeholder carrying the reason.
pub fn render_with_options(graph_json: &str, options: RenderOptions) -> anyhow::Result<String> {
    let mut graph: Graph = serde_json::from_str(graph_json)?;
    match compute_layout(&mut graph, &options.layout) {
        Ok(()) => Ok(render_svg(&graph, &options.theme)),
        Err(err) => {
            warn!(error = %err, "rendering placeholder for rejected graph");
            Ok(render_fallback_svg(&err.to_string(), &options.theme))
        }
    }
}
