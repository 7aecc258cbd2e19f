use model_graph_renderer::{RankDir, RenderOptions, layout_json, render_with_options};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRenderOptions {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    rankdir: Option<RankDir>,
    route: Option<bool>,
}

fn build_render_options(options: GraphRenderOptions) -> RenderOptions {
    let mut render_options = if matches!(options.theme.as_deref(), Some("classic" | "default")) {
        RenderOptions::classic()
    } else {
        RenderOptions::modern()
    };

    if let Some(font_family) = options.font_family {
        render_options.theme.font_family = font_family;
    }
    if let Some(font_size) = options.font_size {
        render_options.theme.font_size = font_size;
    }
    if let Some(rankdir) = options.rankdir {
        render_options.layout.rankdir = rankdir;
    }
    render_options.with_router(options.route.unwrap_or(false))
}

fn parse_options(options_json: Option<String>) -> Result<GraphRenderOptions, JsValue> {
    match options_json {
        Some(raw_options) => serde_json::from_str::<GraphRenderOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string())),
        None => Ok(GraphRenderOptions::default()),
    }
}

#[wasm_bindgen]
pub fn render_graph_svg(graph_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let render_options = build_render_options(parse_options(options_json)?);
    render_with_options(graph_json, render_options).map_err(|error| JsValue::from_str(&error.to_string()))
}

/// Returns the input graph with positions, sizes and edge routes filled in.
#[wasm_bindgen]
pub fn layout_graph_json(graph_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let render_options = build_render_options(parse_options(options_json)?);
    layout_json(graph_json, &render_options.layout).map_err(|error| JsValue::from_str(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use model_graph_renderer::render_with_options;

    use crate::{GraphRenderOptions, build_render_options};

    #[test]
    fn renders_nested_model_graph() {
        let graph = r#"{
            "nodes": [
                { "id": "S", "label": "Susceptible" },
                { "id": "Inf", "label": "Infected", "nodes": [
                    { "id": "I1", "label": "mild" },
                    { "id": "I2", "label": "severe" }
                ]},
                { "id": "R", "label": "Recovered" }
            ],
            "edges": [
                { "source": "S", "target": "I1" },
                { "source": "I1", "target": "I2" },
                { "source": "I2", "target": "R" }
            ]
        }"#;

        let options: GraphRenderOptions =
            serde_json::from_str(r#"{ "theme": "classic", "rankdir": "LR", "route": true }"#).unwrap();
        let render_options = build_render_options(options);
        assert!(render_options.layout.router.enabled);

        let svg = render_with_options(graph, render_options).expect("nested graph should render");

        assert!(svg.contains("<svg"));
        assert!(svg.contains("Susceptible"));
        assert!(svg.contains("severe"));
    }
}
