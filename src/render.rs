use crate::graph::{Graph, Node, Point, traverse_graph};
use crate::theme::Theme;
use anyhow::Result;
use std::path::Path;

#[cfg(feature = "png")]
use crate::config::RenderConfig;
#[cfg(feature = "png")]
use crate::matrix::RgbaImage;

/// Renders a laid-out graph. Group nodes are drawn first (outermost first) so
/// their members stay visible, then edges, then leaf nodes.
pub fn render_svg<N, E>(graph: &Graph<N, E>, theme: &Theme) -> String {
    let mut svg = String::new();
    let width = graph.width.max(200.0);
    let height = graph.height.max(200.0);
    let rects = graph.absolute_rects();

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));
    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    ));
    svg.push_str("<defs>");
    svg.push_str(&format!(
        "<marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{}\"/></marker>",
        theme.line_color
    ));
    svg.push_str("</defs>");

    let mut leaves: Vec<&Node<N>> = Vec::new();
    traverse_graph(graph, |node, _, _| {
        let Some(rect) = rects.get(&node.id) else {
            return;
        };
        if !node.is_group() {
            leaves.push(node);
            return;
        }
        svg.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"10\" ry=\"10\" fill=\"{}\" stroke=\"{}\" stroke-dasharray=\"6 4\" stroke-width=\"1.2\"/>",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            theme.group_background,
            theme.group_border
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
            rect.x + 12.0,
            rect.y + 20.0,
            theme.font_family,
            theme.font_size,
            theme.node_text_color,
            escape_xml(display_label(node))
        ));
    });

    for edge in &graph.edges {
        if edge.points.len() < 2 {
            continue;
        }
        svg.push_str(&format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.4\" marker-end=\"url(#arrow)\"/>",
            points_to_path(&edge.points),
            theme.line_color
        ));
    }

    for node in leaves {
        let Some(rect) = rects.get(&node.id) else {
            continue;
        };
        svg.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"10\" ry=\"10\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1.4\"/>",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            theme.node_fill,
            theme.node_border_color
        ));
        let center = rect.center();
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
            center.x,
            center.y,
            theme.font_family,
            theme.font_size,
            theme.node_text_color,
            escape_xml(display_label(node))
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Placeholder drawn in place of a graph that could not be laid out.
pub fn render_fallback_svg(message: &str, theme: &Theme) -> String {
    let width = 480.0;
    let height = 120.0;
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\"><rect width=\"100%\" height=\"100%\" fill=\"{}\"/><rect x=\"8\" y=\"8\" width=\"{:.2}\" height=\"{:.2}\" rx=\"8\" ry=\"8\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.4\"/><text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text></svg>",
        theme.background,
        width - 16.0,
        height - 16.0,
        theme.error_color,
        width / 2.0,
        height / 2.0,
        theme.font_family,
        theme.font_size,
        theme.error_color,
        escape_xml(message)
    )
}

fn display_label<N>(node: &Node<N>) -> &str {
    if node.label.is_empty() {
        node.id.as_str()
    } else {
        node.label.as_str()
    }
}

fn points_to_path(points: &[Point]) -> String {
    let Some(first) = points.first() else {
        return String::new();
    };
    let mut d = format!("M {:.2} {:.2}", first.x, first.y);
    for point in points.iter().skip(1) {
        d.push_str(&format!(" L {:.2} {:.2}", point.x, point.y));
    }
    d
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig, theme: &Theme) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = theme
        .font_family
        .split(',')
        .next()
        .map(|family| family.trim().trim_matches('"').to_string())
        .unwrap_or_else(|| "sans-serif".to_string());
    opt.default_size = usvg::Size::from_wh(render_cfg.width, render_cfg.height)
        .ok_or_else(|| anyhow::anyhow!("invalid render size {}x{}", render_cfg.width, render_cfg.height))?;

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

/// Writes a rasterized matrix. Pixels are premultiplied on the way into the
/// pixmap, which stores premultiplied RGBA.
#[cfg(feature = "png")]
pub fn write_matrix_png(image: &RgbaImage, output: &Path) -> Result<()> {
    let size = resvg::tiny_skia::IntSize::from_wh(image.width, image.height)
        .ok_or_else(|| anyhow::anyhow!("cannot encode an empty {}x{} image", image.width, image.height))?;
    let data = image
        .pixels
        .chunks_exact(4)
        .flat_map(|px| {
            let a = px[3] as u16;
            let scale = |c: u8| ((c as u16 * a + 127) / 255) as u8;
            [scale(px[0]), scale(px[1]), scale(px[2]), px[3]]
        })
        .collect();
    let pixmap = resvg::tiny_skia::Pixmap::from_vec(data, size)
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;
    pixmap.save_png(output)?;
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
