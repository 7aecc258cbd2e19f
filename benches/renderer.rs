use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use model_graph_renderer::config::{LayoutConfig, MatrixConfig, RouterConfig};
use model_graph_renderer::graph::{Edge, Graph, Node, Point, Rect};
use model_graph_renderer::layout::{compute_layout, route_edge};
use model_graph_renderer::matrix::{MatrixBuffers, ShaderVariant, Viewport, micro_index, rasterize};
use model_graph_renderer::render::render_svg;
use model_graph_renderer::theme::Theme;
use std::hint::black_box;

/// A chain of `nodes` with `extra_edges` forward skips, grouped into strata of
/// `group_size` nodes when `group_size > 0`.
fn dense_graph(nodes: usize, extra_edges: usize, group_size: usize) -> Graph<(), ()> {
    let leaves: Vec<Node<()>> = (0..nodes).map(|i| Node::new(format!("N{i}"))).collect();
    let mut graph = Graph::new();
    graph.nodes = if group_size == 0 {
        leaves
    } else {
        leaves
            .chunks(group_size)
            .enumerate()
            .map(|(idx, chunk)| Node::new(format!("G{idx}")).with_children(chunk.to_vec()))
            .collect()
    };
    for i in 0..nodes.saturating_sub(1) {
        graph.edges.push(Edge::new(format!("N{i}"), format!("N{}", i + 1)));
    }
    let mut count = 0usize;
    'outer: for i in 0..nodes {
        for j in (i + 2)..nodes {
            if count >= extra_edges {
                break 'outer;
            }
            graph.edges.push(Edge::new(format!("N{i}"), format!("N{j}")));
            count += 1;
        }
    }
    graph
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let config = LayoutConfig::default();
    for (name, graph) in [
        ("chain_10", dense_graph(10, 0, 0)),
        ("dense_40_80", dense_graph(40, 80, 0)),
        ("nested_40_80", dense_graph(40, 80, 8)),
        ("nested_80_160", dense_graph(80, 160, 10)),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &graph, |b, graph| {
            b.iter(|| {
                let mut graph = black_box(graph).clone();
                compute_layout(&mut graph, &config).expect("layout failed");
                black_box(graph.width);
            });
        });
    }
    group.finish();
}

fn bench_edge_routing_grid_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_edge_routing_grid_modes");
    let config_engine = LayoutConfig::default();
    let mut config_grid = LayoutConfig::default();
    config_grid.router.enabled = true;

    for (nodes, extra_edges) in [(20usize, 30usize), (40, 80)] {
        let name = format!("dense_{nodes}_{extra_edges}");
        let graph = dense_graph(nodes, extra_edges, 5);
        for (mode, config) in [("engine", &config_engine), ("grid", &config_grid)] {
            group.bench_with_input(BenchmarkId::new(mode, &name), &graph, |b, graph| {
                b.iter(|| {
                    let mut graph = black_box(graph).clone();
                    compute_layout(&mut graph, config).expect("layout failed");
                    black_box(graph.edges.len());
                });
            });
        }
    }
    group.finish();
}

fn bench_route_edge(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_edge");
    let config = RouterConfig::default();
    for size in [4usize, 8, 16] {
        // A wall of boxes between the endpoints with a single gap at the far end.
        let obstacles: Vec<Rect> = (0..size)
            .map(|i| Rect::new(200.0, i as f32 * 40.0, 40.0, 36.0))
            .collect();
        let start = Point::new(0.0, 20.0);
        let end = Point::new(400.0, 20.0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &obstacles, |b, obstacles| {
            b.iter(|| {
                let path = route_edge(black_box(start), black_box(end), obstacles, &config);
                black_box(path.len());
            });
        });
    }
    group.finish();
}

fn bench_render_svg(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_svg");
    let theme = Theme::modern();
    let mut graph = dense_graph(60, 120, 6);
    compute_layout(&mut graph, &LayoutConfig::default()).expect("layout failed");
    group.bench_function("nested_60_120", |b| {
        b.iter(|| black_box(render_svg(black_box(&graph), &theme)).len());
    });
    group.finish();
}

fn stratified_matrix(rows: usize, cols: usize, span: usize) -> MatrixBuffers {
    let color = (0..rows * cols)
        .map(|i| [(i * 37 % 256) as u8, (i * 91 % 256) as u8, (i * 13 % 256) as u8, 255])
        .collect();
    MatrixBuffers::new(
        rows,
        cols,
        color,
        micro_index(&vec![span; rows]),
        micro_index(&vec![span; cols]),
    )
    .expect("matrix buffers")
}

fn bench_rasterize(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize");
    let config = MatrixConfig::default();
    for (rows, cols, span) in [(8usize, 8usize, 4usize), (32, 32, 3), (64, 64, 2)] {
        let buffers = stratified_matrix(rows, cols, span);
        let viewport = Viewport::fit(&buffers, 512, 512);
        let name = format!("{rows}x{cols}_span{span}");
        for (mode, variant) in [("cells", ShaderVariant::Cells), ("grid", ShaderVariant::CellsWithGrid)] {
            group.bench_with_input(BenchmarkId::new(mode, &name), &buffers, |b, buffers| {
                b.iter(|| {
                    let image = rasterize(black_box(buffers), &viewport, variant, &config)
                        .expect("rasterize failed");
                    black_box(image.pixels.len());
                });
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_layout,
    bench_edge_routing_grid_modes,
    bench_route_edge,
    bench_render_svg,
    bench_rasterize
);
criterion_main!(benches);
