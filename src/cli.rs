use crate::config::{Config, RankDir, load_config};
use crate::graph::Graph;
use crate::layout::compute_layout;
use crate::layout_dump::write_layout_dump;
use crate::matrix::{CellMatrix, MatrixBuffers, ShaderVariant, Viewport, rasterize};
use crate::render::{render_svg, write_output_svg};
use crate::theme::parse_hex_rgba;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "mgr", version, about = "Model graph layout and matrix renderer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lay out a nested graph (JSON) and write JSON, SVG or PNG
    Layout(LayoutArgs),
    /// Rasterize a stratified cell matrix (JSON) to PNG
    Matrix(MatrixArgs),
}

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// Input graph (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format. Inferred from the output extension when omitted.
    #[arg(short = 'e', long = "outputFormat", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Config JSON5 file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Reroute edges around nodes with the grid router
    #[arg(long = "route")]
    pub route: bool,

    /// Layering direction
    #[arg(short = 'd', long = "direction", value_enum)]
    pub direction: Option<Direction>,

    /// Also write a flat absolute-coordinate dump to this path
    #[arg(long = "dump")]
    pub dump: Option<PathBuf>,

    /// Width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,
}

#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Input matrix (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output PNG file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Config JSON5 file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Draw logical and micro grid lines
    #[arg(long = "grid")]
    pub grid: bool,

    /// Pixels per micro cell. Fits the matrix to the image when omitted.
    #[arg(long = "zoom")]
    pub zoom: Option<f32>,

    /// Width
    #[arg(short = 'w', long = "width", default_value_t = 800)]
    pub width: u32,

    /// Height
    #[arg(short = 'H', long = "height", default_value_t = 600)]
    pub height: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Svg,
    Png,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tb,
    Bt,
    Lr,
    Rl,
}

impl From<Direction> for RankDir {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Tb => RankDir::TopBottom,
            Direction::Bt => RankDir::BottomTop,
            Direction::Lr => RankDir::LeftRight,
            Direction::Rl => RankDir::RightLeft,
        }
    }
}

/// Matrix input: sparse colored cells plus optional micro spans per logical
/// row/column (one micro cell each when absent).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixInput {
    rows: usize,
    cols: usize,
    #[serde(default)]
    cells: Vec<CellInput>,
    row_spans: Option<Vec<usize>>,
    col_spans: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
struct CellInput {
    row: usize,
    col: usize,
    color: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Layout(args) => run_layout(args),
        Command::Matrix(args) => run_matrix(args),
    }
}

fn run_layout(args: LayoutArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.route {
        config.layout.router.enabled = true;
    }
    if let Some(direction) = args.direction {
        config.layout.rankdir = direction.into();
    }
    if let Some(width) = args.width {
        config.render.width = width;
    }
    if let Some(height) = args.height {
        config.render.height = height;
    }

    let input = read_input(args.input.as_deref())?;
    let mut graph: Graph = serde_json::from_str(&input)?;
    compute_layout(&mut graph, &config.layout)?;

    if let Some(dump) = args.dump.as_deref() {
        write_layout_dump(dump, &graph)?;
    }

    let format = args
        .output_format
        .unwrap_or_else(|| infer_format(args.output.as_deref()));
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&graph)?;
            match args.output.as_deref() {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        OutputFormat::Svg => {
            let svg = render_svg(&graph, &config.theme);
            write_output_svg(&svg, args.output.as_deref())?;
        }
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            let svg = render_svg(&graph, &config.theme);
            write_png(&svg, &output, &config)?;
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: &Path, config: &Config) -> Result<()> {
    crate::render::write_output_png(svg, output, &config.render, &config.theme)
}

#[cfg(not(feature = "png"))]
fn write_png(_svg: &str, _output: &Path, _config: &Config) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the 'png' feature"))
}

fn run_matrix(args: MatrixArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let input: MatrixInput = serde_json::from_str(&read_input(args.input.as_deref())?)?;
    let buffers = build_matrix_buffers(&input, &config)?;

    let viewport = match args.zoom {
        Some(zoom) => Viewport {
            width: args.width,
            height: args.height,
            zoom,
            offset_x: 0.0,
            offset_y: 0.0,
        },
        None => Viewport::fit(&buffers, args.width, args.height),
    };
    let variant = if args.grid {
        ShaderVariant::CellsWithGrid
    } else {
        ShaderVariant::Cells
    };
    let image = rasterize(&buffers, &viewport, variant, &config.matrix)?;
    write_matrix(&image, &args.output)
}

#[cfg(feature = "png")]
fn write_matrix(image: &crate::matrix::RgbaImage, output: &Path) -> Result<()> {
    crate::render::write_matrix_png(image, output)
}

#[cfg(not(feature = "png"))]
fn write_matrix(_image: &crate::matrix::RgbaImage, _output: &Path) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the 'png' feature"))
}

fn build_matrix_buffers(input: &MatrixInput, config: &Config) -> Result<MatrixBuffers> {
    let background = parse_hex_rgba(&config.matrix.background)
        .ok_or_else(|| anyhow::anyhow!("unsupported color '{}'", config.matrix.background))?;
    let mut entries = Vec::with_capacity(input.cells.len());
    for cell in &input.cells {
        let color = parse_hex_rgba(&cell.color).ok_or_else(|| {
            anyhow::anyhow!("cell ({}, {}): unsupported color '{}'", cell.row, cell.col, cell.color)
        })?;
        entries.push((cell.row, cell.col, Some(color)));
    }
    let matrix = CellMatrix::from_cells(input.rows, input.cols, entries)?;
    let row_spans = input.row_spans.clone().unwrap_or_else(|| vec![1; input.rows]);
    let col_spans = input.col_spans.clone().unwrap_or_else(|| vec![1; input.cols]);
    let buffers = MatrixBuffers::from_matrix(&matrix, &row_spans, &col_spans, |cell| {
        cell.data.unwrap_or(background)
    })?;
    Ok(buffers)
}

fn infer_format(output: Option<&Path>) -> OutputFormat {
    match output
        .and_then(|path| path.extension())
        .and_then(|ext| ext.to_str())
    {
        Some("svg") => OutputFormat::Svg,
        Some("png") => OutputFormat::Png,
        _ => OutputFormat::Json,
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_follows_extension() {
        assert_eq!(infer_format(Some(Path::new("out.svg"))), OutputFormat::Svg);
        assert_eq!(infer_format(Some(Path::new("out.png"))), OutputFormat::Png);
        assert_eq!(infer_format(Some(Path::new("out.json"))), OutputFormat::Json);
        assert_eq!(infer_format(None), OutputFormat::Json);
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["mgr", "layout", "-i", "g.json", "--route", "-d", "lr"]).unwrap();
        match cli.command {
            Command::Layout(args) => {
                assert!(args.route);
                assert_eq!(args.direction, Some(Direction::Lr));
            }
            Command::Matrix(_) => panic!("expected layout"),
        }
        let cli = Cli::try_parse_from(["mgr", "matrix", "-o", "m.png", "--grid", "--zoom", "12"]).unwrap();
        match cli.command {
            Command::Matrix(args) => {
                assert!(args.grid);
                assert_eq!(args.zoom, Some(12.0));
                assert_eq!(args.width, 800);
            }
            Command::Layout(_) => panic!("expected matrix"),
        }
        assert!(Cli::try_parse_from(["mgr", "matrix"]).is_err());
    }

    #[test]
    fn matrix_input_fills_missing_cells_with_background() {
        let input: MatrixInput = serde_json::from_str(
            r##"{
                "rows": 2, "cols": 2,
                "cells": [{ "row": 0, "col": 1, "color": "#ff0000" }],
                "rowSpans": [2, 1]
            }"##,
        )
        .unwrap();
        let buffers = build_matrix_buffers(&input, &Config::default()).unwrap();
        assert_eq!(buffers.micro_height(), 3);
        assert_eq!(buffers.micro_width(), 2);
        assert_eq!(buffers.color_at(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(buffers.color_at(0, 2), Some([255, 255, 255, 255]));
    }
}
