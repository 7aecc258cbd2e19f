//! Dense cell-matrix rendering for stratified models.
//!
//! A logical `rows × cols` grid is drawn from three lookup tables: a color
//! per logical cell, and two micro index tables mapping every micro row and
//! micro column to the logical row/column it belongs to. The same fragment
//! logic backs the CPU rasterizer ([`raster`]) and the WGSL shader used by the
//! `gpu` feature.

pub mod raster;
pub mod texture;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use raster::{RgbaImage, Viewport, rasterize};
pub use texture::{
    BufferDescriptor, DataTexture, HostDevice, HostTexture, TexelFormat, TexelType, TextureData,
    TextureUpload,
};

use crate::config::GridLineConfig;
use crate::error::{LayoutError, Result};
use crate::theme::parse_hex_rgba;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell<T> {
    pub row: usize,
    pub col: usize,
    /// Flat index, `row * cols + col`.
    #[serde(rename = "_idx")]
    pub idx: usize,
    pub data: T,
}

/// Row-major dense grid of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMatrix<T> {
    rows: usize,
    cols: usize,
    cells: Vec<MatrixCell<T>>,
}

impl<T: Default> CellMatrix<T> {
    /// Pivots sparse `(row, col, data)` entries into a dense grid. Missing
    /// cells hold `T::default()`; a later entry for the same cell wins.
    pub fn from_cells<I>(rows: usize, cols: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, T)>,
    {
        let mut cells: Vec<MatrixCell<T>> = (0..rows * cols)
            .map(|idx| MatrixCell {
                row: idx / cols.max(1),
                col: idx % cols.max(1),
                idx,
                data: T::default(),
            })
            .collect();
        for (row, col, data) in entries {
            if row >= rows || col >= cols {
                return Err(LayoutError::InvalidMatrix(format!(
                    "cell ({row}, {col}) outside a {rows}x{cols} matrix"
                )));
            }
            cells[row * cols + col].data = data;
        }
        Ok(Self { rows, cols, cells })
    }
}

impl<T> CellMatrix<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&MatrixCell<T>> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatrixCell<T>> {
        self.cells.iter()
    }
}

/// Expands per-logical spans into a micro lookup table: `[2, 1]` becomes
/// `[0, 0, 1]`.
pub fn micro_index(spans: &[usize]) -> Vec<u32> {
    spans
        .iter()
        .enumerate()
        .flat_map(|(logical, &span)| std::iter::repeat_n(logical as u32, span))
        .collect()
}

/// CPU-side copies of the three lookup tables, validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBuffers {
    rows: usize,
    cols: usize,
    color: Vec<[u8; 4]>,
    micro_row: Vec<u32>,
    micro_col: Vec<u32>,
}

impl MatrixBuffers {
    pub fn new(
        rows: usize,
        cols: usize,
        color: Vec<[u8; 4]>,
        micro_row: Vec<u32>,
        micro_col: Vec<u32>,
    ) -> Result<Self> {
        if color.len() != rows * cols {
            return Err(LayoutError::InvalidMatrix(format!(
                "color buffer holds {} entries, expected {rows}x{cols}",
                color.len()
            )));
        }
        if let Some(bad) = micro_row.iter().find(|&&row| row as usize >= rows) {
            return Err(LayoutError::InvalidMatrix(format!(
                "micro row maps to logical row {bad}, matrix has {rows}"
            )));
        }
        if let Some(bad) = micro_col.iter().find(|&&col| col as usize >= cols) {
            return Err(LayoutError::InvalidMatrix(format!(
                "micro column maps to logical column {bad}, matrix has {cols}"
            )));
        }
        Ok(Self {
            rows,
            cols,
            color,
            micro_row,
            micro_col,
        })
    }

    /// One micro cell per logical cell.
    pub fn identity(rows: usize, cols: usize, color: Vec<[u8; 4]>) -> Result<Self> {
        Self::new(
            rows,
            cols,
            color,
            micro_index(&vec![1; rows]),
            micro_index(&vec![1; cols]),
        )
    }

    pub fn from_matrix<T, F>(
        matrix: &CellMatrix<T>,
        row_spans: &[usize],
        col_spans: &[usize],
        color_of: F,
    ) -> Result<Self>
    where
        F: Fn(&MatrixCell<T>) -> [u8; 4],
    {
        if row_spans.len() != matrix.rows() || col_spans.len() != matrix.cols() {
            return Err(LayoutError::InvalidMatrix(format!(
                "span lists describe {}x{} cells, matrix is {}x{}",
                row_spans.len(),
                col_spans.len(),
                matrix.rows(),
                matrix.cols()
            )));
        }
        Self::new(
            matrix.rows(),
            matrix.cols(),
            matrix.iter().map(color_of).collect(),
            micro_index(row_spans),
            micro_index(col_spans),
        )
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn micro_width(&self) -> usize {
        self.micro_col.len()
    }

    pub fn micro_height(&self) -> usize {
        self.micro_row.len()
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.color
    }

    pub fn micro_rows(&self) -> &[u32] {
        &self.micro_row
    }

    pub fn micro_cols(&self) -> &[u32] {
        &self.micro_col
    }

    /// Color-buffer index for a micro cell: `col + row * cols`.
    pub fn cell_index_at(&self, micro_x: usize, micro_y: usize) -> Option<usize> {
        let col = *self.micro_col.get(micro_x)? as usize;
        let row = *self.micro_row.get(micro_y)? as usize;
        Some(col + row * self.cols)
    }

    pub fn color_at(&self, micro_x: usize, micro_y: usize) -> Option<[u8; 4]> {
        self.cell_index_at(micro_x, micro_y)
            .and_then(|idx| self.color.get(idx).copied())
    }

    /// Texture set for upload: `uColor` is `cols × rows` RGBA, the micro
    /// tables are one texel high and keep their raw `u32` values.
    pub fn to_textures(&self) -> Result<MatrixTextures> {
        Ok(MatrixTextures {
            color: DataTexture::color_grid("uColor", self.rows as u32, self.cols as u32, &self.color)?,
            micro_row: DataTexture::index_row("uMicroRow", &self.micro_row)?,
            micro_col: DataTexture::index_row("uMicroCol", &self.micro_col)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MatrixTextures {
    pub color: DataTexture,
    pub micro_row: DataTexture,
    pub micro_col: DataTexture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShaderVariant {
    #[default]
    Cells,
    CellsWithGrid,
}

/// Which kind of line separates a micro cell from its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    None,
    Micro,
    Logical,
}

pub fn boundary_before(micro: &[u32], index: usize) -> Boundary {
    if index == 0 || index >= micro.len() {
        return Boundary::None;
    }
    if micro[index] != micro[index - 1] {
        Boundary::Logical
    } else {
        Boundary::Micro
    }
}

/// Opacity ramp for grid lines: 0 below `fade_in`, 1 from `full` up.
pub fn line_fade(zoom: f32, fade_in: f32, full: f32) -> f32 {
    if full <= fade_in {
        return if zoom >= full { 1.0 } else { 0.0 };
    }
    let t = ((zoom - fade_in) / (full - fade_in)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Parsed form of [`GridLineConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridStyle {
    pub logical_fade: (f32, f32),
    pub micro_fade: (f32, f32),
    pub line_width: f32,
    pub logical_color: [u8; 4],
    pub micro_color: [u8; 4],
}

impl GridStyle {
    pub fn from_config(config: &GridLineConfig) -> Result<Self> {
        let color = |value: &str| {
            parse_hex_rgba(value)
                .ok_or_else(|| LayoutError::InvalidMatrix(format!("unsupported color '{value}'")))
        };
        Ok(Self {
            logical_fade: (config.logical_fade_in, config.logical_full),
            micro_fade: (config.micro_fade_in, config.micro_full),
            line_width: config.line_width.max(0.0),
            logical_color: color(&config.logical_color)?,
            micro_color: color(&config.micro_color)?,
        })
    }

    /// Line color and opacity for a fragment `frac_px` pixels past the
    /// top-left corner of its micro cell.
    pub fn overlay(
        &self,
        left: Boundary,
        top: Boundary,
        frac_px: (f32, f32),
        zoom: f32,
    ) -> Option<([u8; 4], f32)> {
        let mut logical: f32 = 0.0;
        let mut micro: f32 = 0.0;
        for (boundary, offset) in [(left, frac_px.0), (top, frac_px.1)] {
            if offset >= self.line_width {
                continue;
            }
            match boundary {
                Boundary::Logical => {
                    logical = logical.max(line_fade(zoom, self.logical_fade.0, self.logical_fade.1))
                }
                Boundary::Micro => {
                    micro = micro.max(line_fade(zoom, self.micro_fade.0, self.micro_fade.1))
                }
                Boundary::None => {}
            }
        }
        if logical > 0.0 {
            Some((self.logical_color, logical))
        } else if micro > 0.0 {
            Some((self.micro_color, micro))
        } else {
            None
        }
    }
}

impl Default for GridStyle {
    fn default() -> Self {
        let config = GridLineConfig::default();
        Self {
            logical_fade: (config.logical_fade_in, config.logical_full),
            micro_fade: (config.micro_fade_in, config.micro_full),
            line_width: config.line_width,
            logical_color: [0x33, 0x33, 0x33, 255],
            micro_color: [0x9A, 0xA4, 0xB2, 255],
        }
    }
}

/// Straight-alpha blend of `line` over `base`, scaled by `opacity`.
pub fn blend(base: [u8; 4], line: [u8; 4], opacity: f32) -> [u8; 4] {
    let a = (opacity * line[3] as f32 / 255.0).clamp(0.0, 1.0);
    let mix = |b: u8, l: u8| (l as f32 * a + b as f32 * (1.0 - a)).round() as u8;
    [
        mix(base[0], line[0]),
        mix(base[1], line[1]),
        mix(base[2], line[2]),
        base[3].max((a * 255.0).round() as u8),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette(n: usize) -> Vec<[u8; 4]> {
        (0..n).map(|i| [i as u8 * 10, 0, 0, 255]).collect()
    }

    #[test]
    fn identity_grid_resolves_flat_index() {
        let buffers = MatrixBuffers::identity(3, 3, palette(9)).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(buffers.cell_index_at(i, j), Some(i + j * 3));
                assert_eq!(buffers.color_at(i, j), Some(palette(9)[i + j * 3]));
            }
        }
        assert_eq!(buffers.cell_index_at(3, 0), None);
    }

    #[test]
    fn spans_expand_to_micro_tables() {
        assert_eq!(micro_index(&[2, 1, 3]), vec![0, 0, 1, 2, 2, 2]);
        assert!(micro_index(&[]).is_empty());
    }

    #[test]
    fn stratified_cells_share_logical_color() {
        let matrix = CellMatrix::from_cells(2, 2, [(0, 0, 1u8), (1, 1, 4u8)]).unwrap();
        assert_eq!(matrix.get(1, 1).unwrap().idx, 3);
        let buffers =
            MatrixBuffers::from_matrix(&matrix, &[2, 1], &[1, 3], |cell| [cell.data, 0, 0, 255])
                .unwrap();
        assert_eq!(buffers.micro_height(), 3);
        assert_eq!(buffers.micro_width(), 4);
        assert_eq!(buffers.color_at(0, 1), Some([1, 0, 0, 255]));
        // Every micro cell of logical (1, 1) shares its color.
        for x in 1..4 {
            assert_eq!(buffers.color_at(x, 2), Some([4, 0, 0, 255]));
        }
        // Logical (1, 0) was never given data.
        assert_eq!(buffers.color_at(0, 2), Some([0, 0, 0, 255]));
    }

    #[test]
    fn invalid_micro_entries_are_rejected() {
        let err = MatrixBuffers::new(2, 2, palette(4), vec![0, 2], vec![0, 1]).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidMatrix(_)));
        assert!(MatrixBuffers::new(2, 2, palette(3), vec![0], vec![0]).is_err());
        assert!(CellMatrix::from_cells(1, 1, [(0, 1, 0u8)]).is_err());
    }

    #[test]
    fn boundaries_follow_logical_discontinuities() {
        let micro = [0, 0, 1, 1];
        assert_eq!(boundary_before(&micro, 0), Boundary::None);
        assert_eq!(boundary_before(&micro, 1), Boundary::Micro);
        assert_eq!(boundary_before(&micro, 2), Boundary::Logical);
    }

    #[test]
    fn grid_lines_fade_with_zoom() {
        let style = GridStyle::default();
        assert_eq!(line_fade(1.0, 2.0, 4.0), 0.0);
        assert_eq!(line_fade(5.0, 2.0, 4.0), 1.0);
        let mid = line_fade(3.0, 2.0, 4.0);
        assert!(mid > 0.0 && mid < 1.0);

        // Zoomed out: logical lines visible, micro lines not yet.
        assert!(style.overlay(Boundary::Micro, Boundary::None, (0.0, 5.0), 4.0).is_none());
        let (color, alpha) = style
            .overlay(Boundary::Logical, Boundary::None, (0.0, 5.0), 4.0)
            .unwrap();
        assert_eq!(color, style.logical_color);
        assert_eq!(alpha, 1.0);
        // Far from the line edge nothing is drawn.
        assert!(style.overlay(Boundary::Logical, Boundary::Logical, (3.0, 3.0), 20.0).is_none());
        // Zoomed in: micro lines appear.
        assert!(style.overlay(Boundary::Micro, Boundary::None, (0.5, 5.0), 20.0).is_some());
    }

    #[test]
    fn blend_is_linear_in_opacity() {
        assert_eq!(blend([0, 0, 0, 255], [255, 255, 255, 255], 0.0), [0, 0, 0, 255]);
        assert_eq!(blend([0, 0, 0, 255], [255, 255, 255, 255], 1.0), [255, 255, 255, 255]);
        assert_eq!(blend([0, 0, 0, 255], [200, 100, 0, 255], 0.5), [100, 50, 0, 255]);
    }
}
