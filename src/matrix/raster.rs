use super::texture::{HostDevice, HostTexture};
use super::{Boundary, GridStyle, MatrixBuffers, ShaderVariant, blend};
use crate::config::MatrixConfig;
use crate::error::{LayoutError, Result};
use crate::theme::parse_hex_rgba;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maps output pixels onto micro cells: a pixel center `p` lands on micro
/// coordinate `(p - offset) / zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Pixels per micro cell.
    pub zoom: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Viewport {
    /// Largest zoom that shows the whole matrix, centered.
    pub fn fit(buffers: &MatrixBuffers, width: u32, height: u32) -> Self {
        let micro_w = buffers.micro_width().max(1) as f32;
        let micro_h = buffers.micro_height().max(1) as f32;
        let zoom = (width as f32 / micro_w).min(height as f32 / micro_h);
        Self {
            width,
            height,
            zoom,
            offset_x: (width as f32 - micro_w * zoom) / 2.0,
            offset_y: (height as f32 - micro_h * zoom) / 2.0,
        }
    }

    pub fn to_micro(&self, px: u32, py: u32) -> (f32, f32) {
        (
            (px as f32 + 0.5 - self.offset_x) / self.zoom,
            (py as f32 + 0.5 - self.offset_y) / self.zoom,
        )
    }
}

/// Straight-alpha RGBA8 image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32, fill: [u8; 4]) -> Self {
        let pixels = fill
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        let p = &self.pixels[offset..offset + 4];
        Some([p[0], p[1], p[2], p[3]])
    }

    fn put(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let offset = ((y * self.width + x) * 4) as usize;
        self.pixels[offset..offset + 4].copy_from_slice(&color);
    }
}

/// Lookup tables uploaded to host textures. Fetches mirror the shader's
/// `textureLoad` calls one for one.
pub struct HostMatrix {
    color: HostTexture,
    micro_row: HostTexture,
    micro_col: HostTexture,
}

impl HostMatrix {
    pub fn upload(device: &HostDevice, buffers: &MatrixBuffers) -> Result<Self> {
        let textures = buffers.to_textures()?;
        Ok(Self {
            color: HostTexture::from_data(device, &textures.color)?,
            micro_row: HostTexture::from_data(device, &textures.micro_row)?,
            micro_col: HostTexture::from_data(device, &textures.micro_col)?,
        })
    }

    pub fn micro_width(&self) -> u32 {
        self.micro_col.width()
    }

    pub fn micro_height(&self) -> u32 {
        self.micro_row.width()
    }

    pub fn cell_color(&self, micro_x: u32, micro_y: u32) -> Option<[u8; 4]> {
        let row = self.micro_row.load_u32(micro_y, 0)?;
        let col = self.micro_col.load_u32(micro_x, 0)?;
        self.color.load_rgba(col, row)
    }

    fn boundary(table: &HostTexture, index: u32) -> Boundary {
        if index == 0 {
            return Boundary::None;
        }
        match (table.load_u32(index - 1, 0), table.load_u32(index, 0)) {
            (Some(prev), Some(cur)) if prev != cur => Boundary::Logical,
            (Some(_), Some(_)) => Boundary::Micro,
            _ => Boundary::None,
        }
    }

    /// Fragment color for a position in micro-cell space, or `None` outside
    /// the matrix.
    pub fn shade(
        &self,
        world: (f32, f32),
        zoom: f32,
        variant: ShaderVariant,
        grid: &GridStyle,
    ) -> Option<[u8; 4]> {
        let (wx, wy) = world;
        if wx < 0.0 || wy < 0.0 {
            return None;
        }
        let (mx, my) = (wx.floor() as u32, wy.floor() as u32);
        let base = self.cell_color(mx, my)?;
        if variant == ShaderVariant::Cells {
            return Some(base);
        }
        let frac_px = ((wx - wx.floor()) * zoom, (wy - wy.floor()) * zoom);
        let left = Self::boundary(&self.micro_col, mx);
        let top = Self::boundary(&self.micro_row, my);
        Some(match grid.overlay(left, top, frac_px, zoom) {
            Some((line, opacity)) => blend(base, line, opacity),
            None => base,
        })
    }
}

/// Renders the matrix on the CPU with the same per-fragment logic as the GPU
/// pipeline.
pub fn rasterize(
    buffers: &MatrixBuffers,
    viewport: &Viewport,
    variant: ShaderVariant,
    config: &MatrixConfig,
) -> Result<RgbaImage> {
    if viewport.zoom <= 0.0 || !viewport.zoom.is_finite() {
        return Err(LayoutError::InvalidMatrix(format!(
            "zoom must be positive, got {}",
            viewport.zoom
        )));
    }
    let background = parse_hex_rgba(&config.background).ok_or_else(|| {
        LayoutError::InvalidMatrix(format!("unsupported color '{}'", config.background))
    })?;
    let grid = GridStyle::from_config(&config.grid)?;
    debug!(
        rows = buffers.rows(),
        cols = buffers.cols(),
        width = viewport.width,
        height = viewport.height,
        zoom = viewport.zoom,
        "rasterizing matrix"
    );

    let mut image = RgbaImage::new(viewport.width, viewport.height, background);
    if buffers.micro_width() == 0 || buffers.micro_height() == 0 {
        return Ok(image);
    }
    let host = HostMatrix::upload(&HostDevice, buffers)?;
    for py in 0..viewport.height {
        for px in 0..viewport.width {
            if let Some(color) = host.shade(viewport.to_micro(px, py), viewport.zoom, variant, &grid)
            {
                image.put(px, py, color);
            }
        }
    }
    Ok(image)
}
