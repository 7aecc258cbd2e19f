//! Integer data textures.
//!
//! Lookup tables travel to the shader as textures whose texels are raw
//! integers: a micro index of `7` must be fetched as `7`, never as `7/255`.
//! Every texture is described by a [`BufferDescriptor`] that is checked in
//! full before any upload happens.

use crate::error::{LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TexelFormat {
    /// Single unsigned 32-bit integer channel.
    R32Uint,
    Rgba8Unorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TexelType {
    UnsignedInt,
    UnsignedByte,
}

impl TexelFormat {
    pub fn texel_type(self) -> TexelType {
        match self {
            Self::R32Uint => TexelType::UnsignedInt,
            Self::Rgba8Unorm => TexelType::UnsignedByte,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        4
    }

    /// Byte size of a `width × height` texture, computed without `u32` overflow.
    pub fn byte_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_texel() as usize
    }
}

/// Upload parameters. Every field is optional so a partially filled
/// descriptor can be reported precisely instead of silently defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<TexelFormat>,
    pub texel_type: Option<TexelType>,
}

impl BufferDescriptor {
    pub fn new(width: u32, height: u32, format: TexelFormat) -> Self {
        Self {
            label: None,
            width: Some(width),
            height: Some(height),
            format: Some(format),
            texel_type: Some(format.texel_type()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureData {
    U32(Vec<u32>),
    Rgba8(Vec<[u8; 4]>),
}

impl TextureData {
    fn len(&self) -> usize {
        match self {
            Self::U32(values) => values.len(),
            Self::Rgba8(values) => values.len(),
        }
    }

    fn format(&self) -> TexelFormat {
        match self {
            Self::U32(_) => TexelFormat::R32Uint,
            Self::Rgba8(_) => TexelFormat::Rgba8Unorm,
        }
    }
}

/// A fully validated texture, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTexture {
    label: String,
    width: u32,
    height: u32,
    format: TexelFormat,
    data: TextureData,
}

fn invalid(label: &str, reason: impl std::fmt::Display) -> LayoutError {
    LayoutError::InvalidBufferConfiguration(format!("{label}: {reason}"))
}

impl DataTexture {
    pub fn new(descriptor: &BufferDescriptor, data: TextureData) -> Result<Self> {
        let label = descriptor.label.clone().unwrap_or_else(|| "texture".to_string());
        let width = descriptor.width.ok_or_else(|| invalid(&label, "missing width"))?;
        let height = descriptor.height.ok_or_else(|| invalid(&label, "missing height"))?;
        let format = descriptor.format.ok_or_else(|| invalid(&label, "missing format"))?;
        let texel_type = descriptor
            .texel_type
            .ok_or_else(|| invalid(&label, "missing texel type"))?;
        if width == 0 || height == 0 {
            return Err(invalid(&label, format!("empty extent {width}x{height}")));
        }
        if format.texel_type() != texel_type {
            return Err(invalid(
                &label,
                format!("format {format:?} cannot hold {texel_type:?} texels"),
            ));
        }
        if data.format() != format {
            return Err(invalid(
                &label,
                format!("{:?} data supplied for a {format:?} texture", data.format()),
            ));
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(invalid(
                &label,
                format!("{} texels supplied for a {width}x{height} texture", data.len()),
            ));
        }
        Ok(Self {
            label,
            width,
            height,
            format,
            data,
        })
    }

    /// One-texel-high integer table.
    pub fn index_row(label: &str, indices: &[u32]) -> Result<Self> {
        let descriptor = BufferDescriptor::new(indices.len() as u32, 1, TexelFormat::R32Uint)
            .with_label(label);
        Self::new(&descriptor, TextureData::U32(indices.to_vec()))
    }

    /// `cols × rows` color table, row-major.
    pub fn color_grid(label: &str, rows: u32, cols: u32, colors: &[[u8; 4]]) -> Result<Self> {
        let descriptor =
            BufferDescriptor::new(cols, rows, TexelFormat::Rgba8Unorm).with_label(label);
        Self::new(&descriptor, TextureData::Rgba8(colors.to_vec()))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * self.format.bytes_per_texel()
    }

    /// Little-endian texel bytes, tightly packed.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.data {
            TextureData::U32(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            TextureData::Rgba8(values) => values.iter().flatten().copied().collect(),
        }
    }
}

/// Uploads a validated texture into a backend-specific target.
pub trait TextureUpload<Ctx: ?Sized> {
    type Target: ?Sized;

    fn upload(&self, ctx: &Ctx, target: &Self::Target) -> Result<()>;
}

/// CPU stand-in for a device; uploads go to [`HostTexture`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDevice;

/// Texture storage in host memory with nearest, integer texel fetches.
#[derive(Debug)]
pub struct HostTexture {
    width: u32,
    height: u32,
    format: TexelFormat,
    texels: RefCell<Vec<u8>>,
}

impl HostTexture {
    pub fn new(width: u32, height: u32, format: TexelFormat) -> Self {
        let len = format.byte_len(width, height);
        Self {
            width,
            height,
            format,
            texels: RefCell::new(vec![0; len]),
        }
    }

    /// Allocates a texture matching `texture` and uploads into it.
    pub fn from_data(device: &HostDevice, texture: &DataTexture) -> Result<Self> {
        let target = Self::new(texture.width(), texture.height(), texture.format());
        texture.upload(device, &target)?;
        Ok(target)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * self.format.bytes_per_texel()) as usize;
        let texels = self.texels.borrow();
        let bytes = texels.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn load_u32(&self, x: u32, y: u32) -> Option<u32> {
        if self.format != TexelFormat::R32Uint {
            return None;
        }
        self.texel(x, y).map(u32::from_le_bytes)
    }

    pub fn load_rgba(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.format != TexelFormat::Rgba8Unorm {
            return None;
        }
        self.texel(x, y)
    }
}

impl TextureUpload<HostDevice> for DataTexture {
    type Target = HostTexture;

    fn upload(&self, _device: &HostDevice, target: &HostTexture) -> Result<()> {
        if target.width != self.width || target.height != self.height || target.format != self.format
        {
            return Err(LayoutError::Upload(format!(
                "{}: {}x{} {:?} does not fit a {}x{} {:?} target",
                self.label,
                self.width,
                self.height,
                self.format,
                target.width,
                target.height,
                target.format
            )));
        }
        *target.texels.borrow_mut() = self.to_bytes();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_descriptor_fails_fast() {
        let mut descriptor = BufferDescriptor::new(2, 1, TexelFormat::R32Uint);
        descriptor.height = None;
        let err = DataTexture::new(&descriptor, TextureData::U32(vec![0, 1])).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidBufferConfiguration(ref m) if m.contains("height")));

        let mut descriptor = BufferDescriptor::new(2, 1, TexelFormat::R32Uint);
        descriptor.texel_type = None;
        assert!(DataTexture::new(&descriptor, TextureData::U32(vec![0, 1])).is_err());
    }

    #[test]
    fn format_type_and_length_must_agree() {
        let mut descriptor = BufferDescriptor::new(2, 1, TexelFormat::R32Uint);
        descriptor.texel_type = Some(TexelType::UnsignedByte);
        assert!(DataTexture::new(&descriptor, TextureData::U32(vec![0, 1])).is_err());

        let descriptor = BufferDescriptor::new(2, 1, TexelFormat::R32Uint);
        assert!(DataTexture::new(&descriptor, TextureData::U32(vec![0])).is_err());
        assert!(DataTexture::new(&descriptor, TextureData::Rgba8(vec![[0; 4]; 2])).is_err());
    }

    #[test]
    fn integer_texels_survive_upload_unnormalized() {
        let texture = DataTexture::index_row("uMicroCol", &[0, 7, 300, u32::MAX]).unwrap();
        let host = HostTexture::from_data(&HostDevice, &texture).unwrap();
        assert_eq!(host.load_u32(1, 0), Some(7));
        assert_eq!(host.load_u32(2, 0), Some(300));
        assert_eq!(host.load_u32(3, 0), Some(u32::MAX));
        assert_eq!(host.load_u32(4, 0), None);
        assert_eq!(host.load_rgba(0, 0), None);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn large_extents_do_not_overflow_byte_length() {
        assert_eq!(TexelFormat::R32Uint.byte_len(65_536, 65_536), 17_179_869_184);
        assert_eq!(HostTexture::new(3, 2, TexelFormat::Rgba8Unorm).texels.borrow().len(), 24);
    }

    #[test]
    fn upload_rejects_mismatched_target() {
        let texture = DataTexture::color_grid("uColor", 2, 2, &[[1, 2, 3, 4]; 4]).unwrap();
        let target = HostTexture::new(3, 2, TexelFormat::Rgba8Unorm);
        assert!(matches!(
            texture.upload(&HostDevice, &target),
            Err(LayoutError::Upload(_))
        ));
        let target = HostTexture::new(2, 2, TexelFormat::Rgba8Unorm);
        texture.upload(&HostDevice, &target).unwrap();
        assert_eq!(target.load_rgba(1, 1), Some([1, 2, 3, 4]));
    }
}
