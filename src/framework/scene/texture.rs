use anyhow::Context;
use ash::vk::{
    BufferImageCopy, BufferUsageFlags, DescriptorImageInfo, Extent2D, Extent3D, Format,
    FormatFeatureFlags, ImageAspectFlags, ImageLayout, ImageSubresourceLayers, ImageUsageFlags,
};
use base64::Engine;
use std::path::Path;
use std::sync::Arc;

use crate::framework::graphics::vk::{Buffer, Image, UploadContext};
use crate::framework::scene::ktx::KtxTexture;
use crate::framework::shared::util::{
    end_one_time_command_buffer, expand_to_rgba, get_single_time_command_buffer, mip_level_count,
};

/// デコード済みの画素。<br />
/// Decoded pixels.
#[derive(Clone, Debug)]
pub enum ImagePixels {
    Rgba8(Vec<u8>),
    Ktx(KtxTexture),
}

/// glTFの画像をCPU側でデコードしたもの。<br />
/// A glTF image decoded on the CPU.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: ImagePixels,
}

impl SourceImage {
    /// 埋め込み、データURI、外部ファイルのいずれかから画像を読み込む。<br />
    /// 外部の`.ktx`ファイルは`base_dir`からの相対パスで解決する。<br />
    /// Loads an image that is embedded, a data URI or an external file.<br />
    /// External `.ktx` files are resolved relative to `base_dir`.
    pub fn from_gltf(
        image: &gltf::Image,
        buffers: &[gltf::buffer::Data],
        base_dir: &Path,
    ) -> anyhow::Result<Self> {
        let name = image
            .name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| image.index().to_string());
        match image.source() {
            gltf::image::Source::View { view, .. } => {
                let buffer = buffers
                    .get(view.buffer().index())
                    .with_context(|| format!("Missing buffer for image {}.", name))?;
                let bytes = buffer
                    .0
                    .get(view.offset()..view.offset() + view.length())
                    .with_context(|| format!("Buffer view of image {} is out of range.", name))?;
                Self::decode(name, bytes)
            }
            gltf::image::Source::Uri { uri, .. } => Self::from_uri(name, uri, base_dir),
        }
    }

    pub fn from_uri(name: String, uri: &str, base_dir: &Path) -> anyhow::Result<Self> {
        if let Some(data) = uri.strip_prefix("data:") {
            let (_, encoded) = data
                .split_once(";base64,")
                .with_context(|| format!("Unsupported data URI for image {}.", name))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .with_context(|| format!("Failed to decode base64 data of image {}.", name))?;
            return Self::decode(name, &bytes);
        }

        let path = base_dir.join(uri);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read image file {}.", path.display()))?;
        let is_ktx = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("ktx"))
            .unwrap_or(false);
        if is_ktx {
            let ktx = KtxTexture::parse(&bytes)
                .with_context(|| format!("Failed to parse KTX file {}.", path.display()))?;
            return Ok(SourceImage {
                name,
                width: ktx.width,
                height: ktx.height,
                pixels: ImagePixels::Ktx(ktx),
            });
        }
        Self::decode(name, &bytes)
    }

    fn decode(name: String, bytes: &[u8]) -> anyhow::Result<Self> {
        let image = image::load_from_memory(bytes)
            .with_context(|| format!("Failed to decode image {}.", name))?;
        let (width, height) = (image.width(), image.height());
        let pixels = match image {
            image::DynamicImage::ImageRgb8(rgb) => expand_to_rgba(rgb.as_raw(), width, height),
            other => other.to_rgba8().into_raw(),
        };
        Ok(SourceImage {
            name,
            width,
            height,
            pixels: ImagePixels::Rgba8(pixels),
        })
    }
}

/// GPUに転送済みのテクスチャ。<br />
/// A texture uploaded to the GPU.
pub struct Texture {
    pub image: Image,
}

impl Texture {
    pub fn new(source: &SourceImage, context: &UploadContext) -> anyhow::Result<Self> {
        let image = match &source.pixels {
            ImagePixels::Rgba8(pixels) => {
                Self::upload_rgba(pixels, source.width, source.height, context)?
            }
            ImagePixels::Ktx(ktx) => Self::upload_ktx(ktx, context)?,
        };
        log::info!(
            "Texture {} uploaded ({}x{}, {} mip levels).",
            source.name,
            image.width,
            image.height,
            image.mip_levels
        );
        Ok(Texture { image })
    }

    pub fn descriptor(&self) -> DescriptorImageInfo {
        self.image.descriptor()
    }

    fn upload_rgba(
        pixels: &[u8],
        width: u32,
        height: u32,
        context: &UploadContext,
    ) -> anyhow::Result<Image> {
        let format = Format::R8G8B8A8_UNORM;
        let format_properties = unsafe {
            context
                .instance
                .get_physical_device_format_properties(context.physical_device, format)
        };
        let blit = FormatFeatureFlags::BLIT_SRC | FormatFeatureFlags::BLIT_DST;
        if !format_properties.optimal_tiling_features.contains(blit) {
            return Err(anyhow::anyhow!(
                "The device cannot blit {:?} images to generate mipmaps.",
                format
            ));
        }

        let staging = Buffer::with_data(
            Arc::downgrade(context.device),
            BufferUsageFlags::TRANSFER_SRC,
            pixels,
            context.allocator.clone(),
        )?;
        let mut image = Image::new(
            Arc::downgrade(context.device),
            ImageUsageFlags::TRANSFER_SRC | ImageUsageFlags::TRANSFER_DST | ImageUsageFlags::SAMPLED,
            format,
            Extent2D { width, height },
            mip_level_count(width, height),
            ImageAspectFlags::COLOR,
            context.allocator.clone(),
        )?;

        let pool = context.command_pool;
        let queue = context.graphics_queue;
        let cmd_buffer = get_single_time_command_buffer(context.device, pool)?;
        image.transition_layout(
            ImageLayout::UNDEFINED,
            ImageLayout::TRANSFER_DST_OPTIMAL,
            pool,
            queue,
            ImageAspectFlags::COLOR,
            0,
            1,
            Some(cmd_buffer),
        )?;
        image.copy_buffer_to_image(
            &staging,
            &[copy_region(0, 0, width, height)],
            pool,
            queue,
            Some(cmd_buffer),
        )?;
        image.generate_mipmap(pool, queue, Some(cmd_buffer))?;
        end_one_time_command_buffer(cmd_buffer, context.device, pool, queue)?;
        drop(staging);

        image.create_sampler(context.anisotropy_enabled)?;
        Ok(image)
    }

    fn upload_ktx(ktx: &KtxTexture, context: &UploadContext) -> anyhow::Result<Image> {
        let staging = Buffer::with_data(
            Arc::downgrade(context.device),
            BufferUsageFlags::TRANSFER_SRC,
            ktx.data.as_slice(),
            context.allocator.clone(),
        )?;
        let mip_levels = ktx.mip_levels();
        let mut image = Image::new(
            Arc::downgrade(context.device),
            ImageUsageFlags::TRANSFER_DST | ImageUsageFlags::SAMPLED,
            ktx.format,
            Extent2D {
                width: ktx.width,
                height: ktx.height,
            },
            mip_levels,
            ImageAspectFlags::COLOR,
            context.allocator.clone(),
        )?;
        let regions = ktx
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| copy_region(level.offset, i as u32, level.width, level.height))
            .collect::<Vec<_>>();

        let pool = context.command_pool;
        let queue = context.graphics_queue;
        let cmd_buffer = get_single_time_command_buffer(context.device, pool)?;
        image.transition_layout(
            ImageLayout::UNDEFINED,
            ImageLayout::TRANSFER_DST_OPTIMAL,
            pool,
            queue,
            ImageAspectFlags::COLOR,
            0,
            mip_levels,
            Some(cmd_buffer),
        )?;
        image.copy_buffer_to_image(&staging, &regions, pool, queue, Some(cmd_buffer))?;
        image.transition_layout(
            ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            pool,
            queue,
            ImageAspectFlags::COLOR,
            0,
            mip_levels,
            Some(cmd_buffer),
        )?;
        end_one_time_command_buffer(cmd_buffer, context.device, pool, queue)?;
        drop(staging);

        image.create_sampler(context.anisotropy_enabled)?;
        Ok(image)
    }
}

fn copy_region(offset: usize, mip_level: u32, width: u32, height: u32) -> BufferImageCopy {
    BufferImageCopy::builder()
        .buffer_offset(offset as u64)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            ImageSubresourceLayers::builder()
                .aspect_mask(ImageAspectFlags::COLOR)
                .mip_level(mip_level)
                .base_array_layer(0)
                .layer_count(1)
                .build(),
        )
        .image_extent(Extent3D {
            width,
            height,
            depth: 1,
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn data_uri_rgb_png_is_expanded() {
        let mut rgb = image::RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        rgb.put_pixel(1, 0, image::Rgb([40, 50, 60]));
        let mut png = Cursor::new(vec![]);
        image::DynamicImage::ImageRgb8(rgb)
            .write_to(&mut png, image::ImageOutputFormat::Png)
            .expect("encode png");
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png.into_inner())
        );

        let source = SourceImage::from_uri("test".into(), &uri, Path::new(".")).expect("decode");
        assert_eq!((source.width, source.height), (2, 1));
        match source.pixels {
            ImagePixels::Rgba8(pixels) => {
                assert_eq!(pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
            }
            ImagePixels::Ktx(_) => panic!("expected raw pixels"),
        }
    }

    #[test]
    fn missing_external_file_is_an_error() {
        let result = SourceImage::from_uri(
            "missing".into(),
            "definitely_missing_texture.ktx",
            Path::new("/nonexistent"),
        );
        assert!(result.is_err());
    }
}
