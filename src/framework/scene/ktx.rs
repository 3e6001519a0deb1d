use anyhow::Context;
use ash::vk::Format;

const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const KTX_ENDIANNESS: u32 = 0x0403_0201;
const KTX_HEADER_SIZE: usize = 64;

const GL_RGBA8: u32 = 0x8058;
const GL_SRGB8_ALPHA8: u32 = 0x8C43;
const GL_COMPRESSED_RGB_S3TC_DXT1: u32 = 0x83F0;
const GL_COMPRESSED_RGBA_S3TC_DXT1: u32 = 0x83F1;
const GL_COMPRESSED_RGBA_S3TC_DXT3: u32 = 0x83F2;
const GL_COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;
const GL_COMPRESSED_RGBA_BPTC_UNORM: u32 = 0x8E8C;
const GL_COMPRESSED_RGBA8_ETC2_EAC: u32 = 0x9278;
const GL_COMPRESSED_RGBA_ASTC_4X4: u32 = 0x93B0;

/// KTXファイルのミップレベル一つ。`offset`は`KtxTexture::data`の中の位置。<br />
/// One mip level of a KTX file. `offset` points into `KtxTexture::data`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KtxLevel {
    pub offset: usize,
    pub size: usize,
    pub width: u32,
    pub height: u32,
}

/// 解析済みのKTX 1.1テクスチャ。2Dテクスチャだけを扱う。<br />
/// A parsed KTX 1.1 texture. Only 2D textures are handled.
#[derive(Clone, Debug)]
pub struct KtxTexture {
    pub width: u32,
    pub height: u32,
    pub gl_internal_format: u32,
    pub format: Format,
    pub levels: Vec<KtxLevel>,
    pub data: Vec<u8>,
}

impl KtxTexture {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < KTX_HEADER_SIZE || bytes[..12] != KTX_IDENTIFIER {
            return Err(anyhow::anyhow!("Not a KTX 1.1 file."));
        }
        let swap = match u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) {
            KTX_ENDIANNESS => false,
            x if x.swap_bytes() == KTX_ENDIANNESS => true,
            x => return Err(anyhow::anyhow!("Invalid KTX endianness tag: {:#x}", x)),
        };
        let mut reader = WordReader {
            bytes,
            position: 16,
            swap,
        };
        let _gl_type = reader.next()?;
        let _gl_type_size = reader.next()?;
        let _gl_format = reader.next()?;
        let gl_internal_format = reader.next()?;
        let _gl_base_internal_format = reader.next()?;
        let width = reader.next()?;
        let height = reader.next()?.max(1);
        let depth = reader.next()?;
        let array_elements = reader.next()?;
        let faces = reader.next()?;
        let mip_levels = reader.next()?.max(1);
        let key_value_bytes = reader.next()? as usize;

        if depth > 1 || array_elements > 0 || faces != 1 {
            return Err(anyhow::anyhow!(
                "Only 2D KTX textures are supported (depth {}, array elements {}, faces {}).",
                depth,
                array_elements,
                faces
            ));
        }
        reader.skip(key_value_bytes)?;

        let mut levels = Vec::with_capacity(mip_levels as usize);
        let mut data = vec![];
        for level in 0..mip_levels {
            let size = reader.next()? as usize;
            let image = reader.take(size)?;
            levels.push(KtxLevel {
                offset: data.len(),
                size,
                width: (width >> level).max(1),
                height: (height >> level).max(1),
            });
            data.extend_from_slice(image);
            reader.skip(padding(size))?;
        }

        Ok(KtxTexture {
            width,
            height,
            gl_internal_format,
            format: vk_format(gl_internal_format),
            levels,
            data,
        })
    }

    pub fn mip_levels(&self) -> u32 {
        self.levels.len() as u32
    }
}

fn padding(size: usize) -> usize {
    (4 - size % 4) % 4
}

fn vk_format(gl_internal_format: u32) -> Format {
    match gl_internal_format {
        GL_RGBA8 => Format::R8G8B8A8_UNORM,
        GL_SRGB8_ALPHA8 => Format::R8G8B8A8_SRGB,
        GL_COMPRESSED_RGB_S3TC_DXT1 => Format::BC1_RGB_UNORM_BLOCK,
        GL_COMPRESSED_RGBA_S3TC_DXT1 => Format::BC1_RGBA_UNORM_BLOCK,
        GL_COMPRESSED_RGBA_S3TC_DXT3 => Format::BC2_UNORM_BLOCK,
        GL_COMPRESSED_RGBA_S3TC_DXT5 => Format::BC3_UNORM_BLOCK,
        GL_COMPRESSED_RGBA_BPTC_UNORM => Format::BC7_UNORM_BLOCK,
        GL_COMPRESSED_RGBA8_ETC2_EAC => Format::ETC2_R8G8B8A8_UNORM_BLOCK,
        GL_COMPRESSED_RGBA_ASTC_4X4 => Format::ASTC_4X4_UNORM_BLOCK,
        other => {
            log::warn!(
                "Unknown KTX internal format {:#x}, falling back to R8G8B8A8_UNORM.",
                other
            );
            Format::R8G8B8A8_UNORM
        }
    }
}

struct WordReader<'a> {
    bytes: &'a [u8],
    position: usize,
    swap: bool,
}

impl<'a> WordReader<'a> {
    fn take(&mut self, count: usize) -> anyhow::Result<&'a [u8]> {
        let end = self.position + count;
        let slice = self
            .bytes
            .get(self.position..end)
            .with_context(|| format!("KTX data truncated at byte {}.", self.position))?;
        self.position = end;
        Ok(slice)
    }

    fn skip(&mut self, count: usize) -> anyhow::Result<()> {
        self.take(count).map(|_| ())
    }

    fn next(&mut self) -> anyhow::Result<u32> {
        let word = self.take(4)?;
        let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        Ok(if self.swap { value.swap_bytes() } else { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ktx(internal_format: u32, width: u32, height: u32, levels: &[&[u8]]) -> Vec<u8> {
        let mut bytes = KTX_IDENTIFIER.to_vec();
        let key_value = b"abcd";
        let header = [
            KTX_ENDIANNESS,
            0x1401,
            1,
            0x1908,
            internal_format,
            0x1908,
            width,
            height,
            0,
            0,
            1,
            levels.len() as u32,
            key_value.len() as u32,
        ];
        for word in header {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.extend_from_slice(key_value);
        for level in levels {
            bytes.extend_from_slice(&(level.len() as u32).to_le_bytes());
            bytes.extend_from_slice(level);
            bytes.extend(std::iter::repeat(0).take(padding(level.len())));
        }
        bytes
    }

    #[test]
    fn parses_levels_and_skips_padding() {
        let level0 = [1u8; 16];
        let level1 = [2u8; 4];
        let level2 = [3u8; 1];
        let bytes = build_ktx(GL_RGBA8, 2, 2, &[&level0, &level1, &level2]);
        let ktx = KtxTexture::parse(&bytes).expect("valid ktx");
        assert_eq!(ktx.format, Format::R8G8B8A8_UNORM);
        assert_eq!(ktx.mip_levels(), 3);
        assert_eq!(
            ktx.levels[1],
            KtxLevel {
                offset: 16,
                size: 4,
                width: 1,
                height: 1
            }
        );
        assert_eq!(ktx.levels[2].offset, 20);
        assert_eq!(ktx.data.len(), 21);
        assert_eq!(ktx.data[20], 3);
    }

    #[test]
    fn maps_compressed_formats() {
        let bytes = build_ktx(GL_COMPRESSED_RGBA_BPTC_UNORM, 4, 4, &[&[0u8; 16]]);
        let ktx = KtxTexture::parse(&bytes).expect("valid ktx");
        assert_eq!(ktx.format, Format::BC7_UNORM_BLOCK);
        assert_eq!(vk_format(GL_COMPRESSED_RGBA_ASTC_4X4), Format::ASTC_4X4_UNORM_BLOCK);
        assert_eq!(vk_format(0x1234), Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn rejects_bad_identifier_and_truncation() {
        assert!(KtxTexture::parse(&[0u8; 80]).is_err());
        let mut bytes = build_ktx(GL_RGBA8, 2, 2, &[&[1u8; 16]]);
        bytes.truncate(bytes.len() - 4);
        assert!(KtxTexture::parse(&bytes).is_err());
    }
}
