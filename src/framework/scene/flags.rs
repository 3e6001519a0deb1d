use std::ops::{BitOr, BitOrAssign};

/// シーンファイルを読み込む時の後処理の指定。<br />
/// Post-processing requested when loading a scene file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileLoadingFlags(pub u32);

impl FileLoadingFlags {
    pub const NONE: Self = Self(0x0);
    pub const PRE_TRANSFORM_VERTICES: Self = Self(0x1);
    pub const PRE_MULTIPLY_VERTEX_COLORS: Self = Self(0x2);
    pub const FLIP_Y: Self = Self(0x4);
    pub const DONT_LOAD_IMAGES: Self = Self(0x8);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// 頂点データを書き換える後処理が一つでも指定されているか。<br />
    /// Whether any post-process touching vertex data is requested.
    pub fn needs_post_process(&self) -> bool {
        self.contains(Self::PRE_TRANSFORM_VERTICES)
            || self.contains(Self::PRE_MULTIPLY_VERTEX_COLORS)
            || self.contains(Self::FLIP_Y)
    }
}

impl BitOr for FileLoadingFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileLoadingFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// 描画時の指定。<br />
/// Options applied while drawing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderFlags(pub u32);

impl RenderFlags {
    pub const NONE: Self = Self(0x0);
    pub const BIND_IMAGES: Self = Self(0x1);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for RenderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_flags_contain_each_part() {
        let flags = FileLoadingFlags::PRE_TRANSFORM_VERTICES | FileLoadingFlags::FLIP_Y;
        assert!(flags.contains(FileLoadingFlags::PRE_TRANSFORM_VERTICES));
        assert!(flags.contains(FileLoadingFlags::FLIP_Y));
        assert!(!flags.contains(FileLoadingFlags::DONT_LOAD_IMAGES));
        assert!(flags.needs_post_process());
    }

    #[test]
    fn none_is_never_contained() {
        assert!(!FileLoadingFlags::NONE.contains(FileLoadingFlags::NONE));
        assert!(!FileLoadingFlags::DONT_LOAD_IMAGES.needs_post_process());
        assert!(!RenderFlags::NONE.contains(RenderFlags::BIND_IMAGES));
    }
}
