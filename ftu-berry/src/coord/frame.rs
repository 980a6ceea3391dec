use super::{pixel_to_map, Scale};
use geo::{Coord, Rect};
use thiserror::Error;

/// 切片元数据不合法.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FrameError {
    /// 缩放级别个数为 0.
    #[error("zoom level count must be positive")]
    NoZoomLevel,

    /// 瓦片或图像尺寸不是有限正数.
    #[error("invalid {what} size: ({width}, {height})")]
    InvalidSize {
        /// 哪一个尺寸.
        what: &'static str,
        /// 宽.
        width: f64,
        /// 高.
        height: f64,
    },
}

/// 某一缩放级别下的瓦片位置.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileIndex {
    /// 缩放级别, `0` 为最粗糙的一级.
    pub level: u32,

    /// 列号 (沿宽方向).
    pub col: u64,

    /// 行号 (沿高方向).
    pub row: u64,
}

/// 一张切片的空间参考系.
///
/// 创建后只读. 切换切片时应创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SlideFrame {
    zoom_level_count: u32,
    tile_pixel_size: (f64, f64),
    image_pixel_size: (f64, f64),
}

#[inline]
fn check_size(what: &'static str, (width, height): (f64, f64)) -> Result<(), FrameError> {
    let ok = |v: f64| v.is_finite() && v > 0.0;
    if ok(width) && ok(height) {
        Ok(())
    } else {
        Err(FrameError::InvalidSize { what, width, height })
    }
}

impl SlideFrame {
    /// 构建切片参考系. 尺寸均为 `(宽, 高)`.
    pub fn new(
        zoom_level_count: u32,
        tile_pixel_size: (f64, f64),
        image_pixel_size: (f64, f64),
    ) -> Result<Self, FrameError> {
        if zoom_level_count == 0 {
            return Err(FrameError::NoZoomLevel);
        }
        check_size("tile", tile_pixel_size)?;
        check_size("image", image_pixel_size)?;
        Ok(Self {
            zoom_level_count,
            tile_pixel_size,
            image_pixel_size,
        })
    }

    /// 从图像服务的瓦片元数据 (`levels`, `sizeX`, `sizeY`, `tileWidth`, `tileHeight`) 构建.
    #[inline]
    pub fn from_tile_metadata(
        levels: u32,
        size_x: u64,
        size_y: u64,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, FrameError> {
        Self::new(
            levels,
            (tile_width as f64, tile_height as f64),
            (size_x as f64, size_y as f64),
        )
    }

    /// 缩放级别个数.
    #[inline]
    pub fn zoom_level_count(&self) -> u32 {
        self.zoom_level_count
    }

    /// 瓦片像素尺寸 `(宽, 高)`.
    #[inline]
    pub fn tile_pixel_size(&self) -> (f64, f64) {
        self.tile_pixel_size
    }

    /// 全分辨率图像像素尺寸 `(宽, 高)`.
    #[inline]
    pub fn image_pixel_size(&self) -> (f64, f64) {
        self.image_pixel_size
    }

    /// 像素到地图坐标的缩放系数. `y` 分量恒为负.
    #[inline]
    pub fn scale(&self) -> Scale {
        let (tw, th) = self.tile_pixel_size;
        let (iw, ih) = self.image_pixel_size;
        Scale::new(tw / iw, -(th / ih))
    }

    /// 缩放级别 `level` 相对全分辨率的降采样倍率, 即 `2^(levels - 1 - level)`.
    ///
    /// # 注意
    ///
    /// `level` 必须小于 [`Self::zoom_level_count`], 否则程序 panic.
    #[inline]
    pub fn level_downsample(&self, level: u32) -> f64 {
        assert!(level < self.zoom_level_count, "缩放级别越界");
        2f64.powi((self.zoom_level_count - 1 - level) as i32)
    }

    /// 最粗糙级别 (`level = 0`) 的图像尺寸 `(宽, 高)`.
    #[inline]
    pub fn base_pixel_size(&self) -> (f64, f64) {
        let d = self.level_downsample(0);
        (self.image_pixel_size.0 / d, self.image_pixel_size.1 / d)
    }

    /// 全分辨率像素坐标 -> 缩放级别 `level` 下的像素坐标.
    #[inline]
    pub fn pixel_to_level(&self, p: Coord<f64>, level: u32) -> Coord<f64> {
        let d = self.level_downsample(level);
        Coord {
            x: p.x / d,
            y: p.y / d,
        }
    }

    /// 缩放级别 `level` 下的瓦片行列数 `(列数, 行数)`.
    pub fn tile_count(&self, level: u32) -> (u64, u64) {
        let d = self.level_downsample(level);
        let (iw, ih) = self.image_pixel_size;
        let (tw, th) = self.tile_pixel_size;
        (
            (iw / d / tw).ceil() as u64,
            (ih / d / th).ceil() as u64,
        )
    }

    /// 全分辨率像素坐标 `p` 位于缩放级别 `level` 的哪一块瓦片上.
    /// 若 `p` 不在图像内, 则返回 `None`.
    pub fn tile_at(&self, p: Coord<f64>, level: u32) -> Option<TileIndex> {
        let (iw, ih) = self.image_pixel_size;
        if !(0.0..iw).contains(&p.x) || !(0.0..ih).contains(&p.y) {
            return None;
        }
        let q = self.pixel_to_level(p, level);
        let (tw, th) = self.tile_pixel_size;
        Some(TileIndex {
            level,
            col: (q.x / tw).floor() as u64,
            row: (q.y / th).floor() as u64,
        })
    }

    /// 整张切片在地图坐标下的范围.
    pub fn map_bounds(&self) -> Rect<f64> {
        let (iw, ih) = self.image_pixel_size;
        let corner = pixel_to_map(Coord { x: iw, y: ih }, self.scale());
        Rect::new(Coord { x: 0.0, y: 0.0 }, corner)
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameError, SlideFrame, TileIndex};
    use geo::Coord;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    fn frame() -> SlideFrame {
        // 8 级, 240 像素瓦片, 61440 x 30720 的切片.
        SlideFrame::from_tile_metadata(8, 61_440, 30_720, 240, 240).unwrap()
    }

    /// 任意正尺寸下, y 方向缩放系数必为负.
    #[test]
    fn test_y_scale_negative() {
        for (tile, image) in [
            ((240.0, 240.0), (61_440.0, 30_720.0)),
            ((1.0, 1.0), (1.0, 1.0)),
            ((512.0, 256.0), (3.0, 1e9)),
        ] {
            let s = SlideFrame::new(3, tile, image).unwrap().scale();
            assert!(s.y < 0.0);
            assert!(s.x > 0.0);
        }
    }

    #[test]
    fn test_invalid_frame() {
        assert_eq!(
            SlideFrame::new(0, (1.0, 1.0), (1.0, 1.0)).unwrap_err(),
            FrameError::NoZoomLevel
        );
        assert!(SlideFrame::new(2, (0.0, 1.0), (1.0, 1.0)).is_err());
        assert!(SlideFrame::new(2, (1.0, 1.0), (f64::NAN, 1.0)).is_err());
    }

    #[test]
    fn test_levels() {
        let f = frame();
        assert!(f64_eq(f.level_downsample(7), 1.0));
        assert!(f64_eq(f.level_downsample(0), 128.0));
        let (bw, bh) = f.base_pixel_size();
        assert!(f64_eq(bw, 480.0) && f64_eq(bh, 240.0));
        assert_eq!(f.tile_count(0), (2, 1));
        assert_eq!(f.tile_count(7), (256, 128));
    }

    #[test]
    fn test_tile_at() {
        let f = frame();
        let p = Coord { x: 500.0, y: 250.0 };
        assert_eq!(
            f.tile_at(p, 7),
            Some(TileIndex {
                level: 7,
                col: 2,
                row: 1
            })
        );
        assert_eq!(f.tile_at(p, 0).map(|t| (t.col, t.row)), Some((0, 0)));
        assert_eq!(f.tile_at(Coord { x: -1.0, y: 0.0 }, 3), None);
        assert_eq!(f.tile_at(Coord { x: 61_440.0, y: 0.0 }, 3), None);
    }

    #[test]
    fn test_map_bounds() {
        let r = frame().map_bounds();
        assert!(f64_eq(r.min().x, 0.0));
        assert!(f64_eq(r.max().x, 240.0));
        assert!(f64_eq(r.min().y, -240.0));
        assert!(f64_eq(r.max().y, 0.0));
    }
}
