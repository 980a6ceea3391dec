//! 对 `ftu-berry::segment` 输入数据的一层封装. 提供结构裁剪图数据集加载器.
//!
//! 数据集目录下, 每个结构由同名的若干文件组成:
//!
//! - `{name}.png`: RGB 裁剪图;
//! - 掩码, 按以下顺序查找第一个存在者:
//!   `{name}_mask.npy` (`bool` 或 `u8`, 非零即前景), `{name}_mask.png` (非零即前景),
//!   `{name}.json` (裁剪图像素坐标下的轮廓 `[[x, y], ...]`).

use ftu_berry::segment::{crop_structure_mask, SegmentationParam, DEFAULT_PARAMS};
use geo::Coord;
use log::{info, warn};
use ndarray::{s, Array2, Array3};
use ndarray_npy::{read_npy, ReadNpyError};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 加载一个结构时的错误.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LoadError {
    /// 读取文件失败.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 图像解码失败.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// npy 解码失败.
    #[error("npy error: {0}")]
    Npy(#[from] ReadNpyError),

    /// JSON 解码失败.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// 找不到掩码文件.
    #[error("no mask found for `{0}`")]
    MissingMask(String),

    /// 掩码与裁剪图形状不符.
    #[error("mask shape {mask:?} does not match crop shape {crop:?}")]
    ShapeMismatch {
        /// 掩码形状.
        mask: (usize, usize),
        /// 裁剪图形状.
        crop: (usize, usize),
    },
}

/// 一个结构的裁剪图与掩码.
#[derive(Clone, Debug)]
pub struct Crop {
    /// `(h, w, 3)` RGB 图像.
    pub image: Array3<u8>,

    /// `(h, w)` 结构掩码.
    pub mask: Array2<bool>,
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 获取结构裁剪图数据集路径.
///
/// 1. 若环境变量 `$FTU_CROP_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/ftu_crops`.
pub fn crop_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("FTU_CROP_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["ftu_crops"]),
    }
}

/// 渲染输出目录. 环境变量 `$FTU_RENDER_DIR` 非空时返回其值 (必要时创建该目录),
/// 否则不输出渲染图.
pub fn render_dir_from_env() -> Option<PathBuf> {
    let dir = PathBuf::from(env::var("FTU_RENDER_DIR").ok().filter(|d| !d.is_empty())?);
    match fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            warn!("Cannot create `{}`: {e}, rendering disabled", dir.display());
            None
        }
    }
}

/// 读取分割规则.
///
/// 若环境变量 `$FTU_SEG_PARAMS` 指向一个 JSON 文件 (`SegmentationParam` 数组),
/// 则使用该文件; 读取失败或未设置时使用默认规则.
pub fn params_from_env() -> Vec<SegmentationParam> {
    let Ok(path) = env::var("FTU_SEG_PARAMS") else {
        return DEFAULT_PARAMS.clone();
    };
    match read_params(&path) {
        Ok(params) if !params.is_empty() => {
            info!("Loaded {} segmentation params from `{path}`", params.len());
            params
        }
        Ok(_) => {
            warn!("`{path}` holds no segmentation params, using defaults");
            DEFAULT_PARAMS.clone()
        }
        Err(e) => {
            warn!("Failed to read `{path}`: {e}, using defaults");
            DEFAULT_PARAMS.clone()
        }
    }
}

fn read_params<P: AsRef<Path>>(path: P) -> Result<Vec<SegmentationParam>, LoadError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn read_rgb(path: &Path) -> Result<Array3<u8>, LoadError> {
    let img = image::open(path)?.to_rgb8();
    let (w, h) = img.dimensions();
    let data = Array3::from_shape_vec((h as usize, w as usize, 3), img.into_raw())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(data)
}

fn read_mask_npy(path: &Path) -> Result<Array2<bool>, LoadError> {
    match read_npy::<_, Array2<bool>>(path) {
        Ok(m) => Ok(m),
        Err(_) => Ok(read_npy::<_, Array2<u8>>(path)?.mapv(|v| v != 0)),
    }
}

fn read_mask_png(path: &Path) -> Result<Array2<bool>, LoadError> {
    let img = image::open(path)?.to_luma8();
    let (w, h) = img.dimensions();
    Ok(Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
        img.get_pixel(c as u32, r as u32).0[0] != 0
    }))
}

fn read_mask_json(path: &Path, shape: (usize, usize)) -> Result<Array2<bool>, LoadError> {
    let text = fs::read_to_string(path)?;
    let points: Vec<[f64; 2]> = serde_json::from_str(&text)?;
    let ring: Vec<Coord<f64>> = points.iter().map(|&[x, y]| Coord { x, y }).collect();
    let (h, w) = shape;
    let mut mask = Array2::from_elem((h, w), false);
    if let Some(crop) = crop_structure_mask(&ring, (w, h)) {
        let (r0, c0) = crop.origin;
        let (ch, cw) = crop.mask.as_immut().shape();
        mask.slice_mut(s![r0..r0 + ch, c0..c0 + cw])
            .assign(&crop.mask.to_bool());
    }
    Ok(mask)
}

/// 加载目录 `dir` 下名为 `name` 的结构.
pub fn load_crop(dir: &Path, name: &str) -> Result<Crop, LoadError> {
    let image = read_rgb(&dir.join(format!("{name}.png")))?;
    let (h, w, _) = image.dim();

    let npy = dir.join(format!("{name}_mask.npy"));
    let png = dir.join(format!("{name}_mask.png"));
    let json = dir.join(format!("{name}.json"));
    let mask = if npy.is_file() {
        read_mask_npy(&npy)?
    } else if png.is_file() {
        read_mask_png(&png)?
    } else if json.is_file() {
        read_mask_json(&json, (h, w))?
    } else {
        return Err(LoadError::MissingMask(name.to_string()));
    };

    if mask.dim() != (h, w) {
        return Err(LoadError::ShapeMismatch {
            mask: mask.dim(),
            crop: (h, w),
        });
    }
    Ok(Crop { image, mask })
}

/// 列出目录下所有结构名 (即不以 `_mask` 结尾的 png 文件名), 按字典序.
pub fn crop_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .filter(|s| !s.ends_with("_mask"))
        .collect();
    names.sort();
    Ok(names)
}

/// 结构裁剪图加载器. 逐个产出 `(结构名, 加载结果)`.
pub struct CropLoader {
    dir: PathBuf,
    names: std::vec::IntoIter<String>,
}

impl CropLoader {
    /// 在目录 `dir` 上创建加载器.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let names = crop_names(&dir)?.into_iter();
        Ok(Self { dir, names })
    }
}

impl Iterator for CropLoader {
    type Item = (String, Result<Crop, LoadError>);

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        let crop = load_crop(&self.dir, &name);
        Some((name, crop))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.names.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("ftu_loader_{tag}_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_rgb(path: &Path, w: u32, h: u32) {
        image::RgbImage::from_pixel(w, h, image::Rgb([200, 100, 100]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_load_with_json_polygon() {
        let dir = scratch_dir("json");
        write_rgb(&dir.join("Tubules_0.png"), 8, 6);
        fs::write(dir.join("Tubules_0.json"), "[[2, 1], [6, 1], [6, 5], [2, 5]]").unwrap();

        let mut loader = CropLoader::new(&dir).unwrap();
        let (name, crop) = loader.next().unwrap();
        assert_eq!(name, "Tubules_0");
        let crop = crop.unwrap();
        assert_eq!(crop.image.dim(), (6, 8, 3));
        assert_eq!(crop.mask.iter().filter(|b| **b).count(), 16);
        assert!(crop.mask[(1, 2)]);
        assert!(!crop.mask[(0, 0)]);
        assert!(loader.next().is_none());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_mask() {
        let dir = scratch_dir("missing");
        write_rgb(&dir.join("a.png"), 2, 2);
        assert!(matches!(load_crop(&dir, "a"), Err(LoadError::MissingMask(_))));
        fs::remove_dir_all(dir).unwrap();
    }
}
