//! 细胞核流程各开关组合下的分割任务.

mod profile;

use ftu_berry::segment::{SegmentationParam, SegmenterOptions, SubCompartmentSegmenter, ViewMode};
use ftu_berry::{ImgWriteRaw, ImgWriteVis};
use log::{debug, warn};
use std::path::Path;
use utils::loader::CropLoader;

pub use profile::Profile;

/// 参与比较的开关组合: `(名称, 均衡化, 拆分接触细胞核)`.
pub const VARIANTS: [(&str, bool, bool); 4] = [
    ("full", true, true),
    ("no-equalize", false, true),
    ("no-split", true, false),
    ("plain", false, false),
];

/// 以给定开关在数据集 `dir` 上运行分割, 返回统计.
///
/// 若给出 `render_dir`, 每个结构的并排渲染图与各规则掩码会保存到该目录 (不计入耗时).
pub fn run_variant(
    name: &str,
    dir: &Path,
    params: &[SegmentationParam],
    options: SegmenterOptions,
    render_dir: Option<&Path>,
) -> Profile {
    let segmenter = SubCompartmentSegmenter::new(params.to_vec()).with_options(options);
    let mut profile = Profile::new();
    let loader = match CropLoader::new(dir) {
        Ok(l) => l,
        Err(e) => {
            warn!("{name}: cannot list `{}`: {e}", dir.display());
            return profile.finish();
        }
    };
    for (crop_name, crop) in loader {
        let crop = match crop {
            Ok(c) => c,
            Err(e) => {
                warn!("{name}: skip `{crop_name}`: {e}");
                profile.count_skipped();
                continue;
            }
        };
        let mask_pixels = crop.mask.iter().filter(|b| **b).count();
        if mask_pixels == 0 {
            debug!("{name}: skip `{crop_name}`: empty mask");
            profile.count_skipped();
            continue;
        }
        debug!("{name}: `{crop_name}`...");
        profile.target_start();
        let out = segmenter.segment(crop.image.view(), crop.mask.view());
        profile.target_elapsed(mask_pixels, out.stats());

        if let Some(rd) = render_dir {
            let rendered = out.render(crop.image.view(), params, ViewMode::SideBySide, 0.5);
            if let Err(e) = rendered.save_raw(rd.join(format!("{crop_name}_{name}.png"))) {
                warn!("{name}: cannot save render of `{crop_name}`: {e}");
            }
            for (i, p) in params.iter().enumerate() {
                let path = rd.join(format!("{crop_name}_{name}_{}.png", p.name.replace(' ', "_")));
                if let Err(e) = out.mask_of(i).save(path) {
                    warn!("{name}: cannot save `{}` mask of `{crop_name}`: {e}", p.name);
                }
            }
        }
    }
    profile.finish()
}
