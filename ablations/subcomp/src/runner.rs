//! 程序运行函数.

use crate::algos::{run_variant, VARIANTS};
use crate::result::AblationResult;
use ftu_berry::segment::SegmenterOptions;
use log::info;
use std::thread;
use utils::loader;

/// 实际运行.
pub fn run() -> AblationResult {
    let crop_dir = loader::crop_dir_from_env_or_home().expect("Cannot locate home directory");
    assert!(crop_dir.is_dir(), "`{}` is not a directory", crop_dir.display());
    let p = crop_dir.as_path();

    // 短路判断
    assert!(
        loader::CropLoader::new(p)
            .ok()
            .and_then(|mut l| l.next())
            .is_some_and(|(_, r)| r.is_ok()),
        "Loading dataset config error"
    );

    let params = loader::params_from_env();
    let params = params.as_slice();
    let render_dir = loader::render_dir_from_env();
    let render_dir = render_dir.as_deref();
    info!(
        "Running ablation studies with {} rules on {} threads...",
        params.len(),
        utils::cpus()
    );
    thread::scope(|s| {
        let handles = VARIANTS.map(|(name, equalize, split_touching)| {
            let options = SegmenterOptions {
                equalize,
                split_touching,
            };
            s.spawn(move || run_variant(name, p, params, options, render_dir))
        });

        AblationResult::from_iter(
            VARIANTS.map(|(name, ..)| name).into_iter().zip(
                handles
                    .into_iter()
                    .map(|th| th.join().expect("Thread joining error")),
            ),
        )
    })
}
