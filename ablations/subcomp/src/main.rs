//! 子区室分割消融实验: 比较细胞核流程各开关组合的耗时与检出量.
//!
//! 数据集位置见 [`utils::loader::crop_dir_from_env_or_home`],
//! 分割规则见 [`utils::loader::params_from_env`].

mod algos;
mod result;
mod runner;

fn main() -> std::io::Result<()> {
    utils::init_logger();
    runner::run().analyze()
}
