//! 消融实验依赖的通用组件.

use log::LevelFilter;
use std::env;
use std::io;
use std::str::FromStr;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: io::Write>(mut w: W) -> io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 日志级别. 读取环境变量 `$FTU_LOG` (如 `debug`), 缺省或无法识别时为 `info`.
pub fn log_level_from_env() -> LevelFilter {
    env::var("FTU_LOG")
        .ok()
        .and_then(|s| LevelFilter::from_str(s.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

/// 初始化终端日志. 重复初始化时忽略错误.
pub fn init_logger() {
    let level = log_level_from_env();
    if simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_to() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SEP.len() + 1);
    }

    #[test]
    fn test_cpus() {
        assert!(cpus() >= 1);
    }
}
