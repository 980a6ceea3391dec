#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 为病理切片看板提供功能性组织单元 (FTU) 的空间标注, 属性聚合与子区室分割.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 坐标有两套: 切片原生 **像素坐标** 与瓦片查看器的 **地图坐标**. 二者之间只差一个比例,
//!   其中 y 方向比例为负. 几何库内部一律使用地图坐标.
//! 2. 在非期望情况下 (例如分割输入的形状不符), 程序会直接 panic, 而不会导致内存错误.
//!   As what Rust promises.
//!
//! # 开发计划
//!
//! ### 像素坐标与地图坐标互转, 瓦片网格 ✅
//!
//! 实现位于 `ftu-berry/src/coord`.
//!
//! ### 分图层的几何库 ✅
//!
//! 导入 polyline / rectangle / point 标注, 每 50 个结构维护一个分组包围盒.
//! 手绘区域与标记点作为会话图层追加.
//!
//! 实现位于 `ftu-berry/src/store`.
//!
//! ### 相交查询 ✅
//!
//! 视野矩形先经分组包围盒与结构包围盒粗筛, 再做精确相交测试.
//!
//! 实现位于 `ftu-berry/src/query.rs`.
//!
//! ### 属性聚合 ✅
//!
//! 标量均值, 类别直方图, 向量均值, 以及带面积加权的层级比例分布.
//!
//! 实现位于 `ftu-berry/src/aggregate`.
//!
//! ### 子区室分割 ✅
//!
//! 1. 饱和度阈值 (PAS, 管腔). ✅
//! 2. 细胞核: 掩码内局部直方图均衡化 + 距离变换 + 分水岭. ✅
//! 3. 叠加 / 并排两种渲染方式. ✅
//! 4. 多结构并行分割 (`rayon` 特性). ✅
//!
//! 实现位于 `ftu-berry/src/segment`.
//!
//! ### 切片会话 ✅
//!
//! 取代全局状态, 并提供读写锁包装以便多线程共享.
//!
//! 实现位于 `ftu-berry/src/session.rs`.
//!
//! ### 小功能 ✅
//!
//! 1. 会话图层的 GeoJSON 导出 (像素坐标). ✅
//! 2. 叠加热力图取值 (`field --> value --> sub_value` 以及 `max`). ✅
//! 3. 消融实验中的 `Profile` 统计. ✅

/// 二维索引 `(行, 列)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

type Predicate = fn(u8) -> bool;

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

/// 二维掩码基础数据结构.
mod data;

pub use data::{ImgWriteRaw, ImgWriteVis, MaskSlice, MaskSliceMut, OwnedMask};

pub mod consts;

pub mod coord;

pub mod property;

pub mod store;

pub mod query;

pub mod aggregate;

pub mod segment;

pub mod session;

pub mod prelude;
