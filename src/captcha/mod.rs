//! # 滑块验证码识别模块（captcha）
//!
//! ## 设计思路
//!
//! 将“图片来源 → 加载解码 → 坐标换算 → 裁剪 → 边缘匹配 → 偏移回算”按职责拆分为多个子模块。
//! 图像算法部分全部是同步、无共享状态的纯函数，编排层负责异步加载、重试与配置。
//!
//! - `solver`：编排整条识别流水线（配置快照、阶段耗时、重试、置信度策略）
//! - `loader`：负责 URL/Base64/文件加载与输入校验
//! - `raster`：强类型图像缓冲与解码
//! - `scale` / `crop`：浏览器空间与实际像素空间的换算、条带裁剪
//! - `filters` / `edges` / `matcher`：高斯平滑、Canny、归一化互相关
//! - `diagnostics`：标注图与中间产物输出
//! - `config/error/source`：配置、错误、数据源模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! SliderSolver::locate_offset
//!    ├─ loader.rs（来源加载 + 体积/签名校验，RetryPolicy 重试）
//!    ├─ raster.rs（解码 + 像素上限）
//!    ├─ scale.rs（BrowserBand -> CropRegion）
//!    ├─ crop.rs（提取条带）
//!    ├─ matcher.rs（edges.rs + filters.rs -> 得分面 -> 最大值）
//!    └─ scale.rs（匹配 x -> 浏览器偏移）
//!    ↓
//! SliderOffset
//! ```

mod config;
mod crop;
mod diagnostics;
mod edges;
mod error;
mod filters;
mod loader;
mod matcher;
mod raster;
mod scale;
mod solver;
mod source;

pub use config::{RegistrationConfig, RetryPolicy, SolverConfig};
pub use crop::crop_to_region;
pub use diagnostics::{cropped_name, match_result_name, resolve_output_path, save_match_diagnostic};
pub use edges::{EdgeMap, edge_map};
pub use error::{CaptchaError, Stage};
pub use matcher::{MatchResult, match_template};
pub use raster::RasterImage;
pub use scale::{BrowserBand, CropRegion, ScaleContext};
pub use solver::{CroppedBackground, SliderOffset, SliderSolver, retry_fixed};
pub use source::ImageSource;
