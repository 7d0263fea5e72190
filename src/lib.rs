//! # 滑块验证码求解器：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 调用方（浏览器自动化脚本 / CLI）          │
//! │      背景图 + 拼图 + 裁剪带（浏览器坐标）                │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↓
//! ┌───────┼──────────────────────────────────────────────────┐
//! │  ┌─ captcha ──── SliderSolver（配置快照 + 重试 + 计时）   │
//! │  │   ├─ loader       URL / Base64 / 文件加载与校验        │
//! │  │   ├─ scale/crop   浏览器坐标 -> 实际像素裁剪           │
//! │  │   └─ matcher      灰度 -> 高斯 -> Canny -> NCC        │
//! │  │                                                       │
//! │  ├─ trajectory ─ 拟人轨迹生成 + PointerDriver 回放        │
//! │  │                                                       │
//! │  └─ error ────── AppError（命令行入口统一错误）           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`captcha`] | 图片加载、坐标换算、裁剪、边缘模板匹配、浏览器偏移 |
//! | [`trajectory`] | 加速/减速/抖动轨迹生成，`enigo` 指针回放 |
//! | [`error`] | 命令行入口的统一错误类型 `AppError` |

pub mod captcha;
pub mod error;
pub mod trajectory;
