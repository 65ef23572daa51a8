//! GPU 计算后端模块
//!
//! - `backend`：设备、计算管线与纹理工厂
//! - `texture`：输入/输出纹理的封装

mod backend;
mod texture;

pub use backend::{ComputeBackend, WORKGROUP_SIZE, workgroup_count};
pub use texture::{GpuTexture, TextureKind};
