//! Pattern Capture 核心库
//!
//! 视频解码 → GPU 对比度增强 → 按序收集结果与时间元数据。

pub mod config;
pub mod driver;
pub mod enhancer;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod gpu;
pub mod logging;
pub mod media;

pub use config::{DEFAULT_CONTRAST, ExtractOptions, PipelineConfig};
pub use driver::{ExtractionSummary, PipelineDriver, PipelineMsg, ensure_supported_video, is_supported_video, timeline_label};
pub use enhancer::{FrameEnhance, FrameEnhancer};
pub use error::{BackendError, ExtractError};
pub use extractor::{ExtractionState, FrameExtractor, spawn_extraction};
pub use frame::{EnhancedImage, ExtractionResult, PixelBuffer, RawFrame};
pub use gpu::ComputeBackend;
