//! 计算后端：GPU 设备、对比度内核管线与纹理工厂
//!
//! 进程内只构造一次，之后以只读方式在各工作线程间共享（`Arc<ComputeBackend>`）。
//! 每次内核调度使用独立的命令编码器与提交，并阻塞等待设备完成。

use std::borrow::Cow;
use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use futures_lite::future;
use image::{DynamicImage, RgbaImage};
use tracing::{info, warn};
use wgpu::util::DeviceExt;

use super::texture::{GpuTexture, TextureKind};
use crate::error::BackendError;
use crate::frame::{BYTES_PER_PIXEL, PixelBuffer};

/// 工作组边长（8×8）
pub const WORKGROUP_SIZE: u32 = 8;

/// 覆盖整个输出范围所需的工作组数量
#[must_use]
pub const fn workgroup_count(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(WORKGROUP_SIZE),
        height.div_ceil(WORKGROUP_SIZE),
    )
}

#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
/// 内核参数（uniform 需要 16 字节对齐）
struct KernelParams {
    /// 对比度系数
    contrast: f32,
    /// 填充
    _padding: [f32; 3],
}

/// GPU 计算后端
pub struct ComputeBackend {
    /// GPU 设备
    device: wgpu::Device,
    /// 命令队列
    queue: wgpu::Queue,
    /// 对比度内核管线
    pipeline: wgpu::ComputePipeline,
    /// 绑定组布局（输入纹理 + 输出存储纹理 + 参数）
    bind_group_layout: wgpu::BindGroupLayout,
    /// 二维纹理边长上限
    max_dimension: u32,
    /// 适配器名称
    adapter_name: String,
}

impl ComputeBackend {
    /// 获取 GPU 设备并编译对比度内核
    ///
    /// 着色器随程序一起编译进来；若设备拒绝该管线，wgpu 的未捕获错误处理器会直接终止进程，
    /// 不会退化为不做增强的直通模式。
    ///
    /// # Errors
    ///
    /// - 没有可用的适配器
    /// - 设备创建失败
    pub fn initialize() -> Result<Self, BackendError> {
        Self::initialize_with(false)
    }

    /// 使用软件适配器（如 lavapipe）构造后端
    ///
    /// # Errors
    ///
    /// 同 [`ComputeBackend::initialize`]
    pub fn initialize_software() -> Result<Self, BackendError> {
        Self::initialize_with(true)
    }

    fn initialize_with(force_fallback_adapter: bool) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::default();
        let adapter = future::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter,
            compatible_surface: None,
        }))
        .map_err(|e| BackendError::NoDevice(e.to_string()))?;

        let adapter_info = adapter.get_info();
        let (device, queue) = future::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("enhance-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("contrast-kernel"),
            source: wgpu::ShaderSource::Wgsl(include_str!("enhance.wgsl").into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("contrast-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: TextureKind::Output.format(),
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("contrast-pl"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("contrast-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let max_dimension = device.limits().max_texture_dimension_2d;
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            max_dimension,
            "GPU 计算后端已就绪"
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            max_dimension,
            adapter_name: adapter_info.name,
        })
    }

    /// 适配器名称
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// 二维纹理边长上限
    #[must_use]
    pub const fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// 将解码帧的 BGRA8 像素缓冲上传为输入纹理
    ///
    /// 缓冲长度与尺寸不符、尺寸为零或超过上限时返回 `None`
    #[must_use]
    pub fn texture_from_pixel_buffer(&self, buffer: &PixelBuffer) -> Option<GpuTexture> {
        if !buffer.is_well_formed() {
            warn!(
                width = buffer.width,
                height = buffer.height,
                len = buffer.bgra.len(),
                "像素缓冲不是紧密排列的 BGRA8，拒绝上传"
            );
            return None;
        }
        self.create_with_pixels(TextureKind::FrameInput, buffer.width, buffer.height, &buffer.bgra)
    }

    /// 将任意 CPU 图像转换为 RGBA8 后上传为输入纹理
    #[must_use]
    pub fn texture_from_image(&self, image: &DynamicImage) -> Option<GpuTexture> {
        let rgba = match image {
            DynamicImage::ImageRgba8(rgba) => Cow::Borrowed(rgba),
            other => Cow::Owned(other.to_rgba8()),
        };
        self.texture_from_rgba(&rgba)
    }

    /// 将 RGBA8 图像上传为输入纹理
    #[must_use]
    pub fn texture_from_rgba(&self, image: &RgbaImage) -> Option<GpuTexture> {
        self.create_with_pixels(
            TextureKind::ImageInput,
            image.width(),
            image.height(),
            image.as_raw(),
        )
    }

    /// 分配一张空的可读写输出纹理
    #[must_use]
    pub fn allocate_texture(&self, width: u32, height: u32) -> Option<GpuTexture> {
        self.create_texture(TextureKind::Output, width, height)
    }

    /// 在整个输出范围上调度对比度内核并等待完成
    ///
    /// 输出尺寸为零时不做任何事，仅记录日志。
    ///
    /// # Errors
    ///
    /// - 输入与输出尺寸不一致
    /// - 设备报告验证错误或显存不足
    /// - 等待设备完成失败
    pub fn run_kernel(
        &self,
        input: &GpuTexture,
        output: &GpuTexture,
        contrast: f32,
    ) -> Result<(), BackendError> {
        if output.width() == 0 || output.height() == 0 {
            warn!("输出纹理尺寸无效，跳过内核调度");
            return Ok(());
        }
        if !input.same_extent(output) {
            return Err(BackendError::ExtentMismatch {
                input: (input.width(), input.height()),
                output: (output.width(), output.height()),
            });
        }

        let params = KernelParams {
            contrast,
            _padding: [0.0; 3],
        };
        self.scoped("run_kernel", || {
            let params_buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("contrast-params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("contrast-bg"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(input.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(output.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("contrast-encoder"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("contrast-pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                let (groups_x, groups_y) = workgroup_count(output.width(), output.height());
                pass.dispatch_workgroups(groups_x, groups_y, 1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        })?;
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        Ok(())
    }

    /// 将纹理内容读回 CPU 并包装为 RGBA8 图像
    ///
    /// BGRA8 纹理会显式交换通道；alpha 按原样保留（不做预乘转换）
    #[must_use]
    pub fn image_from_texture(&self, texture: &GpuTexture) -> Option<RgbaImage> {
        match self.read_back(texture) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(error = %e, "纹理读回失败");
                None
            }
        }
    }

    /// 在错误作用域内执行一步设备操作
    ///
    /// 验证错误与显存不足被作用域捕获并转为 `Err`，不会进入设备的未捕获错误处理器。
    /// 作用域按线程隔离，多个工作线程可以同时使用。
    fn scoped<T>(&self, step: &'static str, op: impl FnOnce() -> T) -> Result<T, BackendError> {
        let oom = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = op();
        // 后压入的先弹出
        let validation_error = future::block_on(validation.pop());
        let oom_error = future::block_on(oom.pop());
        match validation_error.or(oom_error) {
            Some(e) => Err(BackendError::Device {
                step,
                message: e.to_string(),
            }),
            None => Ok(value),
        }
    }

    /// 创建纹理并上传紧密排列的像素，任一步骤失败返回 `None`
    fn create_with_pixels(
        &self,
        kind: TextureKind,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Option<GpuTexture> {
        let texture = self.create_texture(kind, width, height)?;
        match self.scoped("upload", || self.upload(&texture, bytes)) {
            Ok(()) => Some(texture),
            Err(e) => {
                warn!(error = %e, kind = ?kind, "纹理上传失败");
                None
            }
        }
    }

    /// 检查尺寸后在错误作用域内创建纹理
    fn create_texture(&self, kind: TextureKind, width: u32, height: u32) -> Option<GpuTexture> {
        if width == 0 || height == 0 {
            warn!(width, height, kind = ?kind, "纹理尺寸为零，无法创建");
            return None;
        }
        if width > self.max_dimension || height > self.max_dimension {
            let e = BackendError::TextureTooLarge {
                width,
                height,
                limit: self.max_dimension,
            };
            warn!(error = %e, kind = ?kind, "纹理创建失败");
            return None;
        }
        match self.scoped("create_texture", || {
            GpuTexture::create(&self.device, kind, width, height)
        }) {
            Ok(texture) => Some(texture),
            Err(e) => {
                warn!(error = %e, kind = ?kind, "纹理创建失败");
                None
            }
        }
    }

    /// 以紧密排列的行上传像素
    fn upload(&self, texture: &GpuTexture, bytes: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: texture.raw(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(texture.width() * BYTES_PER_PIXEL as u32),
                rows_per_image: Some(texture.height()),
            },
            texture.extent(),
        );
    }

    /// 复制到按行对齐的暂存缓冲，映射后去除行填充
    fn read_back(&self, texture: &GpuTexture) -> Result<RgbaImage, BackendError> {
        let width = texture.width();
        let height = texture.height();
        let unpadded_row = width * BYTES_PER_PIXEL as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = unpadded_row.div_ceil(align) * align;

        let staging = self.scoped("read_back", || {
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback-staging"),
                size: u64::from(padded_row) * u64::from(height),
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("readback-encoder"),
                });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: texture.raw(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(height),
                    },
                },
                texture.extent(),
            );
            self.queue.submit(std::iter::once(encoder.finish()));
            staging
        })?;

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        rx.recv()
            .map_err(|_| BackendError::Readback("映射回调未触发".into()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity(unpadded_row as usize * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(row.get(..unpadded_row as usize).unwrap_or_default());
            }
        }
        staging.unmap();

        if texture.format() == wgpu::TextureFormat::Bgra8Unorm {
            swap_red_blue(&mut pixels);
        }

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| BackendError::Readback("像素长度与尺寸不符".into()))
    }
}

/// BGRA8 ↔ RGBA8 通道交换
fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 优先使用硬件适配器，退回软件适配器
    fn test_backend() -> ComputeBackend {
        ComputeBackend::initialize()
            .or_else(|_| ComputeBackend::initialize_software())
            .expect("没有可用的 GPU 或软件适配器")
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) % 256) as u8,
                200,
            ])
        })
    }

    fn run(backend: &ComputeBackend, input: &GpuTexture, contrast: f32) -> RgbaImage {
        let output = backend
            .allocate_texture(input.width(), input.height())
            .unwrap();
        backend.run_kernel(input, &output, contrast).unwrap();
        backend.image_from_texture(&output).unwrap()
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_device_errors_are_captured() {
        let backend = test_backend();
        // 未启用 BGRA8UNORM_STORAGE 时，BGRA 存储纹理是验证错误
        let result = backend.scoped("create_texture", || {
            backend.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("invalid-storage"),
                size: wgpu::Extent3d {
                    width: 4,
                    height: 4,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Bgra8Unorm,
                usage: wgpu::TextureUsages::STORAGE_BINDING,
                view_formats: &[],
            })
        });
        assert!(matches!(
            result,
            Err(BackendError::Device {
                step: "create_texture",
                ..
            })
        ));
        // 作用域弹出后设备仍然可用
        let input = backend.texture_from_rgba(&gradient(4, 4)).unwrap();
        let out = run(&backend, &input, 1.0);
        assert_eq!(out.dimensions(), (4, 4));
    }

    #[test]
    fn test_workgroup_count_covers_extent() {
        assert_eq!(workgroup_count(8, 8), (1, 1));
        assert_eq!(workgroup_count(9, 8), (2, 1));
        assert_eq!(workgroup_count(1920, 1080), (240, 135));
        assert_eq!(workgroup_count(1, 17), (1, 3));
    }

    #[test]
    fn test_swap_red_blue() {
        let mut px = vec![1, 2, 3, 4, 5, 6, 7, 8];
        swap_red_blue(&mut px);
        assert_eq!(px, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_kernel_params_layout() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 16);
    }

    #[test]
    fn test_backend_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ComputeBackend>();
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_zero_sized_texture_rejected() {
        let backend = test_backend();
        assert!(backend.allocate_texture(0, 16).is_none());
        assert!(backend.allocate_texture(16, 0).is_none());
        let limit = backend.max_texture_dimension();
        assert!(backend.allocate_texture(limit + 1, 1).is_none());
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_malformed_pixel_buffer_rejected() {
        let backend = test_backend();
        let buffer = PixelBuffer {
            bgra: vec![0; 10],
            width: 4,
            height: 4,
            timestamp: 0.0,
        };
        assert!(backend.texture_from_pixel_buffer(&buffer).is_none());
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_identity_contrast_preserves_pixels() {
        let backend = test_backend();
        // 非 256 字节对齐的行宽，覆盖读回时的去填充逻辑
        let src = gradient(37, 19);
        let input = backend.texture_from_rgba(&src).unwrap();
        let out = run(&backend, &input, 1.0);
        assert_eq!(out.dimensions(), src.dimensions());
        for (a, b) in src.pixels().zip(out.pixels()) {
            for c in 0..4 {
                assert!(a.0[c].abs_diff(b.0[c]) <= 1, "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_kernel_is_deterministic() {
        let backend = test_backend();
        let src = gradient(64, 48);
        let input = backend.texture_from_rgba(&src).unwrap();
        let first = run(&backend, &input, 1.8);
        let second = run(&backend, &input, 1.8);
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_contrast_spreads_from_midpoint() {
        let backend = test_backend();
        let src = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([64, 64, 64, 255])
            } else {
                image::Rgba([192, 192, 192, 255])
            }
        });
        let input = backend.texture_from_rgba(&src).unwrap();
        let out = run(&backend, &input, 2.0);
        let dark = out.get_pixel(0, 0).0;
        let bright = out.get_pixel(1, 0).0;
        assert!(dark[0] < 64);
        assert!(bright[0] > 192);
        // alpha 不参与变换
        assert_eq!(dark[3], 255);
        assert_eq!(bright[3], 255);

        // 对比度为 0 时全部收缩到中灰
        let flat = run(&backend, &input, 0.0);
        for px in flat.pixels() {
            assert!(px.0[0].abs_diff(128) <= 1);
        }
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_bgra_frame_reads_back_as_rgba() {
        let backend = test_backend();
        // 纯蓝色像素的 BGRA 表示
        let buffer = PixelBuffer {
            bgra: [255, 0, 0, 255].repeat(3 * 2),
            width: 3,
            height: 2,
            timestamp: 0.0,
        };
        let input = backend.texture_from_pixel_buffer(&buffer).unwrap();
        let out = run(&backend, &input, 1.0);
        for px in out.pixels() {
            assert_eq!(px.0, [0, 0, 255, 255]);
        }
        // 直接读回 BGRA 输入纹理同样得到 RGBA 顺序
        let raw = backend.image_from_texture(&input).unwrap();
        assert_eq!(raw.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    #[ignore = "需要 GPU 或软件适配器"]
    fn test_extent_mismatch_is_error() {
        let backend = test_backend();
        let input = backend.texture_from_rgba(&gradient(8, 8)).unwrap();
        let output = backend.allocate_texture(16, 8).unwrap();
        assert!(matches!(
            backend.run_kernel(&input, &output, 1.0),
            Err(BackendError::ExtentMismatch { .. })
        ));
    }
}
