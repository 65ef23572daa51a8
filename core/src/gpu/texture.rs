//! 纹理封装
//!
//! 每次增强调用各自持有一对输入/输出纹理，调用结束即释放

/// 纹理用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// 解码帧输入（BGRA8）
    FrameInput,
    /// 静态图像输入（RGBA8）
    ImageInput,
    /// 内核输出（RGBA8，可写存储纹理）
    Output,
}

impl TextureKind {
    /// 对应的纹理格式
    #[must_use]
    pub const fn format(self) -> wgpu::TextureFormat {
        match self {
            Self::FrameInput => wgpu::TextureFormat::Bgra8Unorm,
            Self::ImageInput | Self::Output => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// 对应的纹理用途标志
    #[must_use]
    pub fn usage(self) -> wgpu::TextureUsages {
        let common = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        match self {
            Self::FrameInput | Self::ImageInput => common,
            Self::Output => common | wgpu::TextureUsages::STORAGE_BINDING,
        }
    }

    /// 调试标签
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FrameInput => "frame-input-texture",
            Self::ImageInput => "image-input-texture",
            Self::Output => "enhance-output-texture",
        }
    }
}

/// 设备端二维纹理及其视图
pub struct GpuTexture {
    /// 纹理
    texture: wgpu::Texture,
    /// 默认视图
    view: wgpu::TextureView,
    /// 用途
    kind: TextureKind,
    /// 宽度
    width: u32,
    /// 高度
    height: u32,
}

impl GpuTexture {
    /// 在设备上创建指定用途的纹理
    pub(crate) fn create(device: &wgpu::Device, kind: TextureKind, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(kind.label()),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: kind.format(),
            usage: kind.usage(),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            kind,
            width,
            height,
        }
    }

    /// 宽度
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// 高度
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// 纹理格式
    #[must_use]
    pub const fn format(&self) -> wgpu::TextureFormat {
        self.kind.format()
    }

    /// 与另一纹理尺寸是否一致
    #[must_use]
    pub const fn same_extent(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub(crate) const fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) const fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) const fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}
