//! # Pattern Capture 命令行入口

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use futures_lite::future;
use image::RgbaImage;
use tracing::info;

use pattern_capture::{
    ComputeBackend, DEFAULT_CONTRAST, ExtractionSummary, FrameEnhancer, PipelineConfig,
    PipelineDriver, PipelineMsg,
    config::load_config,
    ensure_supported_video, logging,
    media::image::{load_image_async, luma_spread, mean_luma},
};

#[derive(Parser)]
#[command(name = "pattern-capture", version)]
/// 命令行参数
struct ExecArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 提取视频帧并增强对比度，输出提取摘要
    Video(VideoArgs),
    /// 增强单张图片，输出亮度统计
    Still(StillArgs),
}

#[derive(Args)]
struct VideoArgs {
    /// 视频文件路径（.mov / .mp4）
    path: PathBuf,
    #[arg(long)]
    /// TOML 配置文件路径
    config: Option<PathBuf>,
    #[arg(long)]
    /// 覆盖配置中的对比度
    contrast: Option<f32>,
    #[arg(long)]
    /// 覆盖配置中的工作线程数
    max_concurrent_tasks: Option<usize>,
    #[arg(long)]
    /// 覆盖配置中的批大小
    batch_size: Option<usize>,
    #[arg(long)]
    /// 覆盖配置中的抽帧间隔
    frame_interval: Option<usize>,
    #[arg(long)]
    /// 以 JSON 输出摘要
    json: bool,
}

#[derive(Args)]
struct StillArgs {
    /// 图片文件路径
    path: PathBuf,
    #[arg(long, default_value_t = DEFAULT_CONTRAST)]
    /// 对比度
    contrast: f32,
}

fn main() -> Result<()> {
    let args = ExecArgs::parse();
    logging::init_logging();
    match args.command {
        Command::Video(video) => run_video(video),
        Command::Still(still) => run_still(&still),
    }
}

/// 读取配置文件并应用命令行覆盖
fn resolve_config(args: &VideoArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(contrast) = args.contrast {
        config.enhance.contrast = contrast;
    }
    if let Some(n) = args.max_concurrent_tasks {
        config.extract.max_concurrent_tasks = n;
    }
    if let Some(n) = args.batch_size {
        config.extract.batch_size = n;
    }
    if let Some(n) = args.frame_interval {
        config.extract.frame_interval = n;
    }
    Ok(config)
}

/// 初始化计算后端（进程内只构造一次）
fn init_backend() -> Result<Arc<ComputeBackend>> {
    let backend = ComputeBackend::initialize().context("GPU 计算后端初始化失败")?;
    info!(adapter = backend.adapter_name(), "GPU 计算后端就绪");
    Ok(Arc::new(backend))
}

fn run_video(args: VideoArgs) -> Result<()> {
    // 须在后端初始化之前
    ensure_supported_video(&args.path)?;
    let config = resolve_config(&args)?;
    let backend = init_backend()?;
    let enhancer = Arc::new(FrameEnhancer::new(backend).with_contrast(config.enhance.contrast));
    info!(contrast = enhancer.contrast(), "增强器就绪");

    let (tx, rx) = mpsc::sync_channel::<PipelineMsg>(1);
    let driver = PipelineDriver::new(enhancer, config.extract, tx);
    let handle = driver.submit(args.path)?;

    let PipelineMsg::FramesReady { source, result } =
        rx.recv().context("提取线程未返回结果")?;
    if handle.join().is_err() {
        bail!("提取线程异常退出");
    }

    print_summary(&ExtractionSummary::from_result(&source, &result), args.json)
}

fn print_summary(summary: &ExtractionSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("{}", summary.source);
    println!("{}", summary.label);
    println!(
        "frames: {} (dropped {}), frame rate: {:.3}",
        summary.frames, summary.dropped, summary.frame_rate
    );
    if let (Some(first), Some(last)) = (summary.first_index, summary.last_index) {
        println!("indices: {first}..={last}");
    }
    Ok(())
}

fn run_still(args: &StillArgs) -> Result<()> {
    let image = future::block_on(load_image_async(&args.path))?;
    let before = image.to_rgba8();
    let backend = init_backend()?;
    let enhancer = FrameEnhancer::new(backend);
    let Some(after) = enhancer.enhance(&image, args.contrast) else {
        bail!("图片增强失败: {}", args.path.display());
    };
    print_still(&args.path, &before, &after);
    Ok(())
}

fn print_still(path: &Path, before: &RgbaImage, after: &RgbaImage) {
    println!("{}", path.display());
    println!("size: {}x{}", after.width(), after.height());
    println!(
        "mean luma: {:.2} -> {:.2}",
        mean_luma(before),
        mean_luma(after)
    );
    println!(
        "luma spread: {:.2} -> {:.2}",
        luma_spread(before),
        luma_spread(after)
    );
}

