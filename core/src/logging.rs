//! 日志系统初始化模块

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, fmt};

/// 只显示 `HH:MM:SS.微秒` 的时间格式化器（UTC）
struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let total_secs = now.as_secs();
        let h = (total_secs / 3600) % 24;
        let m = (total_secs / 60) % 60;
        let s = total_secs % 60;

        write!(w, "{h:02}:{m:02}:{s:02}.{:06}", now.subsec_micros())
    }
}

/// 初始化全局日志系统
///
/// 使用 `tracing-subscriber`，支持环境变量 `RUST_LOG` 控制日志级别，输出到标准错误。
/// 只应由可执行程序调用一次；重复调用时保留已有的订阅者。
///
/// # 使用方式
///
/// ```bash
/// RUST_LOG=info pattern-capture video clip.mp4                   # info 及以上级别
/// RUST_LOG=pattern_capture=debug pattern-capture video clip.mp4  # 查看状态迁移
/// ```
pub fn init_logging() {
    // 从环境变量 RUST_LOG 读取日志级别，默认为 info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_names(true) // 工作线程的日志需要区分来源
        .with_file(false)
        .with_line_number(false)
        .with_timer(ClockTime)
        .with_writer(std::io::stderr) // 标准输出留给结果
        .compact()
        .try_init();
}
