//! tao-cli - iLBC 编解码测试工具
//!
//! 用法: `tao-cli <mode> <in.pcm> <encoded> <decoded> [channel-loss-file]`
//!
//! - `mode`: 帧长 20 或 30 (ms)
//! - `in.pcm` / `decoded`: 8 kHz 16 位小端单声道 PCM
//! - `channel-loss-file`: 每帧一个 16 位小端字, 0 表示丢失, 读完后循环

mod driver;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::Parser;

use tao_codec::CodecRegistry;
use tao_codec::ilbc::IlbcMode;

use driver::{DriverConfig, PlcBackend};

#[derive(Parser, Debug)]
#[command(name = "tao-cli", version, about = "纯 Rust iLBC 编解码测试工具")]
struct Cli {
    /// 帧长 (ms): 20 或 30
    mode: Option<u32>,

    /// 输入 PCM 文件
    input: Option<PathBuf>,

    /// 输出码流文件
    encoded: Option<PathBuf>,

    /// 输出解码 PCM 文件
    decoded: Option<PathBuf>,

    /// 信道丢包文件
    loss_file: Option<PathBuf>,

    /// 关闭解码后增强器
    #[arg(long)]
    no_enhancer: bool,

    /// 丢失帧的隐藏方式
    #[arg(long, value_enum, default_value_t = PlcBackend::Ilbc)]
    plc: PlcBackend,

    /// 显示版本和编译信息
    #[arg(long)]
    build_info: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("tao-cli", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if cli.build_info {
        print_build_info();
        return;
    }

    let (Some(mode), Some(input), Some(encoded), Some(decoded)) =
        (cli.mode, cli.input, cli.encoded, cli.decoded)
    else {
        print_banner();
        return;
    };

    let Some(mode) = IlbcMode::from_frame_size(mode) else {
        eprintln!("错误: 不支持的帧长 {mode} ms, 只能是 20 或 30");
        process::exit(1);
    };

    let config = DriverConfig {
        mode,
        input,
        encoded,
        decoded,
        loss_file: cli.loss_file,
        use_enhancer: !cli.no_enhancer,
        plc: cli.plc,
    };

    eprintln!(
        "tao-cli 版本 {} -- 纯 Rust iLBC 编解码测试工具",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("输入: {}", config.input.display());
    eprintln!("码流: {}", config.encoded.display());
    eprintln!("输出: {}", config.decoded.display());
    if let Some(loss) = &config.loss_file {
        eprintln!("丢包: {}", loss.display());
    }

    match driver::run(&config) {
        Ok(stats) => {
            let audio_ms = stats.frames as u64 * mode.frame_ms() as u64;
            eprintln!(
                "完成: {} 帧 ({} ms 音频), 丢失 {} 帧, 码流 {} 字节",
                stats.frames, audio_ms, stats.lost_frames, stats.encoded_bytes
            );
            eprintln!("耗时: {:.3} s", stats.elapsed.as_secs_f64());
        }
        Err(e) => {
            eprintln!("错误: {e:#}");
            process::exit(1);
        }
    }
}

fn print_banner() {
    eprintln!(
        "tao-cli 版本 {} -- 纯 Rust iLBC 编解码测试工具",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("用法: tao-cli <mode> <in.pcm> <encoded> <decoded> [channel-loss-file]");
    eprintln!("  mode: 20 或 30 (ms)");
    eprintln!("使用 --help 查看全部选项");
}

fn print_build_info() {
    println!("tao-cli 版本 {}", env!("CARGO_PKG_VERSION"));
    println!("  构建目标: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
    println!("  编译器: rustc");
    println!();
    println!("已注册编解码器:");
    let mut codec_registry = CodecRegistry::new();
    tao_codec::register_all(&mut codec_registry);
    let decoders = codec_registry.list_decoders();
    let encoders = codec_registry.list_encoders();
    println!("  解码器 ({}):", decoders.len());
    for (id, name) in &decoders {
        println!("    {name} ({id})");
    }
    println!("  编码器 ({}):", encoders.len());
    for (id, name) in &encoders {
        println!("    {name} ({id})");
    }
    println!();
    println!("NetEq DSP 采样率: 8000/16000/32000/48000 Hz");
}
