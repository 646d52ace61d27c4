//! iLBC 编解码测试流程.
//!
//! 读取 16 位小端单声道 PCM, 按帧编码写出码流, 按丢包文件模拟信道,
//! 再解码 (丢失帧走 PLC) 写出 PCM.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use tao_codec::ilbc::{IlbcDecoder, IlbcEncoder, IlbcMode};
use tao_neteq::{DspOperations, Mode, SpeechType, VadDecision};

/// iLBC 固定 8 kHz
const SAMPLE_RATE: u32 = 8000;
/// NetEq 每次输出 10 ms
const NETEQ_CHUNK: usize = 80;

/// 丢失帧的隐藏方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlcBackend {
    /// iLBC 解码器自带的 PLC
    Ilbc,
    /// 解码器输出经过 NetEq DSP, 丢失帧由 Expand 生成
    Neteq,
}

/// 一次运行的参数
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub mode: IlbcMode,
    pub input: PathBuf,
    pub encoded: PathBuf,
    pub decoded: PathBuf,
    pub loss_file: Option<PathBuf>,
    pub use_enhancer: bool,
    pub plc: PlcBackend,
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames: usize,
    pub lost_frames: usize,
    pub encoded_bytes: usize,
    pub decoded_samples: usize,
    pub elapsed: Duration,
}

/// 信道丢包模式: 每帧一个 16 位小端字, 0 表示丢失
///
/// 文件读完后从头循环.
#[derive(Debug, Clone, Default)]
pub struct LossPattern {
    received: Vec<bool>,
}

impl LossPattern {
    /// 所有帧都收到
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut received = Vec::new();
        loop {
            match reader.read_u16::<LittleEndian>() {
                Ok(word) => received.push(word != 0),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context("读取丢包文件失败"),
            }
        }
        if received.is_empty() {
            warn!("丢包文件为空, 视为无丢包");
        }
        Ok(Self { received })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("打开丢包文件失败: {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn is_received(&self, frame: usize) -> bool {
        if self.received.is_empty() {
            return true;
        }
        self.received[frame % self.received.len()]
    }
}

/// 读取整帧的 PCM 采样, 不足一帧的尾部丢弃
pub fn read_pcm<R: Read>(mut reader: R, block_len: usize) -> Result<Vec<i16>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).context("读取 PCM 失败")?;
    if bytes.len() % 2 != 0 {
        warn!("PCM 字节数为奇数, 忽略最后一个字节");
    }
    let total = bytes.len() / 2;
    let usable = total - total % block_len;
    if usable < total {
        warn!(
            "输入末尾 {} 个采样不足一帧 ({} 个), 已丢弃",
            total - usable,
            block_len
        );
    }
    let mut samples = vec![0i16; usable];
    let mut cursor = &bytes[..usable * 2];
    cursor
        .read_i16_into::<LittleEndian>(&mut samples)
        .context("解析 PCM 失败")?;
    Ok(samples)
}

fn write_pcm<W: Write>(mut writer: W, samples: &[i16]) -> Result<()> {
    for &s in samples {
        writer.write_i16::<LittleEndian>(s)?;
    }
    writer.flush()?;
    Ok(())
}

/// 把 iLBC 解码输出送进 NetEq, 丢失帧由 Expand 隐藏
struct NetEqConcealer {
    dsp: DspOperations,
    chunk: Vec<i16>,
}

impl NetEqConcealer {
    fn new() -> Result<Self> {
        let dsp = DspOperations::new(SAMPLE_RATE, 1).context("创建 NetEq DSP 失败")?;
        Ok(Self {
            dsp,
            chunk: vec![0; NETEQ_CHUNK],
        })
    }

    fn received(&mut self, decoded: &[i16], out: &mut Vec<i16>) -> Result<()> {
        for piece in decoded.chunks(NETEQ_CHUNK) {
            if self.dsp.last_mode() == Mode::Expand {
                self.dsp.do_merge(piece, SpeechType::Speech)?;
            } else {
                self.dsp.do_normal(piece, SpeechType::Speech)?;
            }
            self.pull(out)?;
        }
        Ok(())
    }

    fn lost(&mut self, block_len: usize, out: &mut Vec<i16>) -> Result<()> {
        for _ in 0..block_len / NETEQ_CHUNK {
            self.dsp.do_expand()?;
            self.pull(out)?;
        }
        Ok(())
    }

    fn pull(&mut self, out: &mut Vec<i16>) -> Result<()> {
        let n = self.dsp.get_audio(VadDecision::NotRunning, &mut self.chunk)?;
        out.extend_from_slice(&self.chunk[..n]);
        Ok(())
    }
}

/// 编码阶段: 返回每帧的码流
fn encode_all(mode: IlbcMode, pcm: &[i16]) -> Result<Vec<Vec<u8>>> {
    let mut encoder = IlbcEncoder::new(mode);
    pcm.chunks(mode.block_len())
        .map(|block| encoder.encode(block).context("iLBC 编码失败"))
        .collect()
}

/// 执行完整的 编码 -> 信道 -> 解码 流程
pub fn run(config: &DriverConfig) -> Result<DriverStats> {
    let start = Instant::now();
    let mode = config.mode;
    let block_len = mode.block_len();
    info!(
        "iLBC {} 模式, 每帧 {} 个采样 / {} 字节",
        mode,
        block_len,
        mode.bytes()
    );

    let input = File::open(&config.input)
        .with_context(|| format!("打开输入文件失败: {}", config.input.display()))?;
    let pcm = read_pcm(BufReader::new(input), block_len)?;
    if pcm.is_empty() {
        bail!("输入不足一帧 ({} 个采样)", block_len);
    }

    let frames = encode_all(mode, &pcm)?;
    let encoded_bytes: usize = frames.iter().map(Vec::len).sum();
    let mut encoded_writer = BufWriter::new(
        File::create(&config.encoded)
            .with_context(|| format!("创建码流文件失败: {}", config.encoded.display()))?,
    );
    for frame in &frames {
        encoded_writer.write_all(frame)?;
    }
    encoded_writer.flush()?;
    debug!("编码完成: {} 帧, {} 字节", frames.len(), encoded_bytes);

    let loss = match &config.loss_file {
        Some(path) => LossPattern::open(path)?,
        None => LossPattern::none(),
    };

    let mut decoder = IlbcDecoder::new(Some(mode), config.use_enhancer);
    let mut neteq = match config.plc {
        PlcBackend::Neteq => Some(NetEqConcealer::new()?),
        PlcBackend::Ilbc => None,
    };
    let mut decoded = Vec::with_capacity(pcm.len());
    let mut lost_frames = 0;
    for (index, frame) in frames.iter().enumerate() {
        let received = loss.is_received(index);
        if !received {
            lost_frames += 1;
            debug!("第 {} 帧丢失", index);
        }
        match neteq.as_mut() {
            Some(neteq) if received => {
                let pcm = decoder.decode(frame).context("iLBC 解码失败")?;
                neteq.received(&pcm, &mut decoded)?;
            }
            Some(neteq) => neteq.lost(block_len, &mut decoded)?,
            None if received => {
                decoded.extend(decoder.decode(frame).context("iLBC 解码失败")?);
            }
            None => decoded.extend(decoder.decode_plc(1)),
        }
    }

    let decoded_writer = BufWriter::new(
        File::create(&config.decoded)
            .with_context(|| format!("创建解码文件失败: {}", config.decoded.display()))?,
    );
    write_pcm(decoded_writer, &decoded)?;

    Ok(DriverStats {
        frames: frames.len(),
        lost_frames,
        encoded_bytes,
        decoded_samples: decoded.len(),
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                let s = (2.0 * std::f64::consts::PI * 200.0 * t).sin() * 6000.0
                    + (2.0 * std::f64::consts::PI * 600.0 * t).sin() * 2000.0;
                s as i16
            })
            .collect()
    }

    fn write_input(dir: &Path, samples: &[i16]) -> PathBuf {
        let path = dir.join("in.pcm");
        let file = File::create(&path).unwrap();
        write_pcm(BufWriter::new(file), samples).unwrap();
        path
    }

    fn config(dir: &Path, mode: IlbcMode, plc: PlcBackend) -> DriverConfig {
        DriverConfig {
            mode,
            input: dir.join("in.pcm"),
            encoded: dir.join("out.bit"),
            decoded: dir.join("out.pcm"),
            loss_file: None,
            use_enhancer: true,
            plc,
        }
    }

    #[test]
    fn test_read_pcm_drops_partial_frame() {
        let bytes: Vec<u8> = (0..170i16).flat_map(|s| s.to_le_bytes()).collect();
        let pcm = read_pcm(&bytes[..], 160).unwrap();
        assert_eq!(pcm.len(), 160);
        assert_eq!(pcm[5], 5);
    }

    #[test]
    fn test_loss_pattern_wraps_around() {
        let bytes: Vec<u8> = [1u16, 0, 1].iter().flat_map(|w| w.to_le_bytes()).collect();
        let loss = LossPattern::from_reader(&bytes[..]).unwrap();
        let seq: Vec<bool> = (0..6).map(|i| loss.is_received(i)).collect();
        assert_eq!(seq, vec![true, false, true, true, false, true]);
        assert!(LossPattern::none().is_received(42));
    }

    #[test]
    fn test_run_without_loss_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path(), &voiced(240 * 10 + 17));
        let cfg = config(dir.path(), IlbcMode::Ms30, PlcBackend::Ilbc);
        let stats = run(&cfg).unwrap();
        assert_eq!(stats.frames, 10);
        assert_eq!(stats.lost_frames, 0);
        assert_eq!(stats.encoded_bytes, 10 * 50);
        assert_eq!(std::fs::metadata(&cfg.encoded).unwrap().len(), 500);
        assert_eq!(std::fs::metadata(&cfg.decoded).unwrap().len(), 2400 * 2);
    }

    #[test]
    fn test_run_with_loss_file_counts_lost_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path(), &voiced(160 * 12));
        let loss_path = dir.path().join("loss.bin");
        let words: Vec<u8> = [1u16, 1, 0].iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&loss_path, words).unwrap();
        let mut cfg = config(dir.path(), IlbcMode::Ms20, PlcBackend::Ilbc);
        cfg.loss_file = Some(loss_path);
        let stats = run(&cfg).unwrap();
        assert_eq!(stats.frames, 12);
        assert_eq!(stats.lost_frames, 4);
        assert_eq!(stats.decoded_samples, 160 * 12);
    }

    #[test]
    fn test_neteq_backend_keeps_output_length() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path(), &voiced(240 * 8));
        let loss_path = dir.path().join("loss.bin");
        let words: Vec<u8> = [1u16, 1, 1, 0, 0, 1].iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&loss_path, words).unwrap();
        let mut cfg = config(dir.path(), IlbcMode::Ms30, PlcBackend::Neteq);
        cfg.loss_file = Some(loss_path);
        let stats = run(&cfg).unwrap();
        assert_eq!(stats.lost_frames, 2);
        assert_eq!(stats.decoded_samples, 240 * 8);
    }

    #[test]
    fn test_run_rejects_input_shorter_than_a_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path(), &voiced(100));
        let cfg = config(dir.path(), IlbcMode::Ms20, PlcBackend::Ilbc);
        assert!(run(&cfg).is_err());
    }
}
