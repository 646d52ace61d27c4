//! 解码后的帧数据 (Frame).
//!
//! 表示解码后 (或待编码) 的原始 PCM 语音数据.

use tao_core::{ChannelLayout, Rational, SampleFormat};

/// 音频帧
///
/// 交错格式: `data` 中只有一个 Vec, 所有声道交替排列 (小端字节序).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 音频采样数据 (交错格式: 单个 Vec)
    pub data: Vec<Vec<u8>>,
    /// 本帧包含的采样数 (每声道)
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
    /// 帧时长 (以 time_base 为单位)
    pub duration: i64,
}

impl AudioFrame {
    /// 创建空的音频帧
    pub fn new(
        nb_samples: u32,
        sample_rate: u32,
        sample_format: SampleFormat,
        channel_layout: ChannelLayout,
    ) -> Self {
        let plane_count = if sample_format.is_planar() {
            channel_layout.channels as usize
        } else {
            1
        };
        Self {
            data: vec![Vec::new(); plane_count],
            nb_samples,
            sample_rate,
            sample_format,
            channel_layout,
            pts: tao_core::timestamp::NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
            duration: 0,
        }
    }

    /// 由单声道 S16 采样创建音频帧
    pub fn from_mono_s16(samples: &[i16], sample_rate: u32) -> Self {
        let mut frame = Self::new(
            samples.len() as u32,
            sample_rate,
            SampleFormat::S16,
            ChannelLayout::MONO,
        );
        frame.data[0] = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        frame.time_base = Rational::for_sample_rate(sample_rate);
        frame.duration = samples.len() as i64;
        frame
    }

    /// 以 i16 形式读取交错 S16 数据
    pub fn samples_s16(&self) -> Vec<i16> {
        self.data
            .first()
            .map(|plane| {
                plane
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 帧 (编解码器交换的原始数据包装)
#[derive(Debug, Clone)]
pub enum Frame {
    /// 音频帧
    Audio(AudioFrame),
}
