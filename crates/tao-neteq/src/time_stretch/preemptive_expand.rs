//! 预扩展: 插入一个基音周期.

use log::{trace, warn};
use tao_core::TaoResult;

use super::{CORRELATION_THRESHOLD, ReturnCode, TimeStretch};
use crate::audio_multi_vector::AudioMultiVector;
use crate::background_noise::BackgroundNoise;

/// 预扩展器接口
pub trait PreemptiveExpander: Send {
    /// 对约 30 ms 的交错数据 `input` 做预扩展, 结果追加到 `output`
    ///
    /// `input` 的前 `old_data_length` 个 (每声道) 采样是已在同步缓冲中的旧数据,
    /// 插入点不早于它们的末尾. 返回结果码与每声道增加的采样数.
    fn process(
        &mut self,
        input: &[i16],
        old_data_length: usize,
        background_noise: &BackgroundNoise,
        output: &mut AudioMultiVector,
    ) -> (ReturnCode, usize);
}

/// 预扩展器工厂
pub trait PreemptiveExpandFactory: Send {
    /// `overlap_samples` 为隐藏器的重叠长度, 新数据至少要比它长
    fn create(
        &self,
        fs_hz: u32,
        num_channels: usize,
        overlap_samples: usize,
    ) -> TaoResult<Box<dyn PreemptiveExpander>>;
}

/// 创建 [`PreemptiveExpand`] 的默认工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPreemptiveExpandFactory;

impl PreemptiveExpandFactory for DefaultPreemptiveExpandFactory {
    fn create(
        &self,
        fs_hz: u32,
        num_channels: usize,
        overlap_samples: usize,
    ) -> TaoResult<Box<dyn PreemptiveExpander>> {
        Ok(Box::new(PreemptiveExpand::new(
            fs_hz,
            num_channels,
            overlap_samples,
        )?))
    }
}

/// 基于 [`TimeStretch`] 分析的预扩展器
#[derive(Debug, Clone)]
pub struct PreemptiveExpand {
    stretch: TimeStretch,
    overlap_samples: usize,
}

impl PreemptiveExpand {
    pub fn new(fs_hz: u32, num_channels: usize, overlap_samples: usize) -> TaoResult<Self> {
        Ok(Self {
            stretch: TimeStretch::new(fs_hz, num_channels)?,
            overlap_samples,
        })
    }

    /// 在不早于 15 ms (且不早于旧数据末尾) 处重复 `peak_index` 个采样
    fn stretch(
        &self,
        input: &[i16],
        old_data_length: usize,
        peak_index: usize,
        output: &mut AudioMultiVector,
    ) -> usize {
        let num_channels = self.stretch.num_channels();
        let signal_len = input.len() / num_channels;
        let unmodified_length = old_data_length.max(self.stretch.fs_mult() * 120);
        let peak_index = peak_index
            .min(unmodified_length)
            .min(signal_len - unmodified_length);

        // 前段连同交叉淡化区一起复制
        output.push_back_interleaved(&input[..(unmodified_length + peak_index) * num_channels]);
        let mut period = AudioMultiVector::new(num_channels);
        period.push_back_interleaved(
            &input[(unmodified_length - peak_index) * num_channels..unmodified_length * num_channels],
        );
        output.cross_fade(&period, peak_index);
        output.push_back_interleaved(&input[unmodified_length * num_channels..]);
        peak_index
    }
}

impl PreemptiveExpander for PreemptiveExpand {
    fn process(
        &mut self,
        input: &[i16],
        old_data_length: usize,
        background_noise: &BackgroundNoise,
        output: &mut AudioMultiVector,
    ) -> (ReturnCode, usize) {
        let num_channels = self.stretch.num_channels();
        let fs_mult = self.stretch.fs_mult();
        let signal_len = input.len() / num_channels;
        // 需要将近 30 ms 的数据, 且新数据长于重叠区
        if signal_len < (2 * 120 - 1) * fs_mult
            || old_data_length + self.overlap_samples >= signal_len
        {
            output.push_back_interleaved(input);
            return (ReturnCode::Error, 0);
        }

        let mut analysis = match self.stretch.analyze(input, background_noise) {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!("预扩展分析失败: {}", err);
                output.push_back_interleaved(input);
                return (ReturnCode::Error, 0);
            }
        };
        if !analysis.active_speech {
            // 低能量时新数据可以不足 15 ms, 插入长度不超过新数据
            analysis.peak_index = analysis.peak_index.min(signal_len - old_data_length);
        }

        let fs_mult_120 = fs_mult * 120;
        let strong = analysis.best_correlation > CORRELATION_THRESHOLD
            && old_data_length <= fs_mult_120;
        if strong || !analysis.active_speech {
            let added = self.stretch(input, old_data_length, analysis.peak_index, output);
            trace!(
                "预扩展: 插入 {} 个采样, 相关 {}, 语音 {}",
                added, analysis.best_correlation, analysis.active_speech
            );
            let code = if analysis.active_speech {
                ReturnCode::Success
            } else {
                ReturnCode::SuccessLowEnergy
            };
            (code, added)
        } else {
            output.push_back_interleaved(input);
            (ReturnCode::NoStretch, 0)
        }
    }
}
