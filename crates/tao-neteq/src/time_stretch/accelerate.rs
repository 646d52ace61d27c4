//! 加速: 删除一个基音周期.

use log::{trace, warn};
use tao_core::TaoResult;

use super::{CORRELATION_THRESHOLD, ReturnCode, TimeStretch};
use crate::audio_multi_vector::AudioMultiVector;
use crate::background_noise::BackgroundNoise;

/// 快速模式下的相关门限 0.5 (Q14)
const FAST_CORRELATION_THRESHOLD: i16 = 8192;

/// 加速器接口
pub trait Accelerator: Send {
    /// 对约 30 ms 的交错数据 `input` 做加速, 结果追加到 `output`
    ///
    /// `fast_accelerate` 为真时降低相关门限, 并删除尽可能多的整周期.
    /// 返回结果码与每声道减少的采样数.
    fn process(
        &mut self,
        input: &[i16],
        fast_accelerate: bool,
        background_noise: &BackgroundNoise,
        output: &mut AudioMultiVector,
    ) -> (ReturnCode, usize);
}

/// 加速器工厂
pub trait AccelerateFactory: Send {
    fn create(&self, fs_hz: u32, num_channels: usize) -> TaoResult<Box<dyn Accelerator>>;
}

/// 创建 [`Accelerate`] 的默认工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAccelerateFactory;

impl AccelerateFactory for DefaultAccelerateFactory {
    fn create(&self, fs_hz: u32, num_channels: usize) -> TaoResult<Box<dyn Accelerator>> {
        Ok(Box::new(Accelerate::new(fs_hz, num_channels)?))
    }
}

/// 基于 [`TimeStretch`] 分析的加速器
#[derive(Debug, Clone)]
pub struct Accelerate {
    stretch: TimeStretch,
}

impl Accelerate {
    pub fn new(fs_hz: u32, num_channels: usize) -> TaoResult<Self> {
        Ok(Self {
            stretch: TimeStretch::new(fs_hz, num_channels)?,
        })
    }

    /// 从 15 ms 处删除 `peak_index` 个采样, 删除处做交叉淡化
    fn stretch(
        &self,
        input: &[i16],
        mut peak_index: usize,
        fast_mode: bool,
        output: &mut AudioMultiVector,
    ) -> usize {
        let num_channels = self.stretch.num_channels();
        let fs_mult_120 = self.stretch.fs_mult() * 120;
        if fast_mode {
            // 15 ms 内容得下的最多整周期
            peak_index = (fs_mult_120 / peak_index) * peak_index;
        }

        output.push_back_interleaved(&input[..fs_mult_120 * num_channels]);
        let mut period = AudioMultiVector::new(num_channels);
        period.push_back_interleaved(
            &input[fs_mult_120 * num_channels..(fs_mult_120 + peak_index) * num_channels],
        );
        output.cross_fade(&period, peak_index);
        output.push_back_interleaved(&input[(fs_mult_120 + peak_index) * num_channels..]);
        peak_index
    }
}

impl Accelerator for Accelerate {
    fn process(
        &mut self,
        input: &[i16],
        fast_accelerate: bool,
        background_noise: &BackgroundNoise,
        output: &mut AudioMultiVector,
    ) -> (ReturnCode, usize) {
        let num_channels = self.stretch.num_channels();
        let fs_mult = self.stretch.fs_mult();
        // 需要将近 30 ms 的数据
        if input.len() / num_channels < (2 * 120 - 1) * fs_mult {
            output.push_back_interleaved(input);
            return (ReturnCode::Error, 0);
        }

        let analysis = match self.stretch.analyze(input, background_noise) {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!("加速分析失败: {}", err);
                output.push_back_interleaved(input);
                return (ReturnCode::Error, 0);
            }
        };

        let threshold = if fast_accelerate {
            FAST_CORRELATION_THRESHOLD
        } else {
            CORRELATION_THRESHOLD
        };
        if analysis.best_correlation > threshold || !analysis.active_speech {
            let removed = self.stretch(input, analysis.peak_index, fast_accelerate, output);
            trace!(
                "加速: 删除 {} 个采样, 相关 {}, 语音 {}",
                removed, analysis.best_correlation, analysis.active_speech
            );
            let code = if analysis.active_speech {
                ReturnCode::Success
            } else {
                ReturnCode::SuccessLowEnergy
            };
            (code, removed)
        } else {
            output.push_back_interleaved(input);
            (ReturnCode::NoStretch, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, period: f64, amplitude: f64) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * i as f64 / period).sin()) as i16)
            .collect()
    }

    #[test]
    fn test_short_input_is_copied() {
        let mut accelerate = Accelerate::new(8000, 1).unwrap();
        let bgn = BackgroundNoise::new(8000, 1);
        let input = sine(200, 40.0, 10000.0);
        let mut output = AudioMultiVector::new(1);
        let (code, change) = accelerate.process(&input, false, &bgn, &mut output);
        assert_eq!(code, ReturnCode::Error);
        assert_eq!(change, 0);
        assert_eq!(output[0].as_slice(), &input[..]);
    }

    #[test]
    fn test_voiced_input_loses_one_period() {
        let mut accelerate = Accelerate::new(8000, 1).unwrap();
        let bgn = BackgroundNoise::new(8000, 1);
        let input = sine(240, 50.0, 10000.0);
        let mut output = AudioMultiVector::new(1);
        let (code, change) = accelerate.process(&input, false, &bgn, &mut output);
        assert_eq!(code, ReturnCode::Success);
        assert!(change > 0);
        assert_eq!(output.size(), input.len() - change);
        // 删除点之前的数据不变
        assert_eq!(&output[0].as_slice()[..120 - change], &input[..120 - change]);
    }

    #[test]
    fn test_silence_is_accelerated_as_low_energy() {
        let mut accelerate = Accelerate::new(16000, 2).unwrap();
        let bgn = BackgroundNoise::new(16000, 2);
        let input = vec![0i16; 480 * 2];
        let mut output = AudioMultiVector::new(2);
        let (code, change) = accelerate.process(&input, false, &bgn, &mut output);
        assert_eq!(code, ReturnCode::SuccessLowEnergy);
        assert_eq!(output.size(), 480 - change);
    }

    #[test]
    fn test_fast_mode_removes_whole_periods() {
        let mut accelerate = Accelerate::new(8000, 1).unwrap();
        let bgn = BackgroundNoise::new(8000, 1);
        let input = sine(240, 25.0, 10000.0);
        let mut output = AudioMultiVector::new(1);
        let (code, change) = accelerate.process(&input, true, &bgn, &mut output);
        assert_eq!(code, ReturnCode::Success);
        assert!(change > 60, "change = {}", change);
        assert!(change <= 120);
        assert_eq!(output.size(), input.len() - change);
    }

    #[test]
    fn test_factory_builds_accelerator() {
        let factory = DefaultAccelerateFactory;
        assert!(factory.create(32000, 1).is_ok());
        assert!(factory.create(11025, 1).is_err());
    }
}
