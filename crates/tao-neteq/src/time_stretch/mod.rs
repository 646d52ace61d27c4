//! 按基音周期变速.
//!
//! [`TimeStretch`] 对一段约 30 ms 的解码数据做共同的分析: 在 4 kHz 域求自相关找出
//! 基音周期, 计算相邻两个周期的归一化相关, 并用简单的能量 VAD 判断是否为语音.
//! [`Accelerate`] 据此删除一个周期, [`PreemptiveExpand`] 据此插入一个周期.

mod accelerate;
mod preemptive_expand;

pub use accelerate::{Accelerate, AccelerateFactory, Accelerator, DefaultAccelerateFactory};
pub use preemptive_expand::{
    DefaultPreemptiveExpandFactory, PreemptiveExpand, PreemptiveExpandFactory, PreemptiveExpander,
};

use tao_core::spl::{
    cross_correlation, div_w32_w16, dot_product_with_scale, max_abs_w16, max_abs_w32, norm_w32,
    shift_w32, sqrt_floor, vector_bit_shift_w32_to_w16,
};
use tao_core::TaoResult;

use crate::background_noise::BackgroundNoise;
use crate::dsp_helper::{downsample_to_4khz, peak_detection};
use crate::fs_mult_for;

/// 4 kHz 域的相关长度
const CORRELATION_LEN: usize = 50;
const LOG_CORRELATION_LEN: i32 = 6;
/// 4 kHz 域的最小/最大延迟
const MIN_LAG: usize = 10;
const MAX_LAG: usize = 60;
const DOWNSAMPLED_LEN: usize = CORRELATION_LEN + MAX_LAG;
/// 0.9 (Q14)
const CORRELATION_THRESHOLD: i16 = 14746;
/// 背景噪声尚未估计时的固定能量门限
const FIXED_NOISE_ENERGY: i32 = 75000;

/// 变速操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// 语音段上完成变速
    Success,
    /// 低能量段上完成变速
    SuccessLowEnergy,
    /// 相关不足, 数据原样输出
    NoStretch,
    /// 输入过短, 数据原样输出
    Error,
}

/// 一次分析的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StretchAnalysis {
    /// 基音周期 (原采样率下的采样数)
    pub peak_index: usize,
    /// 相邻两个周期的归一化相关 (Q14, 不超过 1.0)
    pub best_correlation: i16,
    /// 简单 VAD 判断为语音
    pub active_speech: bool,
}

/// 变速的公共分析器
#[derive(Debug, Clone)]
pub struct TimeStretch {
    fs_hz: u32,
    fs_mult: usize,
    num_channels: usize,
    master_channel: usize,
    max_input_value: i16,
    downsampled_input: [i16; DOWNSAMPLED_LEN],
    auto_correlation: [i16; CORRELATION_LEN],
}

impl TimeStretch {
    pub fn new(fs_hz: u32, num_channels: usize) -> TaoResult<Self> {
        let fs_mult = fs_mult_for(fs_hz)?;
        Ok(Self {
            fs_hz,
            fs_mult,
            num_channels: num_channels.max(1),
            master_channel: 0,
            max_input_value: 0,
            downsampled_input: [0; DOWNSAMPLED_LEN],
            auto_correlation: [0; CORRELATION_LEN],
        })
    }

    pub fn fs_mult(&self) -> usize {
        self.fs_mult
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// 分析交错输入 `input` 的主声道
    ///
    /// 调用方保证每声道至少 239 个 8 kHz 采样 (按 `fs_mult` 缩放).
    pub fn analyze(
        &mut self,
        input: &[i16],
        background_noise: &BackgroundNoise,
    ) -> TaoResult<StretchAnalysis> {
        let signal: Vec<i16> = input
            .iter()
            .skip(self.master_channel)
            .step_by(self.num_channels)
            .copied()
            .collect();

        self.max_input_value = max_abs_w16(&signal);
        downsample_to_4khz(&signal, self.fs_hz, true, &mut self.downsampled_input)?;
        self.auto_correlation();

        let peaks = peak_detection(&mut self.auto_correlation, CORRELATION_LEN, 1, self.fs_mult);
        // 自相关从 MIN_LAG 开始, 换算到原采样率
        let peak_index = peaks[0].0 + MIN_LAG * self.fs_mult * 2;

        let max_sq = self.max_input_value as i32 * self.max_input_value as i32;
        let scaling =
            (31 - norm_w32(max_sq) as i32 - norm_w32(peak_index as i32) as i32).max(0) as u32;

        // vec1 从 15 ms 前一个周期处开始, vec2 从 15 ms 处开始
        let fs_mult_120 = self.fs_mult * 120;
        let vec1 = &signal[fs_mult_120 - peak_index..fs_mult_120];
        let vec2 = &signal[fs_mult_120..fs_mult_120 + peak_index];
        let vec1_energy = dot_product_with_scale(vec1, vec1, scaling);
        let vec2_energy = dot_product_with_scale(vec2, vec2, scaling);
        let cross_corr = dot_product_with_scale(vec1, vec2, scaling);

        let active_speech = self.speech_detection(
            vec1_energy,
            vec2_energy,
            peak_index,
            scaling as i32,
            background_noise,
        );
        let best_correlation = if active_speech {
            normalized_correlation(cross_corr, vec1_energy, vec2_energy)
        } else {
            0
        };

        Ok(StretchAnalysis {
            peak_index,
            best_correlation,
            active_speech,
        })
    }

    /// 4 kHz 域延迟 MIN_LAG..MAX_LAG 的自相关, 归一化到 14 位
    fn auto_correlation(&mut self) {
        let max_sq = self.max_input_value as i32 * self.max_input_value as i32;
        let scaling = (LOG_CORRELATION_LEN - norm_w32(max_sq) as i32).max(0) as u32;
        let mut auto_corr = [0i32; CORRELATION_LEN];
        cross_correlation(
            &mut auto_corr,
            &self.downsampled_input[MAX_LAG..],
            &self.downsampled_input,
            MAX_LAG - MIN_LAG,
            CORRELATION_LEN,
            scaling,
            -1,
        );
        let max_corr = max_abs_w32(&auto_corr);
        let scaling = (17 - norm_w32(max_corr) as i32).max(0);
        vector_bit_shift_w32_to_w16(&mut self.auto_correlation, &auto_corr, scaling);
    }

    /// 简单 VAD: 两段平均能量高于 8 倍背景噪声能量即为语音
    ///
    /// 即比较 `(e1 + e2) / 16` 与 `peak_index * 噪声能量`, `scaling` 是能量计算前
    /// 的右移位数.
    fn speech_detection(
        &self,
        vec1_energy: i32,
        vec2_energy: i32,
        peak_index: usize,
        scaling: i32,
        background_noise: &BackgroundNoise,
    ) -> bool {
        let mut left_side = ((vec1_energy as i64 + vec2_energy as i64) / 16) as i32;
        let noise_energy = if background_noise.initialized() {
            background_noise.energy(self.master_channel)
        } else {
            FIXED_NOISE_ENERGY
        };
        let right_scale = (16 - norm_w32(noise_energy) as i32).max(0);
        left_side >>= right_scale;
        let mut right_side = peak_index as i32 * (noise_energy >> right_scale);

        let left_norm = norm_w32(left_side) as i32;
        if left_norm < 2 * scaling {
            left_side <<= left_norm;
            right_side >>= (2 * scaling - left_norm).min(31);
        } else {
            left_side <<= 2 * scaling;
        }
        left_side > right_side
    }
}

/// `cross_corr / sqrt(e1 * e2)`, Q14, 负相关按 0 处理
fn normalized_correlation(cross_corr: i32, vec1_energy: i32, vec2_energy: i32) -> i16 {
    let mut energy1_scale = (16 - norm_w32(vec1_energy) as i32).max(0);
    let energy2_scale = (16 - norm_w32(vec2_energy) as i32).max(0);
    // 总移位取偶数, 开方后才能整除
    if (energy1_scale + energy2_scale) & 1 == 1 {
        energy1_scale += 1;
    }
    let e1 = (vec1_energy >> energy1_scale) as i16 as i32;
    let e2 = (vec2_energy >> energy2_scale) as i16 as i32;
    let sqrt_energy_prod = sqrt_floor(e1 * e2) as i16;

    let temp_scale = 14 - (energy1_scale + energy2_scale) / 2;
    let cross_corr = shift_w32(cross_corr, temp_scale).max(0);
    if sqrt_energy_prod <= 0 {
        return 0;
    }
    div_w32_w16(cross_corr, sqrt_energy_prod).min(16384) as i16
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
    fn test_periodic_signal_is_detected_as_speech() {
        let mut ts = TimeStretch::new(8000, 1).unwrap();
        let bgn = BackgroundNoise::new(8000, 1);
        let input = sine(240, 50.0, 10000.0);
        let analysis = ts.analyze(&input, &bgn).unwrap();
        assert!(analysis.active_speech);
        // 周期 50 的整数倍, 在延迟范围 20..120 内
        assert!(
            (45..=55).contains(&analysis.peak_index) || (95..=105).contains(&analysis.peak_index),
            "peak = {}",
            analysis.peak_index
        );
        assert!(analysis.best_correlation > CORRELATION_THRESHOLD);
    }

    #[test]
    fn test_quiet_signal_is_passive() {
        let mut ts = TimeStretch::new(16000, 1).unwrap();
        let bgn = BackgroundNoise::new(16000, 1);
        let input = sine(480, 100.0, 20.0);
        let analysis = ts.analyze(&input, &bgn).unwrap();
        assert!(!analysis.active_speech);
        assert_eq!(analysis.best_correlation, 0);
    }

    #[test]
    fn test_master_channel_is_analyzed() {
        let mut ts = TimeStretch::new(8000, 2).unwrap();
        let bgn = BackgroundNoise::new(8000, 2);
        let left = sine(240, 40.0, 12000.0);
        let interleaved: Vec<i16> = left.iter().flat_map(|&s| [s, 0]).collect();
        let analysis = ts.analyze(&interleaved, &bgn).unwrap();
        assert!(analysis.active_speech);
        let phase = analysis.peak_index % 40;
        assert!(phase <= 2 || phase >= 38, "peak = {}", analysis.peak_index);
    }

    #[test]
    fn test_normalized_correlation_of_identical_vectors() {
        let e = 1_000_000;
        assert!(normalized_correlation(e, e, e) >= 16300);
        assert_eq!(normalized_correlation(-e, e, e), 0);
    }
}
