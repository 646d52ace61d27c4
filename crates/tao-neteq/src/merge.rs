//! 隐藏结束后的衔接 (Merge).
//!
//! 新解码的数据到达时, 同步缓冲里还剩一段隐藏信号没有播放. Merge 再让隐藏器
//! 多生成一个周期, 在 4 kHz 域找出新数据与隐藏信号最相似的位置, 从该位置起做
//! 线性交叉淡化. 若新数据能量明显高于隐藏信号 (隐藏已静音到背景噪声),
//! 新数据先按能量比压低再逐渐恢复.

use log::trace;
use tao_core::spl::{
    cross_correlation, dot_product_with_scale, downsample_fast, max_abs_w16, max_abs_w32,
    norm_w32, shift_w32, sqrt_floor, vector_bit_shift_w32_to_w16,
};
use tao_core::{TaoError, TaoResult};

use crate::audio_multi_vector::AudioMultiVector;
use crate::dsp_helper::{self, cross_fade, peak_detection, ramp_signal_in_place, unmute_signal};
use crate::expand::{ExpandContext, Expander};
use crate::{MAX_SAMPLE_RATE, fs_mult_for};

const EXPAND_DOWNSAMPLED_LENGTH: usize = 100;
const INPUT_DOWNSAMPLED_LENGTH: usize = 40;
const MAX_CORRELATION_LENGTH: usize = 60;
/// 同步缓冲中保留的隐藏信号上限 (按最高采样率计的 210 个 8 kHz 采样)
const MAX_OLD_LENGTH: usize = 210 * (MAX_SAMPLE_RATE as usize / 8000);

/// 隐藏信号与新解码数据的衔接器
#[derive(Debug, Clone)]
pub struct Merge {
    fs_hz: u32,
    fs_mult: usize,
    num_channels: usize,
    timestamps_per_call: usize,
    expanded: AudioMultiVector,
}

/// 隐藏信号准备结果
struct ExpandedSignal {
    /// 参与相关的长度 (202 个 8 kHz 采样)
    length: usize,
    /// 同步缓冲中尚未播放的采样数
    old_length: usize,
    /// 隐藏器一个周期的长度
    expand_period: usize,
}

impl Merge {
    pub fn new(fs_hz: u32, num_channels: usize) -> TaoResult<Self> {
        let fs_mult = fs_mult_for(fs_hz)?;
        Ok(Self {
            fs_hz,
            fs_mult,
            num_channels: num_channels.max(1),
            timestamps_per_call: fs_hz as usize / 100,
            expanded: AudioMultiVector::new(num_channels),
        })
    }

    /// 把交错的新解码数据 `input` 衔接到隐藏信号之后
    ///
    /// 同步缓冲中剩余的隐藏采样被替换为衔接结果的开头, `output` 得到其余部分.
    /// `external_mute_factors` (每声道 Q14) 被更新. 返回相对于同步缓冲原有内容
    /// 新增的每声道采样数.
    pub fn process(
        &mut self,
        input: &[i16],
        external_mute_factors: &mut [i16],
        expand: &mut dyn Expander,
        ctx: &mut ExpandContext<'_>,
        output: &mut AudioMultiVector,
    ) -> TaoResult<usize> {
        if external_mute_factors.len() < self.num_channels {
            return Err(TaoError::InvalidArgument(format!(
                "静音系数个数 {} 少于声道数 {}",
                external_mute_factors.len(),
                self.num_channels
            )));
        }
        let mut input_vector = AudioMultiVector::new(self.num_channels);
        input_vector.push_back_interleaved(input);
        let input_length = input_vector.size();
        if input_length < self.fs_mult * 8 {
            return Err(TaoError::InvalidArgument(format!(
                "衔接输入过短: 每声道 {} 个采样",
                input_length
            )));
        }

        let expanded_signal = self.get_expanded_signal(expand, ctx)?;
        let expanded_length = expanded_signal.length;
        let old_length = expanded_signal.old_length;

        let mut best_correlation_index = 0;
        let mut output_length = 0;
        output.clear();
        for ch in 0..self.num_channels {
            let input_channel = input_vector[ch].as_mut_slice();
            let expanded_channel = self.expanded[ch].as_slice();

            let (new_mute_factor, expanded_max, input_max) =
                self.signal_scaling(input_channel, expanded_channel);

            // 外部静音系数乘以隐藏器的静音系数, 再不低于按能量比算出的系数
            let external = &mut external_mute_factors[ch];
            *external = ((*external as i32 * expand.mute_factor(ch) as i32) >> 14) as i16;
            if new_mute_factor > *external {
                *external = new_mute_factor.min(16384);
            }

            if ch == 0 {
                // 只在第一个声道上搜索衔接位置
                let (expanded_ds, input_ds) =
                    self.downsample(input_channel, &expanded_channel[..expanded_length])?;
                best_correlation_index = self.correlate_and_peak_search(
                    &expanded_ds,
                    &input_ds,
                    expanded_max,
                    input_max,
                    old_length,
                    input_length,
                    expanded_signal.expand_period,
                    expand,
                );
            }

            let interpolation_length = (MAX_CORRELATION_LENGTH * self.fs_mult)
                .min(expanded_length.saturating_sub(best_correlation_index))
                .min(input_length);

            output_length = best_correlation_index + input_length;
            let mut merged = vec![0i16; output_length];
            let decoded_output = &mut merged[best_correlation_index..];
            if *external < 16384 {
                // 约每采样 0.004 / fs_mult 的速度恢复
                let increment = 4194 / self.fs_mult as i32;
                *external = ramp_signal_in_place(
                    &mut input_channel[..interpolation_length],
                    *external,
                    increment,
                );
                unmute_signal(
                    &input_channel[interpolation_length..],
                    external,
                    increment,
                    &mut decoded_output[interpolation_length..],
                );
            } else {
                decoded_output[interpolation_length..]
                    .copy_from_slice(&input_channel[interpolation_length..]);
            }

            // 重叠区线性交叉淡化
            let increment = (16384 / (interpolation_length + 1)) as i16;
            let mut mix_factor = 16384 - increment;
            let prefix = best_correlation_index.min(expanded_channel.len());
            merged[..prefix].copy_from_slice(&expanded_channel[..prefix]);
            let overlap_end = (best_correlation_index + interpolation_length).min(expanded_channel.len());
            let expanded_overlap = &expanded_channel[prefix..overlap_end];
            cross_fade(
                expanded_overlap,
                &input_channel[..interpolation_length],
                &mut mix_factor,
                increment,
                &mut merged[best_correlation_index..best_correlation_index + expanded_overlap.len()],
            );

            if ch == 0 {
                output.ensure_size(output_length);
            }
            output[ch].overwrite_at(&merged, 0);
        }

        // 前 old_length 个采样写回同步缓冲中原隐藏信号的位置
        let next_index = ctx.sync_buffer.next_index();
        ctx.sync_buffer.replace_at_index(output, old_length, next_index);
        output.pop_front(old_length);

        trace!(
            "衔接: 位置 {}, 剩余隐藏 {}, 输出 {}",
            best_correlation_index, old_length, output_length
        );
        Ok(output_length.saturating_sub(old_length))
    }

    /// 衔接至少需要的未来采样数 (交错计)
    pub fn required_future_samples(&self) -> usize {
        self.fs_hz as usize / 100 * self.num_channels
    }

    /// 取出同步缓冲中的剩余隐藏信号, 并用隐藏器补足到 202 个 8 kHz 采样
    fn get_expanded_signal(
        &mut self,
        expand: &mut dyn Expander,
        ctx: &mut ExpandContext<'_>,
    ) -> TaoResult<ExpandedSignal> {
        let mut old_length = ctx.sync_buffer.future_length();
        expand.set_parameters_for_merge_after_expand();

        if old_length >= MAX_OLD_LENGTH {
            // 只保留开头部分, 其余都是隐藏数据, 向后平移不影响结果
            let length_diff = old_length - MAX_OLD_LENGTH;
            let next_index = ctx.sync_buffer.next_index();
            ctx.sync_buffer.insert_zeros_at_index(length_diff, next_index);
            old_length = MAX_OLD_LENGTH;
        }

        let mut expanded_temp = AudioMultiVector::new(self.num_channels);
        expand.process(ctx, &mut expanded_temp)?;
        let expand_period = expanded_temp.size();
        if expand_period == 0 {
            return Err(TaoError::Codec("隐藏器没有输出".into()));
        }

        self.expanded = AudioMultiVector::new(self.num_channels);
        let next_index = ctx.sync_buffer.next_index();
        self.expanded
            .push_back_from_index(&ctx.sync_buffer, next_index);
        let required_length = (120 + 80 + 2) * self.fs_mult;
        if self.expanded.size() < required_length {
            while self.expanded.size() < required_length {
                self.expanded.push_back(&expanded_temp);
            }
            let extra = self.expanded.size() - required_length;
            self.expanded.pop_back(extra);
        }
        Ok(ExpandedSignal {
            length: required_length,
            old_length,
            expand_period,
        })
    }

    /// 比较新数据与隐藏信号前 64 个 8 kHz 采样的能量
    ///
    /// 返回 `(静音系数 Q14, 隐藏信号峰值, 新数据峰值)`. 新数据更响时系数为
    /// sqrt(E_expand / E_input), 否则为 1.0.
    fn signal_scaling(&self, input: &[i16], expanded: &[i16]) -> (i16, i16, i16) {
        let length = (64 * self.fs_mult).min(input.len()).min(expanded.len());
        let expanded_max = max_abs_w16(&expanded[..length]);
        let input_max = max_abs_w16(&input[..length]);

        // fs_mult 的以 2 为底对数 (48 kHz 时不精确)
        let log_fs_mult = 30 - norm_w32(self.fs_mult as i32) as i32;
        let expanded_shift = (6 + log_fs_mult
            - norm_w32(expanded_max as i32 * expanded_max as i32) as i32)
            .max(0);
        let mut energy_expanded = dot_product_with_scale(
            &expanded[..length],
            &expanded[..length],
            expanded_shift as u32,
        );
        let input_shift =
            (6 + log_fs_mult - norm_w32(input_max as i32 * input_max as i32) as i32).max(0);
        let mut energy_input =
            dot_product_with_scale(&input[..length], &input[..length], input_shift as u32);

        if input_shift > expanded_shift {
            energy_expanded >>= input_shift - expanded_shift;
        } else {
            energy_input >>= expanded_shift - input_shift;
        }

        let mute_factor = if energy_input > energy_expanded {
            // 新数据能量归一化到 14 位, 比值为 Q14
            let temp_shift = norm_w32(energy_input) as i32 - 17;
            let energy_input = shift_w32(energy_input, temp_shift);
            let energy_expanded = shift_w32(energy_expanded, temp_shift + 14);
            if energy_input > 0 {
                sqrt_floor(shift_w32(energy_expanded / energy_input, 14)) as i16
            } else {
                16384
            }
        } else {
            16384
        };
        (mute_factor, expanded_max, input_max)
    }

    /// 把隐藏信号与新数据降采样到 4 kHz (不补偿群延迟)
    fn downsample(
        &self,
        input: &[i16],
        expanded: &[i16],
    ) -> TaoResult<([i16; EXPAND_DOWNSAMPLED_LENGTH], [i16; INPUT_DOWNSAMPLED_LENGTH])> {
        let (coef, factor, _) = dsp_helper::downsample_filter(self.fs_hz)
            .ok_or_else(|| TaoError::InvalidArgument(format!("不支持的采样率 {}", self.fs_hz)))?;
        let signal_offset = coef.len() - 1;
        let length_limit = self.fs_hz as usize / 100;

        let mut expanded_ds = [0i16; EXPAND_DOWNSAMPLED_LENGTH];
        downsample_fast(expanded, signal_offset, &mut expanded_ds, coef, factor, 0)?;

        let mut input_ds = [0i16; INPUT_DOWNSAMPLED_LENGTH];
        if input.len() <= length_limit {
            // 不足 10 ms 时只降采样已有部分, 其余补零
            let temp_len = input.len().saturating_sub(signal_offset);
            let ds_len = (temp_len / factor).min(INPUT_DOWNSAMPLED_LENGTH);
            downsample_fast(input, signal_offset, &mut input_ds[..ds_len], coef, factor, 0)?;
        } else {
            downsample_fast(input, signal_offset, &mut input_ds, coef, factor, 0)?;
        }
        Ok((expanded_ds, input_ds))
    }

    /// 在 4 kHz 域做互相关, 返回原采样率下的衔接位置
    ///
    /// 位置保证新数据放在其后至少能凑够 10 ms 加重叠长度, 并覆盖所有剩余隐藏采样.
    #[allow(clippy::too_many_arguments)]
    fn correlate_and_peak_search(
        &self,
        expanded_ds: &[i16; EXPAND_DOWNSAMPLED_LENGTH],
        input_ds: &[i16; INPUT_DOWNSAMPLED_LENGTH],
        expanded_max: i16,
        input_max: i16,
        start_position: usize,
        input_length: usize,
        expand_period: usize,
        expand: &dyn Expander,
    ) -> usize {
        let stop_position_ds =
            MAX_CORRELATION_LENGTH.min(expand.max_lag() / (self.fs_mult * 2) + 1);
        let correlation_shift = if expanded_max as i32 * input_max as i32 > 26_843_546 {
            3
        } else {
            0
        };

        let mut correlation = [0i32; MAX_CORRELATION_LENGTH];
        cross_correlation(
            &mut correlation[..stop_position_ds],
            input_ds,
            expanded_ds,
            0,
            INPUT_DOWNSAMPLED_LENGTH,
            correlation_shift,
            1,
        );

        // 归一化到 14 位, 两侧各留 overlap - 1 个零
        let overlap = expand.overlap_length();
        let pad_length = overlap.saturating_sub(1);
        let mut correlation16 = vec![0i16; 2 * pad_length + MAX_CORRELATION_LENGTH];
        let max_correlation = max_abs_w32(&correlation[..stop_position_ds]);
        let norm_shift = (17 - norm_w32(max_correlation) as i32).max(0);
        vector_bit_shift_w32_to_w16(
            &mut correlation16[pad_length..pad_length + stop_position_ds],
            &correlation[..stop_position_ds],
            norm_shift,
        );

        // 起点要求: best + input_length >= 10 ms + overlap 且 >= start_position
        let start_index = (self.timestamps_per_call + overlap).max(start_position);
        let start_index = start_index.saturating_sub(input_length);
        let start_index_ds = start_index / (self.fs_mult * 2);

        let modified_stop = stop_position_ds
            .min((MAX_CORRELATION_LENGTH + pad_length).saturating_sub(start_index_ds));
        let search_start = (pad_length + start_index_ds).min(correlation16.len());
        let peaks = peak_detection(
            &mut correlation16[search_start..],
            modified_stop,
            1,
            self.fs_mult,
        );
        let mut best_correlation_index = peaks.first().map_or(0, |&(index, _)| index) + start_index;

        while expand_period > 0
            && (best_correlation_index + input_length < self.timestamps_per_call + overlap
                || best_correlation_index + input_length < start_position)
        {
            best_correlation_index += expand_period;
        }
        best_correlation_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_noise::BackgroundNoise;
    use crate::expand::Expand;
    use crate::random_vector::RandomVector;
    use crate::sync_buffer::SyncBuffer;

    fn sine(len: usize, period: f64, amplitude: f64) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * i as f64 / period).sin()) as i16)
            .collect()
    }

    struct Fixture {
        sync_buffer: SyncBuffer,
        background_noise: BackgroundNoise,
        random_vector: RandomVector,
        expand: Expand,
    }

    impl Fixture {
        /// 同步缓冲装满正弦历史, 然后做几次隐藏, 模拟丢包后的状态
        fn after_expand(fs_hz: u32, expands: usize) -> Self {
            let fs_mult = fs_hz as usize / 8000;
            let len = 1200 * fs_mult;
            let mut sync_buffer = SyncBuffer::new(1, len);
            let mut block = AudioMultiVector::new(1);
            block.push_back_interleaved(&sine(len, 40.0 * fs_mult as f64, 8000.0));
            sync_buffer.push_back(&block);
            sync_buffer.set_next_index(len - 5 * fs_mult);

            let mut fixture = Self {
                sync_buffer,
                background_noise: BackgroundNoise::new(fs_hz, 1),
                random_vector: RandomVector::new(),
                expand: Expand::new(fs_hz, 1).unwrap(),
            };
            for _ in 0..expands {
                let mut out = AudioMultiVector::new(1);
                let mut ctx = ExpandContext {
                    sync_buffer: &mut fixture.sync_buffer,
                    background_noise: &mut fixture.background_noise,
                    random_vector: &mut fixture.random_vector,
                };
                fixture.expand.process(&mut ctx, &mut out).unwrap();
                fixture.sync_buffer.push_back(&out);
            }
            fixture
        }

        fn ctx(&mut self) -> ExpandContext<'_> {
            ExpandContext {
                sync_buffer: &mut self.sync_buffer,
                background_noise: &mut self.background_noise,
                random_vector: &mut self.random_vector,
            }
        }
    }

    #[test]
    fn test_required_future_samples() {
        assert_eq!(Merge::new(8000, 1).unwrap().required_future_samples(), 80);
        assert_eq!(Merge::new(48000, 2).unwrap().required_future_samples(), 960);
        assert!(Merge::new(22050, 1).is_err());
    }

    #[test]
    fn test_merge_keeps_all_new_samples() {
        let mut fixture = Fixture::after_expand(8000, 2);
        let old_length = fixture.sync_buffer.future_length();
        let mut merge = Merge::new(8000, 1).unwrap();
        let input = sine(160, 40.0, 8000.0);
        let mut mute = [16384i16];
        let mut output = AudioMultiVector::new(1);
        let Fixture {
            sync_buffer,
            background_noise,
            random_vector,
            expand,
        } = &mut fixture;
        let mut ctx = ExpandContext {
            sync_buffer,
            background_noise,
            random_vector,
        };
        let added = merge
            .process(&input, &mut mute, expand, &mut ctx, &mut output)
            .unwrap();

        assert_eq!(output.size(), added);
        assert!(added + old_length >= input.len());
        // 剩余隐藏采样被原地替换, 未来长度不变
        assert_eq!(fixture.sync_buffer.future_length(), old_length);
        assert!(mute[0] > 0 && mute[0] <= 16384);
        assert!(max_abs_w16(output[0].as_slice()) > 1000);
    }

    #[test]
    fn test_signal_scaling_follows_energy_ratio() {
        let merge = Merge::new(8000, 1).unwrap();
        let loud = sine(64, 40.0, 16000.0);
        let quiet = sine(64, 40.0, 4000.0);
        let (factor, expanded_max, input_max) = merge.signal_scaling(&loud, &quiet);
        assert!((3500..4700).contains(&factor), "factor = {}", factor);
        assert_eq!(input_max, max_abs_w16(&loud));
        assert_eq!(expanded_max, max_abs_w16(&quiet));

        let (factor, _, _) = merge.signal_scaling(&quiet, &loud);
        assert_eq!(factor, 16384);
    }

    #[test]
    fn test_mismatched_mute_factors_are_rejected() {
        let mut fixture = Fixture::after_expand(8000, 1);
        let mut merge = Merge::new(8000, 2).unwrap();
        let mut output = AudioMultiVector::new(2);
        let Fixture {
            sync_buffer,
            background_noise,
            random_vector,
            expand,
        } = &mut fixture;
        let mut ctx = ExpandContext {
            sync_buffer,
            background_noise,
            random_vector,
        };
        let result = merge.process(&[0; 320], &mut [16384], expand, &mut ctx, &mut output);
        assert!(matches!(result, Err(TaoError::InvalidArgument(_))));
    }
}
