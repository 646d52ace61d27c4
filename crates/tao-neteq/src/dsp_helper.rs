//! NetEq 各组件共用的 DSP 工具: 淡入淡出, 峰值检测, 降采样到 4 kHz.
//!
//! 增益类参数约定:
//! - 静音/混合系数为 Q14 (16384 = 1.0)
//! - 斜率 (每采样的增量) 为 Q20

use tao_core::spl::downsample_fast;
use tao_core::{TaoError, TaoResult};

/// 8 kHz 的静音起始系数 (Q15, 约 0.833)
pub const MUTE_FACTOR_START_8KHZ: i16 = 27307;
/// 8 kHz 的静音递增量
pub const MUTE_FACTOR_INCREMENT_8KHZ: i16 = -5461;
/// 8 kHz 的解除静音起始系数
pub const UNMUTE_FACTOR_START_8KHZ: i16 = 5461;
/// 8 kHz 的解除静音递增量
pub const UNMUTE_FACTOR_INCREMENT_8KHZ: i16 = 5461;
pub const MUTE_FACTOR_START_16KHZ: i16 = 29789;
pub const MUTE_FACTOR_INCREMENT_16KHZ: i16 = -2979;
pub const UNMUTE_FACTOR_START_16KHZ: i16 = 2979;
pub const UNMUTE_FACTOR_INCREMENT_16KHZ: i16 = 2979;
pub const MUTE_FACTOR_START_32KHZ: i16 = 31208;
pub const MUTE_FACTOR_INCREMENT_32KHZ: i16 = -1560;
pub const UNMUTE_FACTOR_START_32KHZ: i16 = 1560;
pub const UNMUTE_FACTOR_INCREMENT_32KHZ: i16 = 1560;
pub const MUTE_FACTOR_START_48KHZ: i16 = 31711;
pub const MUTE_FACTOR_INCREMENT_48KHZ: i16 = -1057;
pub const UNMUTE_FACTOR_START_48KHZ: i16 = 1057;
pub const UNMUTE_FACTOR_INCREMENT_48KHZ: i16 = 1057;

/// 8 kHz 降到 4 kHz 的低通滤波器 (Q12)
pub const DOWNSAMPLE_8KHZ_TBL: [i16; 3] = [1229, 1638, 1229];
/// 16 kHz 降到 4 kHz
pub const DOWNSAMPLE_16KHZ_TBL: [i16; 5] = [614, 819, 1229, 819, 614];
/// 32 kHz 降到 4 kHz
pub const DOWNSAMPLE_32KHZ_TBL: [i16; 7] = [584, 512, 625, 667, 625, 512, 584];
/// 48 kHz 降到 4 kHz
pub const DOWNSAMPLE_48KHZ_TBL: [i16; 7] = [1019, 390, 427, 440, 427, 390, 1019];

/// 抛物线插值系数表, 每行为 `[分数位置阈值, 二次项系数, 一次项系数]`
const PARABOLA_COEFFICIENTS: [[i32; 3]; 17] = [
    [120, 32, 64],
    [140, 44, 75],
    [150, 50, 80],
    [160, 57, 85],
    [180, 72, 96],
    [200, 89, 107],
    [210, 98, 112],
    [220, 108, 117],
    [240, 128, 128],
    [260, 150, 139],
    [270, 162, 144],
    [280, 174, 149],
    [300, 200, 160],
    [320, 228, 171],
    [330, 242, 176],
    [340, 257, 181],
    [360, 288, 192],
];

/// 各采样率下 4 kHz 降采样的参数: (滤波器, 抽取因子, 群延迟补偿)
pub fn downsample_filter(fs_hz: u32) -> Option<(&'static [i16], usize, usize)> {
    match fs_hz {
        8000 => Some((&DOWNSAMPLE_8KHZ_TBL, 2, 2)),
        16000 => Some((&DOWNSAMPLE_16KHZ_TBL, 4, 3)),
        32000 => Some((&DOWNSAMPLE_32KHZ_TBL, 8, 4)),
        48000 => Some((&DOWNSAMPLE_48KHZ_TBL, 12, 4)),
        _ => None,
    }
}

/// 按 Q14 系数缩放信号, 系数每采样增加 `increment` (Q20), 限制在 [0, 16384]
///
/// 返回结束时的系数.
pub fn ramp_signal(input: &[i16], factor: i16, increment: i32, output: &mut [i16]) -> i16 {
    let mut factor = factor as i32;
    let mut factor_q20 = (factor << 6) + 32;
    for (o, &x) in output.iter_mut().zip(input) {
        *o = ((factor * x as i32 + 8192) >> 14) as i16;
        factor_q20 = (factor_q20 + increment).max(0);
        factor = (factor_q20 >> 6).min(16384);
    }
    factor as i16
}

/// 原地版本的 [`ramp_signal`]
pub fn ramp_signal_in_place(signal: &mut [i16], factor: i16, increment: i32) -> i16 {
    let input = signal.to_vec();
    ramp_signal(&input, factor, increment, signal)
}

/// 用 Q14 系数 `mix_factor` 混合两路信号, 系数每采样减少 `factor_decrement`
///
/// `output[i] = (f * input1[i] + (16384 - f) * input2[i] + 8192) >> 14`.
pub fn cross_fade(
    input1: &[i16],
    input2: &[i16],
    mix_factor: &mut i16,
    factor_decrement: i16,
    output: &mut [i16],
) {
    let mut factor = *mix_factor as i32;
    let mut inv_factor = 16384 - factor;
    for ((o, &a), &b) in output.iter_mut().zip(input1).zip(input2) {
        *o = ((factor * a as i32 + inv_factor * b as i32 + 8192) >> 14) as i16;
        factor -= factor_decrement as i32;
        inv_factor += factor_decrement as i32;
    }
    *mix_factor = factor as i16;
}

/// 逐渐解除静音: 系数 (Q14) 每采样增加 `increment` (Q20), 上限 16384
///
/// `increment` 为负时即为淡出. 结束时的系数写回 `factor`.
pub fn unmute_signal(input: &[i16], factor: &mut i16, increment: i32, output: &mut [i16]) {
    let mut factor_16b = *factor as i32;
    let mut factor_32b = (factor_16b << 6) + 32;
    for (o, &x) in output.iter_mut().zip(input) {
        *o = ((factor_16b * x as i32 + 8192) >> 14) as i16;
        factor_32b = (factor_32b + increment).max(0);
        factor_16b = (factor_32b >> 6).min(16384);
    }
    *factor = factor_16b as i16;
}

/// 从 1.0 开始按 `mute_slope` (Q20) 线性衰减, 原地处理
pub fn mute_signal(signal: &mut [i16], mute_slope: i32) {
    let mut factor = (16384i32 << 6) + 32;
    for s in signal {
        *s = (((factor >> 6) * *s as i32 + 8192) >> 14) as i16;
        factor -= mute_slope;
    }
}

/// 降采样到 4 kHz, 输出 `output.len()` 个采样
///
/// `compensate_delay` 为真时跳过低通滤波器的群延迟, 使输出与输入尾部对齐.
pub fn downsample_to_4khz(
    input: &[i16],
    fs_hz: u32,
    compensate_delay: bool,
    output: &mut [i16],
) -> TaoResult<()> {
    let (coef, factor, delay) = downsample_filter(fs_hz).ok_or_else(|| {
        TaoError::InvalidArgument(format!("不支持的采样率 {} Hz", fs_hz))
    })?;
    let delay = if compensate_delay { delay } else { 0 };
    downsample_fast(input, coef.len() - 1, output, coef, factor, delay)
}

/// 第一个最大值的下标
fn max_index_w16(data: &[i16]) -> usize {
    let mut best = 0;
    for (i, &v) in data.iter().enumerate() {
        if v > data[best] {
            best = i;
        }
    }
    best
}

/// 在 4 kHz 相关序列 `data[..data_length]` 中找出 `num_peaks` 个峰值
///
/// 每个峰值用抛物线插值细化到原采样率 (`fs_mult` 倍), 返回 `(位置, 峰值)`.
/// 找到一个峰后把其邻域清零再找下一个, 因此 `data` 会被修改.
/// 只找一个峰时允许读取 `data[data_length]`, 缺失的点按 0 处理.
pub fn peak_detection(
    data: &mut [i16],
    data_length: usize,
    num_peaks: usize,
    fs_mult: usize,
) -> Vec<(usize, i16)> {
    let at = |data: &[i16], i: usize| data.get(i).copied().unwrap_or(0);
    let mut data_length = data_length.min(data.len());
    let mut peaks = Vec::with_capacity(num_peaks);
    if data_length == 0 {
        return vec![(0, 0); num_peaks];
    }

    for i in 0..num_peaks {
        if num_peaks == 1 {
            // 抛物线插值需要峰值右侧多一个点
            data_length += 1;
        }
        let search_len = (data_length - 1).max(1).min(data.len());
        let peak = max_index_w16(&data[..search_len]);

        let (mut min_index, mut max_index) = (0, 0);
        if i != num_peaks - 1 {
            min_index = peak.saturating_sub(2);
            max_index = (data_length - 1).min(peak + 2);
        }

        let result = if peak != 0 && peak + 2 != data_length {
            let points = [at(data, peak - 1), at(data, peak), at(data, peak + 1)];
            parabolic_fit(points, fs_mult, peak)
        } else if peak + 2 == data_length {
            let (cur, next) = (at(data, peak), at(data, peak + 1));
            if cur > next && peak > 0 {
                let points = [at(data, peak - 1), cur, next];
                parabolic_fit(points, fs_mult, peak)
            } else {
                (
                    (peak * 2 + 1) * fs_mult,
                    ((cur as i32 + next as i32) >> 1) as i16,
                )
            }
        } else {
            (peak * 2 * fs_mult, at(data, peak))
        };
        peaks.push(result);

        if i != num_peaks - 1 {
            let end = (max_index + 1).min(data.len());
            if min_index < end {
                data[min_index..end].fill(0);
            }
        }
    }
    peaks
}

/// 三点抛物线插值, 把 4 kHz 下标 `peak_index` 细化到 `fs_mult * 8` kHz
///
/// 返回 `(细化后的下标, 插值峰值)`.
pub fn parabolic_fit(points: [i16; 3], fs_mult: usize, peak_index: usize) -> (usize, i16) {
    let fit_index: &[usize] = match fs_mult {
        1 => &[0, 8, 16],
        2 => &[0, 4, 8, 12, 16],
        4 => &[0, 2, 4, 6, 8, 10, 12, 14, 16],
        _ => &[0, 1, 3, 4, 5, 7, 8, 9, 11, 12, 13, 15, 16],
    };
    let fs_mult = fs_mult.clamp(1, 6);
    let [s0, s1, s2] = points.map(|v| v as i32);
    let num = s0 * -3 + s1 * 4 - s2;
    let den = s0 + s1 * -2 + s2;
    let temp = num * 120;
    let coef = |k: usize| PARABOLA_COEFFICIENTS[fit_index[k]];
    let stp = coef(fs_mult)[0] - coef(fs_mult - 1)[0];
    let strt = (coef(fs_mult)[0] + coef(fs_mult - 1)[0]) / 2;

    if temp < -den * strt {
        let mut lmt = strt - stp;
        let mut flag = 1;
        loop {
            if flag == fs_mult || temp > -den * lmt {
                let c = coef(fs_mult - flag);
                let value = (den * c[1] + num * c[2] + s0 * 256) / 256;
                return (peak_index * 2 * fs_mult - flag, value as i16);
            }
            flag += 1;
            lmt -= stp;
        }
    } else if temp > -den * (strt + stp) {
        let mut lmt = strt + 2 * stp;
        let mut flag = 1;
        loop {
            if flag == fs_mult || temp < -den * lmt {
                let c = coef(fs_mult + flag);
                let value = (den * c[1] + num * c[2] + s0 * 256) / 256;
                return (peak_index * 2 * fs_mult + flag, value as i16);
            }
            flag += 1;
            lmt += stp;
        }
    } else {
        (peak_index * 2 * fs_mult, points[1])
    }
}

/// 在 `[min_lag, max_lag]` 内搜索使 `signal[pos..pos+length]` 与延迟 `lag`
/// 的自身差值绝对和最小的延迟
///
/// 返回 `(最佳延迟, 最小失真)`. 调用方保证 `pos >= max_lag`.
pub fn min_distortion(
    signal: &[i16],
    pos: usize,
    min_lag: usize,
    max_lag: usize,
    length: usize,
) -> (usize, i32) {
    let current = &signal[pos..pos + length];
    let mut best = (0, i32::MAX);
    for lag in min_lag..=max_lag {
        let lagged = &signal[pos - lag..pos - lag + length];
        let sum: i64 = current
            .iter()
            .zip(lagged)
            .map(|(&a, &b)| (a as i64 - b as i64).abs())
            .sum();
        let sum = sum.min(i32::MAX as i64) as i32;
        if sum < best.1 {
            best = (lag, sum);
        }
    }
    best
}
