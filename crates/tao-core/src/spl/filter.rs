//! Q12 AR/MA 滤波, 降采样与带宽扩展.

use super::sat_w16_wide;
use crate::{TaoError, TaoResult};

/// AR (全极点) 滤波, 系数为 Q12, `coef[0]` 视为 4096.
///
/// `output` 长度必须为 `order + input.len()`, 其中 `output[..order]` 为滤波器状态
/// (最早的在前). 结果写入 `output[order..]`.
pub fn filter_ar_fast_q12(input: &[i16], output: &mut [i16], coef: &[i16]) {
    let order = coef.len().saturating_sub(1);
    debug_assert_eq!(output.len(), order + input.len());
    for (i, &x) in input.iter().enumerate() {
        let pos = order + i;
        let mut sum = (x as i64) << 12;
        for k in 1..=order {
            sum -= coef[k] as i64 * output[pos - k] as i64;
        }
        output[pos] = sat_w16_wide((sum + 2048) >> 12);
    }
}

/// MA (全零点) 滤波, 系数为 Q12.
///
/// `input` 长度必须为 `order + output.len()`, 其中 `input[..order]` 为历史采样.
pub fn filter_ma_fast_q12(input: &[i16], output: &mut [i16], coef: &[i16]) {
    let order = coef.len().saturating_sub(1);
    debug_assert_eq!(input.len(), order + output.len());
    for (i, o) in output.iter_mut().enumerate() {
        let pos = order + i;
        let mut sum = 0i64;
        for (k, &c) in coef.iter().enumerate() {
            sum += c as i64 * input[pos - k] as i64;
        }
        *o = sat_w16_wide((sum + 2048) >> 12);
    }
}

/// 带独立状态的 AR 滤波
///
/// `state` 保存最近 `order` 个输出 (最早的在前), 滤波后更新.
pub fn ar_filter(coef: &[i16], input: &[i16], state: &mut [i16], output: &mut [i16]) {
    let order = coef.len().saturating_sub(1);
    debug_assert_eq!(state.len(), order);
    let mut buf = Vec::with_capacity(order + input.len());
    buf.extend_from_slice(state);
    buf.resize(order + input.len(), 0);
    filter_ar_fast_q12(input, &mut buf, coef);
    output[..input.len()].copy_from_slice(&buf[order..]);
    let end = buf.len();
    state.copy_from_slice(&buf[end - order..]);
}

/// FIR 降采样
///
/// `output[i] = Σ_j coef[j] * input[start + i*factor + delay - j]` (Q12, 舍入).
/// 要求 `start + delay >= coef.len() - 1` 且输入长度足够.
pub fn downsample_fast(
    input: &[i16],
    start: usize,
    output: &mut [i16],
    coef: &[i16],
    factor: usize,
    delay: usize,
) -> TaoResult<()> {
    let order = coef.len().saturating_sub(1);
    if factor == 0 || start + delay < order {
        return Err(TaoError::InvalidArgument(format!(
            "降采样参数无效: start={}, delay={}, order={}, factor={}",
            start, delay, order, factor,
        )));
    }
    if !output.is_empty() {
        let last = start + delay + factor * (output.len() - 1);
        if last >= input.len() {
            return Err(TaoError::InvalidArgument(format!(
                "降采样输入过短: 需要 {} 个采样, 实际 {}",
                last + 1,
                input.len(),
            )));
        }
    }
    for (i, o) in output.iter_mut().enumerate() {
        let pos = start + i * factor + delay;
        let mut sum = 2048i64;
        for (j, &c) in coef.iter().enumerate() {
            sum += c as i64 * input[pos - j] as i64;
        }
        *o = sat_w16_wide(sum >> 12);
    }
    Ok(())
}

/// 带宽扩展: `out[i] = (coef[i] * chirp[i] + 16384) >> 15`
pub fn bw_expand(out: &mut [i16], coef: &[i16], chirp: &[i16]) {
    for ((o, &c), &w) in out.iter_mut().zip(coef).zip(chirp) {
        *o = sat_w16_wide((c as i64 * w as i64 + 16384) >> 15);
    }
}
