//! 向量运算: 极值, 点积, 能量, 相关与缩放.

use super::math::{get_size_in_bits, norm_w32};
use super::{sat_w16_wide, sat_w32};

/// 最大绝对值 (-32768 饱和为 32767)
pub fn max_abs_w16(vector: &[i16]) -> i16 {
    let max = vector
        .iter()
        .map(|&v| (v as i32).abs())
        .max()
        .unwrap_or(0);
    max.min(32767) as i16
}

/// 32 位最大绝对值
pub fn max_abs_w32(vector: &[i32]) -> i32 {
    let max = vector
        .iter()
        .map(|&v| (v as i64).abs())
        .max()
        .unwrap_or(0);
    max.min(i32::MAX as i64) as i32
}

/// 最大值
pub fn max_value_w16(vector: &[i16]) -> i16 {
    vector.iter().copied().max().unwrap_or(i16::MIN)
}

/// 最小值
pub fn min_value_w16(vector: &[i16]) -> i16 {
    vector.iter().copied().min().unwrap_or(i16::MAX)
}

/// 第一个最大绝对值的下标
pub fn max_abs_index_w16(vector: &[i16]) -> usize {
    let mut best = 0;
    let mut best_value = -1i32;
    for (i, &v) in vector.iter().enumerate() {
        let a = (v as i32).abs();
        if a > best_value {
            best_value = a;
            best = i;
        }
    }
    best
}

/// 第一个最大值的下标
pub fn max_index_w32(vector: &[i32]) -> usize {
    let mut best = 0;
    for (i, &v) in vector.iter().enumerate() {
        if v > vector[best] {
            best = i;
        }
    }
    best
}

/// 计算平方和不溢出 32 位所需的右移位数
///
/// `times` 为参与累加的项数.
pub fn get_scaling_square(vector: &[i16], times: usize) -> u32 {
    let smax = max_abs_w16(vector) as i32;
    if smax == 0 {
        return 0;
    }
    let t = norm_w32(smax * smax);
    let nbits = get_size_in_bits(times as u32);
    nbits.saturating_sub(t)
}

/// 点积, 每一项右移 `scaling` 位, 结果为 Q(-scaling)
pub fn dot_product_with_scale(a: &[i16], b: &[i16], scaling: u32) -> i32 {
    let sum: i64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (x as i64 * y as i64) >> scaling)
        .sum();
    sat_w32(sum)
}

/// 能量, 返回 (能量, 右移位数)
pub fn energy(vector: &[i16]) -> (i32, u32) {
    let scaling = get_scaling_square(vector, vector.len());
    (dot_product_with_scale(vector, vector, scaling), scaling)
}

/// 互相关
///
/// `out[i] = Σ_{j<dim} seq1[j] * seq2[seq2_start + i*step + j] >> right_shifts`.
/// 调用方保证所有下标落在 `seq2` 之内.
pub fn cross_correlation(
    out: &mut [i32],
    seq1: &[i16],
    seq2: &[i16],
    seq2_start: usize,
    dim: usize,
    right_shifts: u32,
    step: isize,
) {
    for (i, value) in out.iter_mut().enumerate() {
        let offset = (seq2_start as isize + i as isize * step) as usize;
        *value = dot_product_with_scale(&seq1[..dim], &seq2[offset..offset + dim], right_shifts);
    }
}

/// 自相关, 返回 (r[0..=order], 右移位数)
pub fn auto_correlation(x: &[i16], order: usize) -> (Vec<i32>, u32) {
    let scaling = get_scaling_square(x, x.len());
    let len = x.len();
    let result = (0..=order)
        .map(|lag| {
            if lag >= len {
                0
            } else {
                dot_product_with_scale(&x[..len - lag], &x[lag..], scaling)
            }
        })
        .collect();
    (result, scaling)
}

/// `out = sat((in * gain) >> right_shifts)`
pub fn scale_vector_with_sat(out: &mut [i16], input: &[i16], gain: i16, right_shifts: u32) {
    for (o, &x) in out.iter_mut().zip(input) {
        *o = sat_w16_wide((x as i64 * gain as i64) >> right_shifts);
    }
}

/// `out = (in1*scale1 + in2*scale2 + round) >> right_shifts`
pub fn scale_and_add_vectors_with_round(
    in1: &[i16],
    scale1: i16,
    in2: &[i16],
    scale2: i16,
    right_shifts: u32,
    out: &mut [i16],
) {
    let round = if right_shifts > 0 {
        1i64 << (right_shifts - 1)
    } else {
        0
    };
    for ((o, &a), &b) in out.iter_mut().zip(in1).zip(in2) {
        let sum = a as i64 * scale1 as i64 + b as i64 * scale2 as i64 + round;
        *o = sat_w16_wide(sum >> right_shifts);
    }
}

/// `out = (in * gain + add_constant) >> right_shifts`
pub fn affine_transform_vector(
    out: &mut [i16],
    input: &[i16],
    gain: i16,
    add_constant: i32,
    right_shifts: u32,
) {
    for (o, &x) in out.iter_mut().zip(input) {
        *o = sat_w16_wide((x as i64 * gain as i64 + add_constant as i64) >> right_shifts);
    }
}

/// `out += (in * gain + add_constant) >> right_shifts`
pub fn add_affine_vector_to_vector(
    out: &mut [i16],
    input: &[i16],
    gain: i16,
    add_constant: i32,
    right_shifts: u32,
) {
    for (o, &x) in out.iter_mut().zip(input) {
        let add = (x as i64 * gain as i64 + add_constant as i64) >> right_shifts;
        *o = sat_w16_wide(*o as i64 + add);
    }
}

/// 逐元素相乘后右移
pub fn elementwise_vector_mult(out: &mut [i16], input: &[i16], window: &[i16], right_shifts: u32) {
    for ((o, &x), &w) in out.iter_mut().zip(input).zip(window) {
        *o = sat_w16_wide((x as i64 * w as i64) >> right_shifts);
    }
}

/// 与倒序窗口逐元素相乘: `out[i] = in[i] * window[n-1-i] >> right_shifts`
pub fn reverse_order_mult_array_elements(
    out: &mut [i16],
    input: &[i16],
    window: &[i16],
    right_shifts: u32,
) {
    let n = out.len().min(input.len()).min(window.len());
    for i in 0..n {
        out[i] = sat_w16_wide((input[i] as i64 * window[n - 1 - i] as i64) >> right_shifts);
    }
}

/// 16 位向量移位, 正数右移, 负数左移 (饱和)
pub fn vector_bit_shift_w16(out: &mut [i16], input: &[i16], right_shifts: i32) {
    for (o, &x) in out.iter_mut().zip(input) {
        *o = if right_shifts >= 0 {
            x >> right_shifts.min(15)
        } else {
            sat_w16_wide((x as i64) << (-right_shifts).min(31))
        };
    }
}

/// 32 位向量移位后饱和到 16 位, 正数右移, 负数左移
pub fn vector_bit_shift_w32_to_w16(out: &mut [i16], input: &[i32], right_shifts: i32) {
    for (o, &x) in out.iter_mut().zip(input) {
        let v = if right_shifts >= 0 {
            (x as i64) >> right_shifts.min(63)
        } else {
            (x as i64) << (-right_shifts).min(31)
        };
        *o = sat_w16_wide(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_abs() {
        assert_eq!(max_abs_w16(&[1, -5, 3]), 5);
        assert_eq!(max_abs_w16(&[i16::MIN]), 32767);
        assert_eq!(max_abs_w16(&[]), 0);
        assert_eq!(max_abs_w32(&[3, -9]), 9);
        assert_eq!(max_abs_index_w16(&[1, -5, 5]), 1);
        assert_eq!(max_index_w32(&[1, 7, 7, 2]), 1);
    }

    #[test]
    fn test_dot_product_and_energy() {
        let a = [1000i16, -2000, 3000];
        assert_eq!(dot_product_with_scale(&a, &a, 0), 14_000_000);
        assert_eq!(dot_product_with_scale(&a, &a, 2), 3_500_000);
        let (e, s) = energy(&a);
        assert_eq!(s, 0);
        assert_eq!(e, 14_000_000);

        let loud = [32767i16; 240];
        let (e, s) = energy(&loud);
        assert!(s > 0);
        assert!(e > 0);
    }

    #[test]
    fn test_auto_correlation_symmetry() {
        let x: Vec<i16> = (0..64).map(|i| ((i * 37) % 200 - 100) as i16).collect();
        let (r, scale) = auto_correlation(&x, 4);
        assert_eq!(r.len(), 5);
        assert_eq!(scale, 0);
        assert!(r.iter().skip(1).all(|&v| v.abs() <= r[0]));
    }

    #[test]
    fn test_cross_correlation_steps() {
        let seq1 = [1i16, 2, 3];
        let seq2 = [0i16, 1, 2, 3, 0, 0];
        let mut out = [0i32; 3];
        cross_correlation(&mut out, &seq1, &seq2, 0, 3, 0, 1);
        assert_eq!(out, [8, 14, 8]);

        let mut back = [0i32; 2];
        cross_correlation(&mut back, &seq1, &seq2, 1, 3, 0, -1);
        assert_eq!(back, [14, 8]);
    }

    #[test]
    fn test_scale_helpers() {
        let mut out = [0i16; 2];
        scale_vector_with_sat(&mut out, &[16384, -16384], 32767, 14);
        assert_eq!(out, [32767, -32767]);

        scale_and_add_vectors_with_round(&[100, 100], 8192, &[100, 0], 8192, 14, &mut out);
        assert_eq!(out, [100, 50]);

        affine_transform_vector(&mut out, &[10, 20], 16384, 8192, 14);
        assert_eq!(out, [10, 20]);

        add_affine_vector_to_vector(&mut out, &[10, 20], 16384, 8192, 14);
        assert_eq!(out, [20, 40]);
    }

    #[test]
    fn test_bit_shift_saturates() {
        let mut out = [0i16; 2];
        vector_bit_shift_w32_to_w16(&mut out, &[1 << 20, -(1 << 20)], 2);
        assert_eq!(out, [32767, -32768]);
        vector_bit_shift_w16(&mut out, &[8, -8], 2);
        assert_eq!(out, [2, -2]);
    }
}
