//! 自动选择移位量的互相关.

use tao_core::spl::{cross_correlation, max_abs_w16, norm_w32};

/// 计算互相关, 并自动选择右移位数使所有结果落在 32 位以内
///
/// `out[i] = Σ_{j<dim} seq1[j] * seq2[seq2_start + i*step + j] >> shift`,
/// 其中 `i < out.len()`. 返回使用的右移位数.
pub fn cross_correlation_with_auto_shift(
    seq1: &[i16],
    seq2: &[i16],
    seq2_start: usize,
    dim: usize,
    step: isize,
    out: &mut [i32],
) -> u32 {
    if out.is_empty() || dim == 0 {
        return 0;
    }
    let max_1 = max_abs_w16(&seq1[..dim]) as i64;
    let shift = step * (out.len() as isize - 1);
    let seq2_begin = if shift >= 0 {
        seq2_start
    } else {
        seq2_start - shift.unsigned_abs()
    };
    let seq2_len = dim + shift.unsigned_abs();
    let max_2 = max_abs_w16(&seq2[seq2_begin..seq2_begin + seq2_len]) as i64;

    let factor = ((max_1 * max_2 * dim as i64) >> 31) as i32;
    let scaling = if factor == 0 {
        0
    } else {
        31 - norm_w32(factor)
    };
    cross_correlation(out, seq1, seq2, seq2_start, dim, scaling, step);
    scaling
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_signals_need_no_shift() {
        let x = [100i16, -200, 300, -400, 500];
        let mut out = [0i32; 2];
        let shift = cross_correlation_with_auto_shift(&x[1..], &x, 1, 4, -1, &mut out);
        assert_eq!(shift, 0);
        assert_eq!(out[0], 200 * 200 + 300 * 300 + 400 * 400 + 500 * 500);
    }

    #[test]
    fn test_loud_signals_are_scaled() {
        let x = vec![30000i16; 300];
        let mut out = [0i32; 3];
        let shift = cross_correlation_with_auto_shift(&x[..256], &x, 0, 256, 1, &mut out);
        assert!(shift > 0);
        assert!(out.iter().all(|&v| v > 0 && v == out[0]));
    }
}
