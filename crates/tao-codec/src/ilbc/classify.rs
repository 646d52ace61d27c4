//! 帧分类: 选择残差能量最大的两个相邻子帧作为起始状态的位置.

use super::tables::{SAMP_EN_WIN_Q15, SSQ_EN_WIN_Q15};
use super::{IlbcMode, STATE_LEN, SUBL};

/// 返回起始状态位置索引 (从 1 开始), 起始状态占据子帧 `idx - 1` 与 `idx`
pub fn frame_classify(mode: IlbcMode, residual: &[i16]) -> usize {
    let candidates = mode.nsub() - 1;
    // 20 ms 模式只有 3 个候选, 使用位置权重的中间部分
    let win_offset = match mode {
        IlbcMode::Ms20 => 1,
        IlbcMode::Ms30 => 0,
    };
    let edge = SAMP_EN_WIN_Q15.len();

    let mut best = 0usize;
    let mut best_energy = -1i64;
    for n in 0..candidates {
        let block = &residual[n * SUBL..n * SUBL + STATE_LEN];
        let mut energy = 0i64;
        for (i, &x) in block.iter().enumerate() {
            let sq = x as i64 * x as i64;
            energy += if i < edge {
                (sq * SAMP_EN_WIN_Q15[i] as i64) >> 15
            } else if i >= STATE_LEN - edge {
                (sq * SAMP_EN_WIN_Q15[STATE_LEN - 1 - i] as i64) >> 15
            } else {
                sq
            };
        }
        let weighted = (energy * SSQ_EN_WIN_Q15[n + win_offset] as i64) >> 15;
        if weighted > best_energy {
            best_energy = weighted;
            best = n;
        }
    }
    best + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burst_at(len: usize, start: usize) -> Vec<i16> {
        let mut x = vec![10i16; len];
        for (i, v) in x[start..start + STATE_LEN].iter_mut().enumerate() {
            *v = if i % 2 == 0 { 3000 } else { -3000 };
        }
        x
    }

    #[test]
    fn test_picks_loudest_pair() {
        assert_eq!(frame_classify(IlbcMode::Ms20, &burst_at(160, 0)), 1);
        assert_eq!(frame_classify(IlbcMode::Ms20, &burst_at(160, 80)), 3);
        assert_eq!(frame_classify(IlbcMode::Ms30, &burst_at(240, 120)), 4);
        assert_eq!(frame_classify(IlbcMode::Ms30, &burst_at(240, 160)), 5);
    }

    #[test]
    fn test_flat_input_prefers_interior() {
        let x = vec![1000i16; 240];
        assert_eq!(frame_classify(IlbcMode::Ms30, &x), 3);
        let x = vec![1000i16; 160];
        assert_eq!(frame_classify(IlbcMode::Ms20, &x), 2);
    }

    #[test]
    fn test_silence_is_valid() {
        let idx = frame_classify(IlbcMode::Ms20, &[0; 160]);
        assert!((1..=3).contains(&idx));
    }
}
