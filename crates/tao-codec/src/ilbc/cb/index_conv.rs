//! 第一个自适应子帧第 2, 3 级码本索引的压缩映射.
//!
//! 该子帧后两级的主码矢量搜索范围只有 44, 合法索引为
//! `[0, 44) ∪ [108, 172) ∪ [236, 256)`, 恰好可以双射到 7 bit 的 `[0, 128)`.

/// 需要映射的索引位置 (扩展块占 0..3, 第一个自适应子帧占 3..6)
const CONV_POSITIONS: [usize; 2] = [4, 5];

/// 编码端: 把原始索引压缩到 7 bit
pub fn index_conv_enc(index: &mut [usize]) {
    for &k in &CONV_POSITIONS {
        if let Some(v) = index.get_mut(k) {
            if (108..172).contains(v) {
                *v -= 64;
            } else if (236..256).contains(v) {
                *v -= 128;
            }
        }
    }
}

/// 解码端: 恢复原始索引
pub fn index_conv_dec(index: &mut [usize]) {
    for &k in &CONV_POSITIONS {
        if let Some(v) = index.get_mut(k) {
            if (44..108).contains(v) {
                *v += 64;
            } else if (108..128).contains(v) {
                *v += 128;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_set_is_bijective() {
        let legal: Vec<usize> = (0..44).chain(108..172).chain(236..256).collect();
        assert_eq!(legal.len(), 128);
        let mut seen = [false; 128];
        for &v in &legal {
            let mut idx = [0, 0, 0, 0, v, v];
            index_conv_enc(&mut idx);
            assert!(idx[4] < 128, "{v} -> {}", idx[4]);
            assert!(!seen[idx[4]], "collision at {}", idx[4]);
            seen[idx[4]] = true;
            index_conv_dec(&mut idx);
            assert_eq!(idx[4], v);
            assert_eq!(idx[5], v);
        }
    }

    #[test]
    fn test_other_positions_untouched() {
        let mut idx = [150usize; 15];
        index_conv_enc(&mut idx);
        assert_eq!(idx[3], 150);
        assert_eq!(idx[6], 150);
        assert_eq!(idx[4], 86);
    }
}
