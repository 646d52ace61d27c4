//! LSF 表示: 与 LPC 互转, 分裂矢量量化, 稳定性检查与子帧插值.
//!
//! LSF 以 Q13 弧度存储, LSP (= cos(LSF)) 以 Q15 存储.

use tao_core::spl::{bw_expand, sat_w16_wide};

use super::tables::{
    CHIRP_WEIGHT_DENUM, COS_Q15, LSF_CB_Q13, LSF_DIM_CB, LSF_HALF_DIST_Q13, LSF_MAX_Q13,
    LSF_MEAN_Q13, LSF_MIN_DIST_Q13, LSF_MIN_Q13, LSF_SIZE_CB, LSF_WEIGHT_20MS, LSF_WEIGHT_30MS,
    PI_Q13,
};
use super::{IlbcMode, LPC_COEF_LEN, LPC_FILTERORDER};

/// 一组 LSF
pub type Lsf = [i16; LPC_FILTERORDER];

/// LSF 均值, 作为编解码器的初始 "上一帧" LSF
pub fn mean_lsf() -> Lsf {
    LSF_MEAN_Q13
}

/// 单位滤波器 A(z) = 1 的 LSF: P/Q 多项式的根在 kπ/11 处均匀分布
pub fn identity_lsf() -> Lsf {
    let mut lsf = [0i16; LPC_FILTERORDER];
    for (k, v) in lsf.iter_mut().enumerate() {
        *v = ((k as i32 + 1) * PI_Q13 / 11) as i16;
    }
    lsf
}

/// LSF (Q13) -> LSP (Q15), 查表线性插值
pub fn lsf_to_lsp(lsf: &[i16], lsp: &mut [i16]) {
    for (p, &f) in lsp.iter_mut().zip(lsf) {
        let x = (f.max(0) as i32) * 256;
        let k = (x / PI_Q13) as usize;
        if k >= 256 {
            *p = COS_Q15[256];
            continue;
        }
        let frac = x % PI_Q13;
        let c0 = COS_Q15[k] as i32;
        let c1 = COS_Q15[k + 1] as i32;
        *p = (c0 + (c1 - c0) * frac / PI_Q13) as i16;
    }
}

/// LSP (Q15) -> LSF (Q13), 在余弦表上二分查找后线性插值
fn lsp_to_lsf_single(x: i32) -> i16 {
    // COS_Q15 单调递减
    let upper = COS_Q15.partition_point(|&c| c as i32 >= x);
    let k = upper.saturating_sub(1).min(255);
    let c0 = COS_Q15[k] as i32;
    let c1 = COS_Q15[k + 1] as i32;
    let frac = if c0 == c1 {
        0
    } else {
        ((c0 - x).clamp(0, c0 - c1) * PI_Q13) / (c0 - c1)
    };
    ((k as i32 * PI_Q13 + frac) / 256) as i16
}

/// 由 LSP 构造对称多项式 Π(1 - 2q z^-1 + z^-2) 的系数 (Q24)
fn lsp_poly(lsp: impl Iterator<Item = i16>) -> [i64; LPC_FILTERORDER + 1] {
    let mut f = [0i64; LPC_FILTERORDER + 1];
    f[0] = 1 << 24;
    let mut degree = 0usize;
    for q in lsp {
        degree += 2;
        for k in (1..=degree).rev() {
            let mut v = f[k] - ((2 * q as i64 * f[k - 1]) >> 15);
            if k >= 2 {
                v += f[k - 2];
            }
            f[k] = v;
        }
    }
    f
}

/// LSF -> LPC 系数 (Q12, `a[0] = 4096`)
pub fn lsf_to_lpc(lsf: &[i16]) -> [i16; LPC_COEF_LEN] {
    let mut lsp = [0i16; LPC_FILTERORDER];
    lsf_to_lsp(lsf, &mut lsp);

    let f1 = lsp_poly(lsp.iter().step_by(2).copied());
    let f2 = lsp_poly(lsp.iter().skip(1).step_by(2).copied());

    let mut a = [0i16; LPC_COEF_LEN];
    a[0] = 4096;
    for i in 1..LPC_COEF_LEN {
        // P(z) = F1(z)(1 + z^-1), Q(z) = F2(z)(1 - z^-1), A = (P + Q) / 2
        let p = f1[i] + f1[i - 1];
        let q = f2[i] - f2[i - 1];
        a[i] = sat_w16_wide((p + q + (1 << 12)) >> 13);
    }
    a
}

/// Chebyshev 级数求值: `c[0]/2 + Σ c[k] T_k(x)` 的变体, `coef` 从 T0 到 T5 排列 (Q12)
fn chebyshev(x: i32, coef: &[i64; 6]) -> i64 {
    let x = x as i64;
    let mut b1 = 0i64;
    let mut b2 = 0i64;
    for &c in coef.iter().skip(1).rev() {
        let b0 = ((2 * x * b1) >> 15) - b2 + c;
        b2 = b1;
        b1 = b0;
    }
    ((x * b1) >> 15) - b2 + coef[0]
}

/// 在余弦网格上寻找 Chebyshev 级数的全部根 (LSP 值, Q15), 按频率升序
fn find_roots(coef: &[i64; 6]) -> Vec<i32> {
    let mut roots = Vec::with_capacity(5);
    let mut xa = COS_Q15[0] as i32;
    let mut fa = chebyshev(xa, coef);
    for &c in COS_Q15.iter().skip(1) {
        let xb = c as i32;
        let fb = chebyshev(xb, coef);
        if (fa >= 0) != (fb >= 0) {
            // 二分细化后线性插值
            let (mut lo, mut flo, mut hi, mut fhi) = (xa, fa, xb, fb);
            for _ in 0..8 {
                let mid = (lo + hi) / 2;
                let fm = chebyshev(mid, coef);
                if (fm >= 0) == (flo >= 0) {
                    lo = mid;
                    flo = fm;
                } else {
                    hi = mid;
                    fhi = fm;
                }
            }
            let root = if flo == fhi {
                lo
            } else {
                lo - ((flo * (lo - hi) as i64) / (flo - fhi)) as i32
            };
            roots.push(root);
        }
        xa = xb;
        fa = fb;
    }
    roots
}

/// LPC 系数 (Q12) -> LSF (Q13)
///
/// 根的个数不足时返回 `None`, 调用方应沿用上一组 LSF.
pub fn lpc_to_lsf(a: &[i16]) -> Option<Lsf> {
    let half = LPC_FILTERORDER / 2;
    let mut p = [0i64; 6];
    let mut q = [0i64; 6];
    p[0] = 4096;
    q[0] = 4096;
    for i in 1..=half {
        let ai = a[i] as i64;
        let aj = a[LPC_FILTERORDER + 1 - i] as i64;
        p[i] = ai + aj - p[i - 1];
        q[i] = ai - aj + q[i - 1];
    }
    // 多项式 x^5 + p1 x^4 + ... 对应 T5 + p1 T4 + p2 T3 + p3 T2 + p4 T1 + p5/2
    let to_cheb = |v: &[i64; 6]| [v[5] / 2, v[4], v[3], v[2], v[1], v[0]];
    let roots_p = find_roots(&to_cheb(&p));
    let roots_q = find_roots(&to_cheb(&q));
    if roots_p.len() != half || roots_q.len() != half {
        return None;
    }

    let mut lsf = [0i16; LPC_FILTERORDER];
    for i in 0..half {
        lsf[2 * i] = lsp_to_lsf_single(roots_p[i]);
        lsf[2 * i + 1] = lsp_to_lsf_single(roots_q[i]);
    }
    Some(lsf)
}

/// 分裂矢量量化, 返回各段索引, 量化结果写入 `quantized`
pub fn split_vq(lsf: &[i16], quantized: &mut [i16]) -> [usize; 3] {
    let mut indices = [0usize; 3];
    let mut cb_offset = 0;
    let mut pos = 0;
    for (split, index) in indices.iter_mut().enumerate() {
        let dim = LSF_DIM_CB[split];
        let size = LSF_SIZE_CB[split];
        let mut best = i64::MAX;
        for entry in 0..size {
            let cand = &LSF_CB_Q13[cb_offset + entry * dim..cb_offset + (entry + 1) * dim];
            let dist: i64 = cand
                .iter()
                .zip(&lsf[pos..pos + dim])
                .map(|(&c, &x)| {
                    let d = x as i64 - c as i64;
                    d * d
                })
                .sum();
            if dist < best {
                best = dist;
                *index = entry;
            }
        }
        let start = cb_offset + *index * dim;
        quantized[pos..pos + dim].copy_from_slice(&LSF_CB_Q13[start..start + dim]);
        cb_offset += size * dim;
        pos += dim;
    }
    indices
}

/// 由分裂矢量量化索引重建一组 LSF
///
/// 索引超出码本时返回 `None`.
pub fn split_vq_dequant(indices: &[usize]) -> Option<Lsf> {
    let mut lsf = [0i16; LPC_FILTERORDER];
    let mut cb_offset = 0;
    let mut pos = 0;
    for (split, &index) in indices.iter().enumerate().take(3) {
        let dim = LSF_DIM_CB[split];
        let size = LSF_SIZE_CB[split];
        if index >= size {
            return None;
        }
        let start = cb_offset + index * dim;
        lsf[pos..pos + dim].copy_from_slice(&LSF_CB_Q13[start..start + dim]);
        cb_offset += size * dim;
        pos += dim;
    }
    Some(lsf)
}

/// LSF 稳定性检查: 保证最小间距与上下界, 扫描两遍
///
/// 返回是否做过修改.
pub fn lsf_check(lsf: &mut [i16]) -> bool {
    let mut changed = false;
    for _ in 0..2 {
        for set in lsf.chunks_mut(LPC_FILTERORDER) {
            for k in 0..set.len() {
                if k + 1 < set.len() && (set[k + 1] as i32 - set[k] as i32) < LSF_MIN_DIST_Q13 as i32
                {
                    if set[k + 1] < set[k] {
                        set.swap(k, k + 1);
                    }
                    set[k] -= LSF_HALF_DIST_Q13;
                    set[k + 1] += LSF_HALF_DIST_Q13;
                    changed = true;
                }
                if set[k] < LSF_MIN_Q13 {
                    set[k] = LSF_MIN_Q13;
                    changed = true;
                }
                if set[k] > LSF_MAX_Q13 {
                    set[k] = LSF_MAX_Q13;
                    changed = true;
                }
            }
        }
    }
    changed
}

/// 按 Q14 权重插值两组 LSF: `w * old + (1 - w) * new`
pub fn interpolate(old: &[i16], new: &[i16], weight_q14: i16) -> Lsf {
    let mut out = [0i16; LPC_FILTERORDER];
    let w = weight_q14 as i32;
    for ((o, &a), &b) in out.iter_mut().zip(old).zip(new) {
        *o = ((w * a as i32 + (16384 - w) * b as i32 + 8192) >> 14) as i16;
    }
    out
}

/// 逐子帧插值 LSF 并转换为 LPC 系数, 结果按子帧顺序写入 `out` (每子帧 11 个)
///
/// `lsf` 含本帧的 1 组 (20 ms) 或 2 组 (30 ms) LSF, `old` 为上一帧最后一组,
/// 调用后更新为本帧最后一组.
pub fn interpolate_to_lpc(mode: IlbcMode, lsf: &[i16], old: &mut Lsf, out: &mut [i16]) {
    let nsub = mode.nsub();
    debug_assert_eq!(out.len(), nsub * LPC_COEF_LEN);
    let first = &lsf[..LPC_FILTERORDER];
    match mode {
        IlbcMode::Ms20 => {
            for (i, &w) in LSF_WEIGHT_20MS.iter().enumerate() {
                let sub = interpolate(old, first, w);
                out[i * LPC_COEF_LEN..(i + 1) * LPC_COEF_LEN].copy_from_slice(&lsf_to_lpc(&sub));
            }
            old.copy_from_slice(first);
        }
        IlbcMode::Ms30 => {
            let second = &lsf[LPC_FILTERORDER..2 * LPC_FILTERORDER];
            for (i, &w) in LSF_WEIGHT_30MS.iter().enumerate() {
                let sub = if i == 0 {
                    interpolate(old, first, w)
                } else {
                    interpolate(first, second, w)
                };
                out[i * LPC_COEF_LEN..(i + 1) * LPC_COEF_LEN].copy_from_slice(&lsf_to_lpc(&sub));
            }
            old.copy_from_slice(second);
        }
    }
}

/// 由合成滤波器系数得到感知加权滤波器系数 (逐子帧带宽扩展 0.4222)
pub fn weighting_from_lpc(lpc: &[i16], out: &mut [i16]) {
    for (o, a) in out
        .chunks_mut(LPC_COEF_LEN)
        .zip(lpc.chunks(LPC_COEF_LEN))
    {
        bw_expand(o, a, &CHIRP_WEIGHT_DENUM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsp_conversion_inverse() {
        let lsf = mean_lsf();
        let mut lsp = [0i16; LPC_FILTERORDER];
        lsf_to_lsp(&lsf, &mut lsp);
        for (&p, &f) in lsp.iter().zip(&lsf) {
            let back = lsp_to_lsf_single(p as i32);
            assert!((back - f).abs() <= 8, "{f} -> {p} -> {back}");
        }
        // cos(0) 与 cos(π)
        lsf_to_lsp(&[0, PI_Q13 as i16], &mut lsp[..2]);
        assert_eq!(lsp[0], 32767);
        assert_eq!(lsp[1], -32768);
    }

    #[test]
    fn test_lsf_lpc_roundtrip() {
        let lsf = mean_lsf();
        let a = lsf_to_lpc(&lsf);
        assert_eq!(a[0], 4096);
        let back = lpc_to_lsf(&a).expect("mean LSF must be recoverable");
        for (&x, &y) in back.iter().zip(&lsf) {
            assert!((x - y).abs() <= 40, "{:?} vs {:?}", back, lsf);
        }
    }

    #[test]
    fn test_equally_spaced_lsf_is_flat_filter() {
        // 等间距 LSF 对应 A(z) ≈ 1
        let a = lsf_to_lpc(&identity_lsf());
        assert!(a[1..].iter().all(|&c| c.abs() < 64), "{a:?}");
    }

    #[test]
    fn test_split_vq_mean_maps_to_first_entries() {
        let lsf = mean_lsf();
        let mut q = [0i16; LPC_FILTERORDER];
        let idx = split_vq(&lsf, &mut q);
        assert_eq!(idx, [0, 0, 0]);
        assert_eq!(q, lsf);
        assert_eq!(split_vq_dequant(&idx), Some(lsf));
        assert_eq!(split_vq_dequant(&[0, 32, 0]), None);
    }

    #[test]
    fn test_lsf_check_repairs_order() {
        let mut lsf = mean_lsf();
        lsf[3] = lsf[4] + 10;
        lsf[0] = 10;
        assert!(lsf_check(&mut lsf));
        assert!(lsf[0] >= LSF_MIN_Q13);
        for k in 0..LPC_FILTERORDER - 1 {
            assert!(lsf[k + 1] > lsf[k], "{lsf:?}");
        }
        let mut good = mean_lsf();
        assert!(!lsf_check(&mut good));
    }

    #[test]
    fn test_interpolation_endpoints() {
        let old = mean_lsf();
        let mut new = mean_lsf();
        new.iter_mut().for_each(|v| *v += 200);
        assert_eq!(interpolate(&old, &new, 16384), old);
        assert_eq!(interpolate(&old, &new, 0), new);
        let mid = interpolate(&old, &new, 8192);
        assert_eq!(mid[0], old[0] + 100);
    }

    #[test]
    fn test_interpolate_to_lpc_updates_old() {
        let mut old = mean_lsf();
        let mut lsf = [0i16; 20];
        lsf[..10].copy_from_slice(&mean_lsf());
        lsf[10..].copy_from_slice(&mean_lsf());
        lsf[10] += 100;
        let mut out = [0i16; 6 * LPC_COEF_LEN];
        interpolate_to_lpc(IlbcMode::Ms30, &lsf, &mut old, &mut out);
        assert_eq!(old[0], mean_lsf()[0] + 100);
        assert!(out.chunks(LPC_COEF_LEN).all(|a| a[0] == 4096));
    }
}
