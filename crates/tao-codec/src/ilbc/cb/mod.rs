//! 自适应码本.
//!
//! 码本由记忆 (已解码的残差) 派生, 分为两段:
//! - 直接段: 记忆的各个延迟切片, 以及 (40 采样子帧时) 延迟 20..=39 的增强码矢量
//! - 滤波段: 记忆经 8 抽头 FIR 后的同构结构, 索引整体偏移 `base_size`
//!
//! 码矢量只是记忆上的视图, 不复制整个码本. 各码矢量的能量在构造时一次算好,
//! 整数延迟部分按滑动窗口递推.

mod construct;
mod index_conv;
mod search;

pub use construct::cb_construct;
pub use index_conv::{index_conv_dec, index_conv_enc};
pub use search::cb_search;

use super::SUBL;
use super::tables::{AUG_ALPHA_Q15, CB_FILTER_Q14, GAIN_SQ3_Q14, GAIN_SQ4_Q14, GAIN_SQ5_Q14};

/// 增强码矢量的最小延迟
const AUG_LAG_MIN: usize = SUBL / 2;
/// 增强码矢量中的插值采样数
const AUG_INTERP_LEN: usize = AUG_ALPHA_Q15.len();
/// 码本 FIR 的半长
const CB_HALFFILTERLEN: usize = CB_FILTER_Q14.len() / 2;

/// 码本的索引布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CbLayout {
    /// 记忆长度
    pub lmem: usize,
    /// 码矢量长度
    pub cbveclen: usize,
}

impl CbLayout {
    pub fn new(lmem: usize, cbveclen: usize) -> Self {
        Self { lmem, cbveclen }
    }

    /// 每段中整数延迟码矢量的个数
    pub fn main_len(&self) -> usize {
        self.lmem - self.cbveclen + 1
    }

    /// 是否包含增强码矢量
    pub fn has_aug(&self) -> bool {
        self.cbveclen == SUBL
    }

    /// 每段的码矢量个数
    pub fn base_size(&self) -> usize {
        if self.has_aug() {
            self.main_len() + SUBL / 2
        } else {
            self.main_len()
        }
    }

    /// 码本总大小 (直接段 + 滤波段)
    pub fn total(&self) -> usize {
        2 * self.base_size()
    }

    /// 段内索引是否在给定主码矢量搜索范围内合法
    pub fn is_legal(&self, index: usize, range: usize) -> bool {
        index < range.min(self.main_len()) || (index >= self.main_len() && index < self.base_size())
    }
}

/// 码本记忆: 直接段与滤波段
pub struct CbMemory {
    layout: CbLayout,
    direct: Vec<i32>,
    filtered: Vec<i32>,
    /// 各索引码矢量的能量, 直接段在前
    energies: Vec<i64>,
}

impl CbMemory {
    /// 由记忆采样构造, `mem.len()` 即记忆长度
    pub fn new<T: Copy + Into<i32>>(mem: &[T], cbveclen: usize) -> Self {
        let direct: Vec<i32> = mem.iter().map(|&v| v.into()).collect();
        let filtered = filter_memory(&direct);
        let layout = CbLayout::new(mem.len(), cbveclen);
        let mut energies = section_energies(&direct, layout);
        energies.extend(section_energies(&filtered, layout));
        Self {
            layout,
            direct,
            filtered,
            energies,
        }
    }

    pub fn layout(&self) -> CbLayout {
        self.layout
    }

    /// 索引对应码矢量的能量, 索引超出码本时为 0
    pub fn energy(&self, index: usize) -> i64 {
        self.energies.get(index).copied().unwrap_or(0)
    }

    /// 把索引对应的码矢量写入 `out` (长度为码矢量长度), 索引超出码本时返回 `false`
    pub fn write_cb_vec(&self, index: usize, out: &mut [i32]) -> bool {
        let layout = self.layout;
        if index >= layout.total() {
            return false;
        }
        let (mem, idx) = if index < layout.base_size() {
            (&self.direct, index)
        } else {
            (&self.filtered, index - layout.base_size())
        };
        let lmem = layout.lmem;
        let len = layout.cbveclen;
        if idx < layout.main_len() {
            let lag = idx + len;
            out.copy_from_slice(&mem[lmem - lag..lmem - lag + len]);
        } else {
            let lag = idx - layout.main_len() + AUG_LAG_MIN;
            for (j, o) in out.iter_mut().enumerate() {
                *o = augmented_sample(lag, mem, j);
            }
        }
        true
    }

    /// 取出索引对应的码矢量, 索引超出码本时返回 `None`
    pub fn get_cb_vec(&self, index: usize) -> Option<Vec<i32>> {
        let mut v = vec![0i32; self.layout.cbveclen];
        self.write_cb_vec(index, &mut v).then_some(v)
    }
}

/// 一段 (直接或滤波) 内各码矢量的能量
///
/// 延迟每加一, 窗口前移一个采样: 加上新进入的最早采样, 减去移出的最晚采样.
fn section_energies(mem: &[i32], layout: CbLayout) -> Vec<i64> {
    let sq = |v: i32| v as i64 * v as i64;
    let lmem = layout.lmem;
    let len = layout.cbveclen;
    let mut out = Vec::with_capacity(layout.base_size());
    let mut energy: i64 = mem[lmem - len..].iter().map(|&v| sq(v)).sum();
    out.push(energy);
    for idx in 1..layout.main_len() {
        energy += sq(mem[lmem - idx - len]) - sq(mem[lmem - idx]);
        out.push(energy);
    }
    if layout.has_aug() {
        for lag in AUG_LAG_MIN..AUG_LAG_MIN + SUBL / 2 {
            out.push((0..len).map(|j| sq(augmented_sample(lag, mem, j))).sum());
        }
    }
    out
}

/// 记忆的 8 抽头 FIR 滤波, 两端补零
fn filter_memory(mem: &[i32]) -> Vec<i32> {
    let n = mem.len() as isize;
    let taps = CB_FILTER_Q14.len();
    (0..n)
        .map(|t| {
            let mut acc = 0i64;
            for j in 0..taps {
                let pos = t - (CB_HALFFILTERLEN as isize - 1) + j as isize;
                if (0..n).contains(&pos) {
                    acc += mem[pos as usize] as i64 * CB_FILTER_Q14[taps - 1 - j] as i64;
                }
            }
            ((acc + 8192) >> 14) as i32
        })
        .collect()
}

/// 延迟为 `lag` (< 码矢量长度) 的增强码矢量的第 `j` 个采样
///
/// 前 `lag` 个采样取记忆末尾的 `lag` 个采样, 其中最后 4 个与再早一个周期的采样线性过渡,
/// 其余部分周期重复. 所有读取都落在记忆之内.
fn augmented_sample(lag: usize, mem: &[i32], j: usize) -> i32 {
    let end = mem.len();
    let ilow = lag - AUG_INTERP_LEN;
    if j < ilow {
        mem[end - lag + j]
    } else if j < lag {
        let alpha = AUG_ALPHA_Q15[j - ilow] as i64;
        let recent = mem[end - lag + j] as i64;
        let older = mem[end - 2 * lag + j] as i64;
        (((32768 - alpha) * recent + alpha * older + 16384) >> 15) as i32
    } else {
        mem[end - 2 * lag + j]
    }
}

/// 增益反量化 (Q14)
///
/// 第 0 级直接查表; 后续各级为表值乘以上一级增益的绝对值.
pub fn gain_dequant(index: usize, prev_gain_q14: i32, stage: usize) -> i32 {
    let (table, scale): (&[i16], i32) = match stage {
        0 => (&GAIN_SQ5_Q14, 16384),
        1 => (&GAIN_SQ4_Q14, prev_gain_q14.abs()),
        _ => (&GAIN_SQ3_Q14, prev_gain_q14.abs()),
    };
    let t = table[index.min(table.len() - 1)] as i32;
    (t * scale + 8192) >> 14
}

/// 增益量化, 返回 (索引, 量化增益 Q14)
///
/// 后续各级只使用模值不超过 1.0 的表项, 保证各级增益的模值逐级不增.
pub fn gain_quant(gain_q14: i32, prev_gain_q14: i32, stage: usize) -> (usize, i32) {
    let table: &[i16] = match stage {
        0 => &GAIN_SQ5_Q14,
        1 => &GAIN_SQ4_Q14,
        _ => &GAIN_SQ3_Q14,
    };
    let mut best = (0usize, i32::MAX, 0i32);
    for (i, &t) in table.iter().enumerate() {
        if stage > 0 && (t as i32).abs() > 16384 {
            continue;
        }
        let value = gain_dequant(i, prev_gain_q14, stage);
        let dist = (gain_q14 - value).abs();
        if dist < best.1 {
            best = (i, dist, value);
        }
    }
    (best.0, best.2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilbc::{CB_MEML, ST_MEM_L};

    fn create_augmented_vec(lag: usize, mem: &[i32], cbveclen: usize) -> Vec<i32> {
        (0..cbveclen).map(|j| augmented_sample(lag, mem, j)).collect()
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| i as i16 * 10 + 1).collect()
    }

    #[test]
    fn test_layout_sizes() {
        let sub = CbLayout::new(CB_MEML, SUBL);
        assert_eq!(sub.main_len(), 108);
        assert_eq!(sub.base_size(), 128);
        assert_eq!(sub.total(), 256);
        let ext = CbLayout::new(ST_MEM_L, 23);
        assert!(!ext.has_aug());
        assert_eq!(ext.total(), 126);
        assert!(sub.is_legal(43, 44));
        assert!(!sub.is_legal(44, 44));
        assert!(sub.is_legal(110, 44));
        assert!(!sub.is_legal(128, 108));
    }

    #[test]
    fn test_main_vectors_are_memory_slices() {
        let mem = ramp(CB_MEML);
        let cb = CbMemory::new(&mem, SUBL);
        let v0 = cb.get_cb_vec(0).unwrap();
        assert_eq!(v0, mem[CB_MEML - 40..].iter().map(|&v| v as i32).collect::<Vec<_>>());
        let v5 = cb.get_cb_vec(5).unwrap();
        assert_eq!(v5[0], mem[CB_MEML - 45] as i32);
        assert!(cb.get_cb_vec(256).is_none());
    }

    #[test]
    fn test_precomputed_energies_match_vectors() {
        let mem: Vec<i16> = (0..CB_MEML).map(|i| ((i * 97) % 211) as i16 * 30 - 3000).collect();
        for len in [SUBL, 23] {
            let cb = CbMemory::new(&mem, len);
            for index in 0..cb.layout().total() {
                let v = cb.get_cb_vec(index).unwrap();
                let direct: i64 = v.iter().map(|&x| x as i64 * x as i64).sum();
                assert_eq!(cb.energy(index), direct, "len {len} index {index}");
            }
            assert_eq!(cb.energy(cb.layout().total()), 0);
        }
    }

    #[test]
    fn test_augmented_vector_periodic_tail() {
        let mem: Vec<i32> = ramp(CB_MEML).iter().map(|&v| v as i32).collect();
        let lag = 25;
        let v = create_augmented_vec(lag, &mem, SUBL);
        let end = mem.len();
        assert_eq!(v[0], mem[end - lag]);
        assert_eq!(v[lag - 5], mem[end - 5]);
        // 过渡后周期重复
        assert_eq!(v[lag], mem[end - lag]);
        assert_eq!(v[SUBL - 1], mem[end - 2 * lag + SUBL - 1]);
        // 过渡区介于两个周期之间
        let j = lag - 2;
        let (a, b) = (mem[end - lag + j], mem[end - 2 * lag + j]);
        assert!(v[j] <= a.max(b) && v[j] >= a.min(b));

        let cb = CbMemory::new(&ramp(CB_MEML), SUBL);
        assert_eq!(cb.get_cb_vec(108).unwrap(), create_augmented_vec(20, &mem, SUBL));
        assert_eq!(cb.get_cb_vec(127).unwrap(), create_augmented_vec(39, &mem, SUBL));
    }

    #[test]
    fn test_filtered_section_smooths_impulse() {
        let mut mem = vec![0i16; CB_MEML];
        mem[100] = 16384;
        let cb = CbMemory::new(&mem, SUBL);
        // 直接段与滤波段在相同延迟处对齐
        let direct = cb.get_cb_vec(10).unwrap();
        let filtered = cb.get_cb_vec(128 + 10).unwrap();
        let peak = direct.iter().position(|&v| v != 0).unwrap();
        let fpeak = filtered
            .iter()
            .enumerate()
            .max_by_key(|&(_, v)| v.abs())
            .map(|(i, _)| i)
            .unwrap();
        assert!(peak.abs_diff(fpeak) <= 1);
        assert!(filtered.iter().filter(|&&v| v != 0).count() >= 6);
    }

    #[test]
    fn test_gain_quantization_is_monotone() {
        let (i0, g0) = gain_quant(12000, 0, 0);
        assert_eq!(gain_dequant(i0, 0, 0), g0);
        assert!((g0 - 12000).abs() < 400);
        let (i1, g1) = gain_quant(-20000, g0, 1);
        assert!(g1.abs() <= g0.abs());
        assert_eq!(gain_dequant(i1, g0, 1), g1);
        let (_, g2) = gain_quant(50000, g1, 2);
        assert!(g2.abs() <= g1.abs());
    }
}
