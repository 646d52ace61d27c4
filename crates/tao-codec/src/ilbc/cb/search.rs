//! 3 级码本搜索.
//!
//! 目标向量与码本记忆一起经感知加权滤波器 `1/W(z)` 滤波, 在加权域中逐级做匹配追踪:
//! 每一级先在直接段全范围粗搜, 再在滤波段中以粗搜结果为中心的窗口内细搜,
//! 选出最大化 `corr² / energy` 的码矢量, 量化增益后从目标中减去其贡献.

use log::trace;
use tao_core::spl::sat_w32;

use super::{CbMemory, gain_quant};
use crate::ilbc::tables::{CB_SEARCH_RANGE, GAIN_SQ5_Q14};
use crate::ilbc::{CB_NSTAGES, LPC_FILTERORDER};

/// 滤波段细搜窗口宽度
const CB_RESRANGE: usize = 34;
/// 增益上限 1.3 (Q14)
const CB_MAXGAIN_Q14: i64 = 21299;

/// 一个候选码矢量的匹配度量
#[derive(Clone, Copy)]
struct Candidate {
    index: usize,
    corr: i64,
    energy: i64,
}

impl Candidate {
    /// `corr² / energy` 更大者更优, 用交叉相乘精确比较
    fn beats(&self, other: &Candidate) -> bool {
        let lhs = self.corr as i128 * self.corr as i128 * other.energy as i128;
        let rhs = other.corr as i128 * other.corr as i128 * self.energy as i128;
        lhs > rhs
    }
}

/// 记忆与目标拼接后经 `1/W(z)` 滤波 (零初始状态)
fn weight_filter(mem: &[i16], target: &[i16], weight: &[i16]) -> Vec<i32> {
    let order = LPC_FILTERORDER;
    let total = mem.len() + target.len();
    let mut out = vec![0i32; order + total];
    for (n, &x) in mem.iter().chain(target).enumerate() {
        let pos = order + n;
        let mut acc = (x as i64) << 12;
        for k in 1..=order {
            acc -= weight[k] as i64 * out[pos - k] as i64;
        }
        out[pos] = sat_w32((acc + 2048) >> 12);
    }
    out.split_off(order)
}

/// 评估一个候选, 能量取自预先算好的表, `scratch` 用于取码矢量
fn evaluate(
    cb: &CbMemory,
    index: usize,
    target: &[i64],
    stage: usize,
    scratch: &mut [i32],
) -> Option<Candidate> {
    let energy = cb.energy(index);
    if energy == 0 || !cb.write_cb_vec(index, scratch) {
        return None;
    }
    let corr: i64 = scratch.iter().zip(target).map(|(&x, &t)| x as i64 * t).sum();
    // 第一级只接受正相关
    if stage == 0 && corr <= 0 {
        return None;
    }
    Some(Candidate {
        index,
        corr,
        energy,
    })
}

fn consider(best: &mut Option<Candidate>, cand: Option<Candidate>) {
    if let Some(c) = cand {
        if best.as_ref().is_none_or(|b| c.beats(b)) {
            *best = Some(c);
        }
    }
}

/// 码本搜索
///
/// - `target`: 待编码的残差块 (已按需时间反转)
/// - `mem`: 码本记忆
/// - `weight`: 本块的感知加权滤波器系数
/// - `block`: 块序号, 0 为起始状态扩展块, 之后为各自适应子帧
///
/// 返回 (码本索引, 增益索引), 码本索引为未经 IndexConvEnc 的原始值.
pub fn cb_search(
    target: &[i16],
    mem: &[i16],
    weight: &[i16],
    block: usize,
) -> ([usize; CB_NSTAGES], [usize; CB_NSTAGES]) {
    let lmem = mem.len();
    let len = target.len();
    let weighted = weight_filter(mem, target, weight);
    let cb = CbMemory::new(&weighted[..lmem], len);
    let layout = cb.layout();
    let base = layout.base_size();
    let ranges = CB_SEARCH_RANGE[block.min(CB_SEARCH_RANGE.len() - 1)];

    let orig_target: Vec<i64> = weighted[lmem..].iter().map(|&v| v as i64).collect();
    let mut remaining = orig_target.clone();
    let mut coded = vec![0i64; len];
    let mut indices = [0usize; CB_NSTAGES];
    let mut gain_indices = [0usize; CB_NSTAGES];
    let mut prev_gain = 0i32;
    let mut scratch = vec![0i32; len];

    for stage in 0..CB_NSTAGES {
        let range = ranges[stage];
        let mut best = None;
        for i in (0..base).filter(|&i| layout.is_legal(i, range)) {
            consider(&mut best, evaluate(&cb, i, &remaining, stage, &mut scratch));
        }
        let center = best.as_ref().map_or(0, |b: &Candidate| b.index);
        let lo = center.saturating_sub(CB_RESRANGE / 2);
        let hi = (center + CB_RESRANGE / 2).min(base - 1);
        for i in (lo..=hi).filter(|&i| layout.is_legal(i, range)) {
            consider(&mut best, evaluate(&cb, base + i, &remaining, stage, &mut scratch));
        }

        let (index, gain) = match best {
            Some(b) => {
                let g = (b.corr << 14) / b.energy;
                let g = if stage == 0 {
                    g.clamp(0, CB_MAXGAIN_Q14)
                } else {
                    g.clamp(-CB_MAXGAIN_Q14, CB_MAXGAIN_Q14)
                };
                (b.index, g as i32)
            }
            None => (0, 0),
        };
        let (gain_index, gain_q14) = gain_quant(gain, prev_gain, stage);
        indices[stage] = index;
        gain_indices[stage] = gain_index;
        prev_gain = gain_q14;

        if cb.write_cb_vec(index, &mut scratch) {
            for ((r, c), &x) in remaining.iter_mut().zip(coded.iter_mut()).zip(&scratch) {
                let contrib = (gain_q14 as i64 * x as i64 + 8192) >> 14;
                *r -= contrib;
                *c += contrib;
            }
        }
    }

    // 能量匹配: 在不超过目标能量且不超过两倍原增益的前提下尽量增大第一级增益
    let target_energy: i128 = orig_target.iter().map(|&v| v as i128 * v as i128).sum();
    let coded_energy: i128 = coded.iter().map(|&v| v as i128 * v as i128).sum();
    let orig = gain_indices[0];
    let g_orig = GAIN_SQ5_Q14[orig] as i128;
    let mut chosen = orig;
    for (i, &g) in GAIN_SQ5_Q14.iter().enumerate().skip(orig) {
        let g = g as i128;
        if coded_energy * g * g < target_energy * g_orig * g_orig && g < 2 * g_orig {
            chosen = i;
        }
    }
    if chosen != orig {
        trace!("码本块 {} 第一级增益索引 {} -> {}", block, orig, chosen);
        gain_indices[0] = chosen;
    }

    (indices, gain_indices)
}
