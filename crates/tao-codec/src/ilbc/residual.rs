//! 残差块的遍历顺序.
//!
//! 以起始状态为中心, 先补齐起始状态所在两个子帧中未标量量化的部分 (扩展块),
//! 再向后逐子帧推进, 最后在时间反转域内向前逐子帧推进.
//! 编码端与解码端共用同一遍历, 区别只在每个块如何得到重建值.

use super::cb::{cb_construct, cb_search};
use super::{CB_MEML, CB_NSTAGES, IlbcMode, LPC_COEF_LEN, ST_MEM_L, STATE_LEN, SUBL};

/// 单个码本块的编码或重建
pub trait BlockCoder {
    /// 处理第 `block` 块 (0 为扩展块), 返回重建的残差
    ///
    /// `target` 为原始残差 (解码端为全零, 只用到长度), `mem` 为码本记忆,
    /// `weight` 为该块的感知加权滤波器系数.
    fn code_block(&mut self, block: usize, target: &[i16], mem: &[i16], weight: &[i16]) -> Vec<i16>;
}

/// 编码端: 搜索后按所选索引重建
pub struct SearchCoder<'a> {
    pub cb_index: &'a mut [usize],
    pub gain_index: &'a mut [usize],
}

impl BlockCoder for SearchCoder<'_> {
    fn code_block(&mut self, block: usize, target: &[i16], mem: &[i16], weight: &[i16]) -> Vec<i16> {
        let (idx, gains) = cb_search(target, mem, weight, block);
        let range = block * CB_NSTAGES..(block + 1) * CB_NSTAGES;
        self.cb_index[range.clone()].copy_from_slice(&idx);
        self.gain_index[range].copy_from_slice(&gains);
        cb_construct(&idx, &gains, mem, target.len())
    }
}

/// 解码端: 直接按码流中的索引重建
pub struct ConstructCoder<'a> {
    pub cb_index: &'a [usize],
    pub gain_index: &'a [usize],
}

impl BlockCoder for ConstructCoder<'_> {
    fn code_block(&mut self, block: usize, target: &[i16], mem: &[i16], _weight: &[i16]) -> Vec<i16> {
        let range = block * CB_NSTAGES..(block + 1) * CB_NSTAGES;
        cb_construct(
            &self.cb_index[range.clone()],
            &self.gain_index[range],
            mem,
            target.len(),
        )
    }
}

fn reversed(x: &[i16]) -> Vec<i16> {
    x.iter().rev().copied().collect()
}

/// 在 `CB_MEML` 长度的记忆末尾放入 `src` (超长时取末尾), 前部补零
fn fill_memory(mem: &mut [i16], src: &[i16]) {
    let n = src.len().min(mem.len());
    let split = mem.len() - n;
    mem[..split].fill(0);
    mem[split..].copy_from_slice(&src[src.len() - n..]);
}

/// 左移记忆并追加新块
fn push_memory(mem: &mut [i16], block: &[i16]) {
    let n = block.len();
    mem.copy_within(n.., 0);
    let len = mem.len();
    mem[len - n..].copy_from_slice(block);
}

/// 遍历整帧残差, 返回重建残差
///
/// - `start_idx`: 起始状态位置 (从 1 开始)
/// - `state`: 已重建的标量量化起始状态
/// - `residual`: 原始残差 (解码端为全零)
/// - `weight`: 各子帧感知加权滤波器系数, 每子帧 11 个
pub fn walk_residual<C: BlockCoder>(
    mode: IlbcMode,
    coder: &mut C,
    start_idx: usize,
    state_first: bool,
    state: &[i16],
    residual: &[i16],
    weight: &[i16],
) -> Vec<i16> {
    let nsub = mode.nsub();
    let short = state.len();
    let diff = STATE_LEN - short;
    let sub_weight = |k: usize| &weight[k * LPC_COEF_LEN..(k + 1) * LPC_COEF_LEN];
    let state_begin = (start_idx - 1) * SUBL;
    let start_pos = state_begin + if state_first { 0 } else { diff };

    let mut decres = vec![0i16; mode.block_len()];
    decres[start_pos..start_pos + short].copy_from_slice(state);

    // 扩展块: 补齐起始状态两个子帧中剩余的 diff 个采样
    let mut mem = vec![0i16; ST_MEM_L];
    if state_first {
        let range = start_pos + short..start_pos + short + diff;
        fill_memory(&mut mem, state);
        let out = coder.code_block(0, &residual[range.clone()], &mem, sub_weight(start_idx));
        decres[range].copy_from_slice(&out);
    } else {
        let range = state_begin..state_begin + diff;
        fill_memory(&mut mem, &reversed(state));
        let target = reversed(&residual[range.clone()]);
        let out = coder.code_block(0, &target, &mem, sub_weight(start_idx - 1));
        decres[range].copy_from_slice(&reversed(&out));
    }

    let mut block = 1;

    // 向后: 起始状态之后的子帧
    let nfor = nsub - start_idx - 1;
    if nfor > 0 {
        let mut mem = vec![0i16; CB_MEML];
        fill_memory(&mut mem, &decres[state_begin..state_begin + STATE_LEN]);
        for sf in 0..nfor {
            let sub = start_idx + 1 + sf;
            let range = sub * SUBL..(sub + 1) * SUBL;
            let out = coder.code_block(block, &residual[range.clone()], &mem, sub_weight(sub));
            decres[range].copy_from_slice(&out);
            push_memory(&mut mem, &out);
            block += 1;
        }
    }

    // 向前: 起始状态之前的子帧, 在时间反转域内处理
    let nback = start_idx - 1;
    if nback > 0 {
        let mut mem = vec![0i16; CB_MEML];
        let gotten = (SUBL * (nsub + 1 - start_idx)).min(CB_MEML);
        fill_memory(&mut mem, &reversed(&decres[state_begin..state_begin + gotten]));
        for sf in 0..nback {
            let sub = start_idx - 2 - sf;
            let range = sub * SUBL..(sub + 1) * SUBL;
            let target = reversed(&residual[range.clone()]);
            let out = coder.code_block(block, &target, &mem, sub_weight(sub));
            decres[range].copy_from_slice(&reversed(&out));
            push_memory(&mut mem, &out);
            block += 1;
        }
    }

    debug_assert_eq!(block, mode.nasub() + 1);
    decres
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 记录调用顺序, 返回填满块序号的向量
    struct Recorder {
        calls: Vec<(usize, usize, usize)>,
    }

    impl BlockCoder for Recorder {
        fn code_block(&mut self, block: usize, target: &[i16], mem: &[i16], _w: &[i16]) -> Vec<i16> {
            self.calls.push((block, target.len(), mem.len()));
            vec![100 + block as i16; target.len()]
        }
    }

    #[test]
    fn test_walk_covers_every_sample() {
        for mode in [IlbcMode::Ms20, IlbcMode::Ms30] {
            let weight = vec![0i16; mode.nsub() * LPC_COEF_LEN];
            for start in 1..=mode.max_start_idx() {
                for first in [true, false] {
                    let state = vec![7i16; mode.state_short_len()];
                    let mut rec = Recorder { calls: Vec::new() };
                    let res = vec![0i16; mode.block_len()];
                    let out = walk_residual(mode, &mut rec, start, first, &state, &res, &weight);
                    assert_eq!(rec.calls.len(), mode.nasub() + 1);
                    assert!(out.iter().all(|&v| v != 0), "start {start} first {first}");
                    assert_eq!(out.iter().filter(|&&v| v == 7).count(), state.len());
                    assert_eq!(rec.calls[0].2, ST_MEM_L);
                    assert_eq!(rec.calls[0].1, STATE_LEN - state.len());
                }
            }
        }
    }

    #[test]
    fn test_block_order_forward_then_backward() {
        let mode = IlbcMode::Ms30;
        let weight = vec![0i16; mode.nsub() * LPC_COEF_LEN];
        let state = vec![7i16; mode.state_short_len()];
        let mut rec = Recorder { calls: Vec::new() };
        let out = walk_residual(mode, &mut rec, 3, true, &state, &[0; 240], &weight);
        // 起始状态占子帧 2, 3; 子帧 4, 5 向后, 子帧 1, 0 向前
        assert_eq!(out[4 * SUBL], 101);
        assert_eq!(out[5 * SUBL], 102);
        assert_eq!(out[SUBL], 103);
        assert_eq!(out[0], 104);
    }
}
