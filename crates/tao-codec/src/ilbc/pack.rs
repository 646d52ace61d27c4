//! 帧参数的比特打包与解包.
//!
//! 参数按差错保护等级 (ULP) 分 3 类依次写出: 每个字段的高位先进入较重要的类别,
//! 低位留到后面的类别. 三类写完后补零, 最后一位是空帧标志 (0 表示有效帧).

use tao_core::bitreader::BitReader;
use tao_core::bitwriter::BitWriter;
use tao_core::{TaoError, TaoResult};

use super::tables::LSF_BITS_CB;
use super::{CB_INDEX_LEN, CB_NSTAGES, IlbcMode};

/// 扩展块各级码本索引位宽
const EXT_CB_BITS: [u32; CB_NSTAGES] = [7, 7, 7];
/// 第一个自适应子帧各级码本索引位宽 (后两级经 IndexConv 压缩)
const FIRST_SUB_CB_BITS: [u32; CB_NSTAGES] = [8, 7, 7];
/// 其余自适应子帧各级码本索引位宽
const SUB_CB_BITS: [u32; CB_NSTAGES] = [8, 8, 8];
/// 各级增益索引位宽
const GAIN_BITS: [u32; CB_NSTAGES] = [5, 4, 3];

/// 一帧的全部量化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBits {
    /// LSF 分裂矢量量化索引, 每组 3 个
    pub lsf: Vec<usize>,
    /// 起始状态位置 (从 1 开始)
    pub start_idx: usize,
    /// 标量量化部分位于起始状态的前部
    pub state_first: bool,
    /// 起始状态最大幅度索引
    pub idx_for_max: usize,
    /// 起始状态各采样的 3 bit 索引
    pub idx_vec: Vec<u8>,
    /// 码本索引, `[块 * 3 + 级]`, 块 0 为扩展块
    pub cb_index: [usize; CB_INDEX_LEN],
    /// 增益索引, 布局同 `cb_index`
    pub gain_index: [usize; CB_INDEX_LEN],
}

/// 一个字段: 取值与三个类别中各占的位数 (高位在前)
struct Field {
    value: u32,
    split: [u32; 3],
}

impl Field {
    fn class(value: usize, bits: u32, class: usize) -> Self {
        let mut split = [0; 3];
        split[class] = bits;
        Self {
            value: value as u32,
            split,
        }
    }

    fn bits(&self) -> u32 {
        self.split.iter().sum()
    }

    /// 第 `class` 类中该字段对应的位
    fn part(&self, class: usize) -> u32 {
        let below: u32 = self.split[class + 1..].iter().sum();
        (self.value >> below) & ((1u32 << self.split[class]) - 1)
    }
}

impl FrameBits {
    /// 全零参数的帧骨架
    pub fn empty(mode: IlbcMode) -> Self {
        Self {
            lsf: vec![0; 3 * mode.lpc_n()],
            start_idx: 1,
            state_first: false,
            idx_for_max: 0,
            idx_vec: vec![0; mode.state_short_len()],
            cb_index: [0; CB_INDEX_LEN],
            gain_index: [0; CB_INDEX_LEN],
        }
    }

    /// 按固定顺序列出全部字段
    fn fields(&self, mode: IlbcMode) -> Vec<Field> {
        let mut fields = Vec::with_capacity(128);
        for (i, &idx) in self.lsf.iter().enumerate() {
            fields.push(Field::class(idx, LSF_BITS_CB[i % 3], 0));
        }
        fields.push(Field::class(self.start_idx, mode.start_idx_bits(), 0));
        fields.push(Field::class(usize::from(self.state_first), 1, 0));
        fields.push(Field::class(self.idx_for_max, 6, 0));
        for &v in &self.idx_vec {
            fields.push(Field {
                value: u32::from(v),
                split: [0, 1, 2],
            });
        }
        for block in 0..=mode.nasub() {
            let cb_bits = match block {
                0 => EXT_CB_BITS,
                1 => FIRST_SUB_CB_BITS,
                _ => SUB_CB_BITS,
            };
            // 扩展块第一级归入第 2 类, 其余归入第 3 类
            for stage in 0..CB_NSTAGES {
                let class = if block == 0 && stage == 0 { 1 } else { 2 };
                fields.push(Field::class(
                    self.cb_index[block * CB_NSTAGES + stage],
                    cb_bits[stage],
                    class,
                ));
            }
            for stage in 0..CB_NSTAGES {
                let class = if block == 0 && stage == 0 { 1 } else { 2 };
                fields.push(Field::class(
                    self.gain_index[block * CB_NSTAGES + stage],
                    GAIN_BITS[stage],
                    class,
                ));
            }
        }
        fields
    }

    /// 把字段取值按相同顺序写回
    fn assign(&mut self, mode: IlbcMode, values: &[u32]) {
        let mut it = values.iter().map(|&v| v as usize);
        let mut next = || it.next().unwrap_or(0);
        for v in self.lsf.iter_mut() {
            *v = next();
        }
        self.start_idx = next();
        self.state_first = next() != 0;
        self.idx_for_max = next();
        for v in self.idx_vec.iter_mut() {
            *v = next() as u8;
        }
        for block in 0..=mode.nasub() {
            for stage in 0..CB_NSTAGES {
                self.cb_index[block * CB_NSTAGES + stage] = next();
            }
            for stage in 0..CB_NSTAGES {
                self.gain_index[block * CB_NSTAGES + stage] = next();
            }
        }
    }

    /// 打包为一帧码流 (38 或 50 字节)
    pub fn pack(&self, mode: IlbcMode) -> Vec<u8> {
        let fields = self.fields(mode);
        let mut bw = BitWriter::with_capacity(mode.bytes());
        for class in 0..3 {
            for f in fields.iter().filter(|f| f.split[class] > 0) {
                bw.write_bits(f.part(class), f.split[class]);
            }
        }
        bw.pad_to(mode.bits() - 1);
        bw.write_bit(0);
        bw.finish()
    }

    /// 从一帧码流解包并校验
    ///
    /// 空帧标志为 1 或起始状态位置非法时返回 `InvalidData`, 调用方应改走丢包隐藏.
    pub fn unpack(mode: IlbcMode, data: &[u8]) -> TaoResult<Self> {
        if data.len() != mode.bytes() {
            return Err(TaoError::InvalidData(format!(
                "iLBC {} 帧应为 {} 字节, 实际 {} 字节",
                mode,
                mode.bytes(),
                data.len()
            )));
        }
        let mut br = BitReader::new(data);
        if br.last_bit() != Some(0) {
            return Err(TaoError::InvalidData("空帧标志已置位".into()));
        }

        let mut frame = Self::empty(mode);
        let fields = frame.fields(mode);
        let mut values = vec![0u32; fields.len()];
        for class in 0..3 {
            for (f, v) in fields.iter().zip(values.iter_mut()) {
                if f.split[class] > 0 {
                    let part = br.read_bits(f.split[class])?;
                    *v = (*v << f.split[class]) | part;
                }
            }
        }
        debug_assert!(fields.iter().map(Field::bits).sum::<u32>() < mode.bits() as u32);
        frame.assign(mode, &values);

        if frame.start_idx == 0 || frame.start_idx > mode.max_start_idx() {
            return Err(TaoError::InvalidData(format!(
                "起始状态位置 {} 超出范围 1..={}",
                frame.start_idx,
                mode.max_start_idx()
            )));
        }
        Ok(frame)
    }

    /// 参数占用的有效比特数 (不含补零与空帧标志)
    pub fn payload_bits(mode: IlbcMode) -> u32 {
        Self::empty(mode).fields(mode).iter().map(Field::bits).sum()
    }
}
