//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 向缓冲区写入参数字段, 与 [`crate::bitreader::BitReader`] 对应.

/// 比特流写入器
///
/// # 示例
/// ```
/// use tao_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_bits(0b0001_0101_0101, 12);
/// assert_eq!(bw.finish(), vec![0b1011_0001, 0b0101_0101]);
/// ```
#[derive(Debug, Default)]
pub struct BitWriter {
    /// 输出缓冲区 (最后一个字节可能未填满)
    data: Vec<u8>,
    /// 已写入的位数
    bit_len: usize,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定字节容量创建
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// 已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.bit_len
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit & 1 != 0 {
            let last = self.data.len() - 1;
            self.data[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    /// 写入值的低 N 位 (最多 32 位), 高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in (0..n.min(32)).rev() {
            self.write_bit((value >> i) & 1);
        }
    }

    /// 用 0 填充到指定位数
    pub fn pad_to(&mut self, total_bits: usize) {
        while self.bit_len < total_bits {
            self.write_bit(0);
        }
    }

    /// 完成写入, 返回字节数据 (末尾不足一字节的部分补 0)
    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_then_read_fields() {
        let fields = [(5u32, 3u32), (100, 7), (0, 1), (63, 6), (1, 1)];
        let mut bw = BitWriter::new();
        for &(v, n) in &fields {
            bw.write_bits(v, n);
        }
        assert_eq!(bw.bits_written(), 18);
        let data = bw.finish();
        assert_eq!(data.len(), 3);

        let mut br = BitReader::new(&data);
        for &(v, n) in &fields {
            assert_eq!(br.read_bits(n).unwrap(), v);
        }
    }

    #[test]
    fn test_pad_to_fixed_frame() {
        let mut bw = BitWriter::with_capacity(38);
        bw.write_bits(0x3FF, 10);
        bw.pad_to(304);
        assert_eq!(bw.bits_written(), 304);
        let data = bw.finish();
        assert_eq!(data.len(), 38);
        assert_eq!(data[0], 0xFF);
        assert_eq!(data[1], 0xC0);
        assert!(data[2..].iter().all(|&b| b == 0));
    }
}
