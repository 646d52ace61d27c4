//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从定长语音帧中读取各参数字段.

use crate::{TaoError, TaoResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use tao_core::bitreader::BitReader;
///
/// let data = [0b1011_0001, 0b0101_0101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(12).unwrap(), 0b0001_0101_0101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 已读取的位数
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.pos
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> TaoResult<u32> {
        if self.bits_left() == 0 {
            return Err(TaoError::Eof);
        }
        let byte = self.data[self.pos / 8];
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(u32::from(bit))
    }

    /// 读取 N 个位 (最多 32 位), 返回值的低 N 位有效
    pub fn read_bits(&mut self, n: u32) -> TaoResult<u32> {
        if n > 32 {
            return Err(TaoError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(TaoError::Eof);
        }
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> TaoResult<()> {
        if n > self.bits_left() {
            return Err(TaoError::Eof);
        }
        self.pos += n;
        Ok(())
    }

    /// 读取帧的最后一位 (不移动位置)
    pub fn last_bit(&self) -> Option<u32> {
        let last = *self.data.last()?;
        Some(u32::from(last & 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fields_across_bytes() {
        let data = [0b1101_0110, 0b0011_1100];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(3).unwrap(), 0b110);
        assert_eq!(br.read_bits(7).unwrap(), 0b101_1000);
        assert_eq!(br.bits_read(), 10);
        assert_eq!(br.bits_left(), 6);
        assert_eq!(br.read_bits(6).unwrap(), 0b11_1100);
        assert_eq!(br.bits_left(), 0);
    }

    #[test]
    fn test_read_zero_bits() {
        let data = [0xFF];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(0).unwrap(), 0);
        assert_eq!(br.bits_read(), 0);
    }

    #[test]
    fn test_eof_and_skip() {
        let data = [0x0F];
        let mut br = BitReader::new(&data);
        br.skip_bits(4).unwrap();
        assert_eq!(br.read_bits(4).unwrap(), 0xF);
        assert!(matches!(br.read_bit(), Err(TaoError::Eof)));
        assert!(br.skip_bits(1).is_err());
        assert!(matches!(br.read_bits(33), Err(TaoError::InvalidArgument(_))));
    }

    #[test]
    fn test_last_bit() {
        assert_eq!(BitReader::new(&[0x00, 0x01]).last_bit(), Some(1));
        assert_eq!(BitReader::new(&[0x01, 0x00]).last_bit(), Some(0));
        assert_eq!(BitReader::new(&[]).last_bit(), None);
    }
}
