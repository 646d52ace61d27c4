//! 单声道采样向量.

use std::ops::{Index, IndexMut};

/// 单声道 i16 采样序列
///
/// 越界的位置参数会被截断到当前长度, 与 NetEq 各组件的用法一致.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioVector {
    data: Vec<i16>,
}

impl AudioVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建指定长度的静音向量
    pub fn with_size(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    pub fn from_slice(samples: &[i16]) -> Self {
        Self {
            data: samples.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.data
    }

    /// 从 `position` 起复制 `length` 个采样到 `dst`, 返回实际复制数
    pub fn copy_to(&self, length: usize, position: usize, dst: &mut [i16]) -> usize {
        let position = position.min(self.data.len());
        let n = length.min(self.data.len() - position).min(dst.len());
        dst[..n].copy_from_slice(&self.data[position..position + n]);
        n
    }

    pub fn push_front(&mut self, samples: &[i16]) {
        self.data.splice(0..0, samples.iter().copied());
    }

    pub fn push_back(&mut self, samples: &[i16]) {
        self.data.extend_from_slice(samples);
    }

    /// 追加 `other[position..position+length]`
    pub fn push_back_from(&mut self, other: &AudioVector, length: usize, position: usize) {
        let position = position.min(other.len());
        let end = (position + length).min(other.len());
        self.data.extend_from_slice(&other.data[position..end]);
    }

    pub fn pop_front(&mut self, length: usize) {
        let n = length.min(self.data.len());
        self.data.drain(..n);
    }

    pub fn pop_back(&mut self, length: usize) {
        let n = length.min(self.data.len());
        self.data.truncate(self.data.len() - n);
    }

    /// 在末尾追加 `extra` 个零
    pub fn extend(&mut self, extra: usize) {
        self.data.resize(self.data.len() + extra, 0);
    }

    pub fn insert_at(&mut self, samples: &[i16], position: usize) {
        let position = position.min(self.data.len());
        self.data.splice(position..position, samples.iter().copied());
    }

    pub fn insert_zeros_at(&mut self, length: usize, position: usize) {
        let position = position.min(self.data.len());
        self.data
            .splice(position..position, std::iter::repeat_n(0, length));
    }

    /// 从 `position` 起覆盖写入, 超出当前长度的部分追加到末尾
    pub fn overwrite_at(&mut self, samples: &[i16], position: usize) {
        let position = position.min(self.data.len());
        let end = position + samples.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[position..end].copy_from_slice(samples);
    }

    /// 把 `append` 的前 `fade_length` 个采样与本向量末尾交叉淡化, 其余部分追加
    ///
    /// 混合系数为 Q14, 每步递减 `16384 / (fade_length + 1)`.
    pub fn cross_fade(&mut self, append: &[i16], fade_length: usize) {
        let fade_length = fade_length.min(self.data.len()).min(append.len());
        let position = self.data.len() - fade_length;
        let alpha_step = 16384 / (fade_length as i32 + 1);
        let mut alpha = 16384i32;
        for (i, &new) in append[..fade_length].iter().enumerate() {
            alpha -= alpha_step;
            let old = self.data[position + i] as i32;
            self.data[position + i] =
                ((alpha * old + (16384 - alpha) * new as i32 + 8192) >> 14) as i16;
        }
        self.data.extend_from_slice(&append[fade_length..]);
    }
}

impl Index<usize> for AudioVector {
    type Output = i16;

    fn index(&self, index: usize) -> &i16 {
        &self.data[index]
    }
}

impl IndexMut<usize> for AudioVector {
    fn index_mut(&mut self, index: usize) -> &mut i16 {
        &mut self.data[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop() {
        let mut v = AudioVector::from_slice(&[1, 2, 3]);
        v.push_front(&[-1, 0]);
        v.push_back(&[4]);
        assert_eq!(v.as_slice(), &[-1, 0, 1, 2, 3, 4]);
        v.pop_front(2);
        v.pop_back(1);
        assert_eq!(v.as_slice(), &[1, 2, 3]);
        v.pop_back(10);
        assert!(v.is_empty());
    }

    #[test]
    fn test_insert_and_overwrite() {
        let mut v = AudioVector::from_slice(&[1, 2, 3]);
        v.insert_zeros_at(2, 1);
        assert_eq!(v.as_slice(), &[1, 0, 0, 2, 3]);
        v.insert_at(&[9, 9], 100);
        assert_eq!(v.len(), 7);
        v.overwrite_at(&[7, 7, 7], 5);
        assert_eq!(v.as_slice(), &[1, 0, 0, 2, 3, 7, 7, 7]);
        v.extend(2);
        assert_eq!(v.len(), 10);
        assert_eq!(v[9], 0);
    }

    #[test]
    fn test_copy_to_clamps() {
        let v = AudioVector::from_slice(&[1, 2, 3, 4]);
        let mut dst = [0i16; 4];
        assert_eq!(v.copy_to(10, 2, &mut dst), 2);
        assert_eq!(&dst[..2], &[3, 4]);
    }

    #[test]
    fn test_cross_fade_ramps_toward_new_signal() {
        let mut v = AudioVector::from_slice(&[1000; 10]);
        v.cross_fade(&[0; 8], 5);
        assert_eq!(v.len(), 13);
        let faded = &v.as_slice()[5..10];
        assert!(faded.windows(2).all(|w| w[0] > w[1]));
        assert!(faded[0] < 1000 && faded[4] > 0);
        assert!(v.as_slice()[10..].iter().all(|&s| s == 0));
    }
}
