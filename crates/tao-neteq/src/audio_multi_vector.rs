//! 多声道采样向量.
//!
//! 每个声道一个 [`AudioVector`], 所有声道长度保持一致. 与外部交换数据时使用
//! 交错格式 (L R L R ...).

use std::ops::{Index, IndexMut};

use crate::audio_vector::AudioVector;

/// 多声道 i16 采样容器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMultiVector {
    channels: Vec<AudioVector>,
}

impl AudioMultiVector {
    /// 创建空容器, 声道数至少为 1
    pub fn new(num_channels: usize) -> Self {
        Self::with_size(num_channels, 0)
    }

    /// 创建每声道 `len` 个零采样的容器
    pub fn with_size(num_channels: usize, len: usize) -> Self {
        let n = num_channels.max(1);
        Self {
            channels: (0..n).map(|_| AudioVector::with_size(len)).collect(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// 每声道采样数
    pub fn size(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&mut self) {
        self.channels.iter_mut().for_each(AudioVector::clear);
    }

    /// 清空后填入每声道 `len` 个零
    pub fn zeros(&mut self, len: usize) {
        for ch in &mut self.channels {
            *ch = AudioVector::with_size(len);
        }
    }

    /// 追加交错采样, 尾部不足一组的采样被丢弃
    pub fn push_back_interleaved(&mut self, samples: &[i16]) {
        let n = self.channels.len();
        let per_channel = samples.len() / n;
        for (c, ch) in self.channels.iter_mut().enumerate() {
            let deinterleaved: Vec<i16> = (0..per_channel).map(|i| samples[i * n + c]).collect();
            ch.push_back(&deinterleaved);
        }
    }

    /// 追加另一个容器的全部采样 (声道数必须相同)
    pub fn push_back(&mut self, other: &AudioMultiVector) {
        debug_assert_eq!(self.channels(), other.channels());
        for (ch, src) in self.channels.iter_mut().zip(&other.channels) {
            ch.push_back(src.as_slice());
        }
    }

    /// 追加 `other[index..]`
    pub fn push_back_from_index(&mut self, other: &AudioMultiVector, index: usize) {
        let length = other.size().saturating_sub(index);
        for (ch, src) in self.channels.iter_mut().zip(&other.channels) {
            ch.push_back_from(src, length, index);
        }
    }

    pub fn push_front(&mut self, other: &AudioMultiVector) {
        for (ch, src) in self.channels.iter_mut().zip(&other.channels) {
            ch.push_front(src.as_slice());
        }
    }

    pub fn pop_front(&mut self, length: usize) {
        self.channels.iter_mut().for_each(|ch| ch.pop_front(length));
    }

    pub fn pop_back(&mut self, length: usize) {
        self.channels.iter_mut().for_each(|ch| ch.pop_back(length));
    }

    /// 每声道末尾追加 `extra` 个零
    pub fn extend(&mut self, extra: usize) {
        self.channels.iter_mut().for_each(|ch| ch.extend(extra));
    }

    /// 保证每声道至少有 `required` 个采样, 不足时补零
    pub fn ensure_size(&mut self, required: usize) {
        let size = self.size();
        if size < required {
            self.extend(required - size);
        }
    }

    /// 从 `start` 起读取 `length` 组交错采样到 `dst`, 返回实际读取的组数
    pub fn read_interleaved_from_index(&self, start: usize, length: usize, dst: &mut [i16]) -> usize {
        let n = self.channels.len();
        let start = start.min(self.size());
        let length = length.min(self.size() - start).min(dst.len() / n);
        for i in 0..length {
            for (c, ch) in self.channels.iter().enumerate() {
                dst[i * n + c] = ch[start + i];
            }
        }
        length
    }

    /// 从开头读取交错采样
    pub fn read_interleaved(&self, length: usize, dst: &mut [i16]) -> usize {
        self.read_interleaved_from_index(0, length, dst)
    }

    /// 读取末尾 `length` 组交错采样
    pub fn read_interleaved_from_end(&self, length: usize, dst: &mut [i16]) -> usize {
        let length = length.min(self.size());
        self.read_interleaved_from_index(self.size() - length, length, dst)
    }

    /// 用 `other` 的前 `length` 个采样覆盖 `position` 起的内容
    pub fn overwrite_at(&mut self, other: &AudioMultiVector, length: usize, position: usize) {
        let length = length.min(other.size());
        for (ch, src) in self.channels.iter_mut().zip(&other.channels) {
            ch.overwrite_at(&src.as_slice()[..length], position);
        }
    }

    /// 逐声道交叉淡化追加, 见 [`AudioVector::cross_fade`]
    pub fn cross_fade(&mut self, append: &AudioMultiVector, fade_length: usize) {
        for (ch, src) in self.channels.iter_mut().zip(&append.channels) {
            ch.cross_fade(src.as_slice(), fade_length);
        }
    }

    /// 覆盖复制到 `dst`
    pub fn copy_to(&self, dst: &mut AudioMultiVector) {
        dst.channels.clone_from(&self.channels);
    }

    /// 把声道 `from` 的内容复制到声道 `to`
    pub fn copy_channel(&mut self, from: usize, to: usize) {
        if from != to && from < self.channels.len() && to < self.channels.len() {
            let src = self.channels[from].clone();
            self.channels[to] = src;
        }
    }
}

impl Index<usize> for AudioMultiVector {
    type Output = AudioVector;

    fn index(&self, channel: usize) -> &AudioVector {
        &self.channels[channel]
    }
}

impl IndexMut<usize> for AudioMultiVector {
    fn index_mut(&mut self, channel: usize) -> &mut AudioVector {
        &mut self.channels[channel]
    }
}
