//! 同步缓冲: 已播放历史与待播放采样共用的定长缓冲区.

use std::ops::{Deref, DerefMut};

use log::warn;
use tao_core::RtpTimestamp;

use crate::audio_multi_vector::AudioMultiVector;

/// 定长多声道缓冲
///
/// `next_index` 之前为已输出的历史 (供 Expand/Merge 分析), 之后为尚未输出的
/// "未来" 采样. 追加新采样时从头部丢弃同样数量的最旧采样, 总长度不变.
#[derive(Debug, Clone)]
pub struct SyncBuffer {
    audio: AudioMultiVector,
    next_index: usize,
    end_timestamp: RtpTimestamp,
    dtmf_index: usize,
}

impl SyncBuffer {
    /// 创建全零缓冲, 初始时没有未来采样
    pub fn new(num_channels: usize, length: usize) -> Self {
        Self {
            audio: AudioMultiVector::with_size(num_channels, length),
            next_index: length,
            end_timestamp: RtpTimestamp::default(),
            dtmf_index: 0,
        }
    }

    /// 追加采样并丢弃同样数量的最旧采样
    pub fn push_back(&mut self, append: &AudioMultiVector) {
        let samples_added = append.size();
        self.audio.push_back(append);
        self.audio.pop_front(samples_added);
        if samples_added <= self.next_index {
            self.next_index -= samples_added;
        } else {
            // 未播放的采样被挤出
            warn!(
                "同步缓冲溢出: 追加 {} 个采样, 仅剩 {} 个历史",
                samples_added,
                self.next_index
            );
            self.next_index = 0;
        }
        self.dtmf_index -= self.dtmf_index.min(samples_added);
    }

    /// 在头部插入零, 并从尾部丢弃同样数量
    pub fn push_front_zeros(&mut self, length: usize) {
        self.insert_zeros_at_index(length, 0);
    }

    /// 在 `position` 处插入零, 尾部丢弃同样数量, 指向其后的索引随之后移
    pub fn insert_zeros_at_index(&mut self, length: usize, position: usize) {
        let size = self.audio.size();
        let position = position.min(size);
        let length = length.min(size - position);
        self.audio.pop_back(length);
        for ch in 0..self.audio.channels() {
            self.audio[ch].insert_zeros_at(length, position);
        }
        if self.next_index >= position {
            self.set_next_index(self.next_index + length);
        }
        if self.dtmf_index > 0 && self.dtmf_index >= position {
            self.set_dtmf_index(self.dtmf_index + length);
        }
    }

    /// 用 `insert` 的前 `length` 个采样覆盖 `position` 起的内容, 不改变总长度
    pub fn replace_at_index(&mut self, insert: &AudioMultiVector, length: usize, position: usize) {
        let size = self.audio.size();
        let position = position.min(size);
        let length = length.min(size - position).min(insert.size());
        self.audio.overwrite_at(insert, length, position);
    }

    /// 读取最多 `requested_len` 组未来采样 (交错) 并推进 `next_index`, 返回读取组数
    pub fn get_next_audio_interleaved(&mut self, requested_len: usize, output: &mut [i16]) -> usize {
        let to_read = self.future_length().min(requested_len);
        let read = self
            .audio
            .read_interleaved_from_index(self.next_index, to_read, output);
        self.next_index += read;
        read
    }

    /// 尚未输出的采样数
    pub fn future_length(&self) -> usize {
        self.audio.size() - self.next_index
    }

    pub fn increase_end_timestamp(&mut self, increment: u32) {
        self.end_timestamp = self.end_timestamp.advance(increment);
    }

    /// 清零全部内容, 回到初始状态
    pub fn flush(&mut self) {
        let size = self.audio.size();
        self.audio.zeros(size);
        self.next_index = size;
        self.end_timestamp = RtpTimestamp::default();
        self.dtmf_index = 0;
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn set_next_index(&mut self, value: usize) {
        self.next_index = value.min(self.audio.size());
    }

    pub fn end_timestamp(&self) -> RtpTimestamp {
        self.end_timestamp
    }

    pub fn set_end_timestamp(&mut self, value: RtpTimestamp) {
        self.end_timestamp = value;
    }

    pub fn dtmf_index(&self) -> usize {
        self.dtmf_index
    }

    pub fn set_dtmf_index(&mut self, value: usize) {
        self.dtmf_index = value.min(self.audio.size());
    }
}

impl Deref for SyncBuffer {
    type Target = AudioMultiVector;

    fn deref(&self) -> &AudioMultiVector {
        &self.audio
    }
}

impl DerefMut for SyncBuffer {
    fn deref_mut(&mut self) -> &mut AudioMultiVector {
        &mut self.audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: &[i16]) -> AudioMultiVector {
        let mut v = AudioMultiVector::new(1);
        v.push_back_interleaved(samples);
        v
    }

    #[test]
    fn test_push_back_keeps_length() {
        let mut sb = SyncBuffer::new(1, 10);
        assert_eq!(sb.future_length(), 0);
        sb.push_back(&block(&[1, 2, 3, 4]));
        assert_eq!(sb.size(), 10);
        assert_eq!(sb.next_index(), 6);
        assert_eq!(sb.future_length(), 4);
        assert_eq!(&sb[0].as_slice()[6..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_get_next_audio_advances() {
        let mut sb = SyncBuffer::new(1, 8);
        sb.push_back(&block(&[5, 6, 7]));
        let mut out = [0i16; 8];
        assert_eq!(sb.get_next_audio_interleaved(2, &mut out), 2);
        assert_eq!(&out[..2], &[5, 6]);
        assert_eq!(sb.get_next_audio_interleaved(5, &mut out), 1);
        assert_eq!(out[0], 7);
        assert_eq!(sb.future_length(), 0);
    }

    #[test]
    fn test_insert_zeros_moves_next_index() {
        let mut sb = SyncBuffer::new(1, 6);
        sb.push_back(&block(&[1, 2, 3]));
        sb.insert_zeros_at_index(2, 2);
        assert_eq!(sb[0].as_slice(), &[0, 0, 0, 0, 0, 1]);
        assert_eq!(sb.next_index(), 5);
        assert_eq!(sb.future_length(), 1);
        assert_eq!(sb.size(), 6);
    }

    #[test]
    fn test_replace_and_flush() {
        let mut sb = SyncBuffer::new(1, 5);
        sb.replace_at_index(&block(&[9, 9, 9]), 3, 3);
        assert_eq!(sb[0].as_slice(), &[0, 0, 0, 9, 9]);
        sb.increase_end_timestamp(160);
        assert_eq!(sb.end_timestamp(), RtpTimestamp(160));
        sb.flush();
        assert_eq!(sb[0].as_slice(), &[0; 5]);
        assert_eq!(sb.end_timestamp(), RtpTimestamp(0));
    }
}
