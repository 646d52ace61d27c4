//! 端到端集成测试: iLBC 经框架接口的完整编解码管线.
//!
//! 测试流程: 生成语音 → 注册表创建编码器 → 分包 → 模拟丢包 → 注册表创建解码器 → 验证

use tao_voice::codec::{
    CodecId, CodecParameters, Decoder, Encoder, Frame, Packet,
    ilbc::{IlbcDecoder, IlbcEncoder, IlbcMode},
};
use tao_voice::core::TaoError;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 200 Hz 基音加谐波的浊音信号
fn voiced(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f64 / 8000.0;
            let v = 5000.0 * (t * 200.0 * 2.0 * std::f64::consts::PI).sin()
                + 2000.0 * (t * 400.0 * 2.0 * std::f64::consts::PI).sin()
                + 800.0 * (t * 600.0 * 2.0 * std::f64::consts::PI).sin();
            v as i16
        })
        .collect()
}

fn energy(x: &[i16]) -> i64 {
    x.iter().map(|&v| v as i64 * v as i64).sum()
}

/// 编码整段音频, 返回数据包列表
fn encode_packets(encoder: &mut dyn Encoder, pcm: &[i16], chunk: usize) -> Vec<Packet> {
    let mut packets = Vec::new();
    let mut pts = 0i64;
    for piece in pcm.chunks(chunk) {
        let mut frame = tao_voice::codec::AudioFrame::from_mono_s16(piece, 8000);
        frame.pts = pts;
        pts += piece.len() as i64;
        encoder.send_frame(Some(&Frame::Audio(frame))).unwrap();
        loop {
            match encoder.receive_packet() {
                Ok(pkt) => packets.push(pkt),
                Err(TaoError::NeedMoreData) => break,
                Err(e) => panic!("编码失败: {e}"),
            }
        }
    }
    encoder.send_frame(None).unwrap();
    loop {
        match encoder.receive_packet() {
            Ok(pkt) => packets.push(pkt),
            Err(TaoError::Eof) => break,
            Err(e) => panic!("刷新编码器失败: {e}"),
        }
    }
    packets
}

fn decode_packets(decoder: &mut dyn Decoder, packets: &[Packet]) -> Vec<Vec<i16>> {
    let mut frames = Vec::new();
    for pkt in packets {
        decoder.send_packet(pkt).unwrap();
        match decoder.receive_frame() {
            Ok(Frame::Audio(af)) => frames.push(af.samples_s16()),
            Err(e) => panic!("解码失败: {e}"),
        }
    }
    decoder.send_packet(&Packet::empty()).unwrap();
    assert!(matches!(decoder.receive_frame(), Err(TaoError::Eof)));
    frames
}

#[test]
fn test_registry_round_trip_both_modes() {
    init_logger();
    let registry = tao_voice::default_codec_registry();
    for (frame_size, bytes) in [(160u32, 38usize), (240, 50)] {
        let params = CodecParameters::mono_s16(CodecId::Ilbc, 8000, frame_size);
        let mut encoder = registry.create_encoder(CodecId::Ilbc).unwrap();
        encoder.open(&params).unwrap();
        let pcm = voiced(frame_size as usize * 25);
        // 输入帧长与编码块长不对齐
        let packets = encode_packets(encoder.as_mut(), &pcm, 100);
        assert_eq!(packets.len(), 25);
        assert!(packets.iter().all(|p| p.size() == bytes));
        assert_eq!(packets[3].pts, 3 * frame_size as i64);

        let mut decoder = registry.create_decoder(CodecId::Ilbc).unwrap();
        decoder
            .open(&CodecParameters::mono_s16(CodecId::Ilbc, 8000, 0))
            .unwrap();
        let frames = decode_packets(decoder.as_mut(), &packets);
        let decoded: Vec<i16> = frames.concat();
        assert_eq!(decoded.len(), pcm.len());

        let ex = energy(&pcm[2000..]);
        let ey = energy(&decoded[2000..]);
        assert!(ey > ex / 10 && ey < ex * 10, "{frame_size}: {ex} vs {ey}");
    }
}

#[test]
fn test_lost_packets_are_concealed_in_place() {
    init_logger();
    let registry = tao_voice::default_codec_registry();
    let params = CodecParameters::mono_s16(CodecId::Ilbc, 8000, 240);
    let mut encoder = registry.create_encoder(CodecId::Ilbc).unwrap();
    encoder.open(&params).unwrap();
    let pcm = voiced(240 * 20);
    let mut packets = encode_packets(encoder.as_mut(), &pcm, 240);

    for index in [7usize, 8, 15] {
        let mut lost = Packet::lost();
        lost.pts = packets[index].pts;
        packets[index] = lost;
    }

    let mut decoder = registry.create_decoder(CodecId::Ilbc).unwrap();
    decoder.open(&params).unwrap();
    let frames = decode_packets(decoder.as_mut(), &packets);
    assert_eq!(frames.len(), 20);
    assert!(frames.iter().all(|f| f.len() == 240));
    // 刚开始丢包时仍有可听的隐藏信号
    assert!(energy(&frames[7]) > 0);
    // 隐藏之后恢复正常解码
    assert!(energy(&frames[10]) > energy(&pcm[2400..2640]) / 10);
}

#[test]
fn test_plc_energy_is_non_increasing_over_consecutive_losses() {
    init_logger();
    for mode in [IlbcMode::Ms20, IlbcMode::Ms30] {
        for use_enhancer in [true, false] {
            let mut encoder = IlbcEncoder::new(mode);
            let mut decoder = IlbcDecoder::new(Some(mode), use_enhancer);
            // 1 秒 200 Hz 基音的浊音
            let pcm = voiced(8000 / mode.block_len() * mode.block_len());
            let bytes = encoder.encode(&pcm).unwrap();
            for frame in bytes.chunks(mode.bytes()) {
                decoder.decode(frame).unwrap();
            }

            let energies: Vec<i64> = (0..9).map(|_| energy(&decoder.decode_plc(1))).collect();
            assert!(energies[0] > 0, "{mode}: {energies:?}");
            for w in energies.windows(2) {
                assert!(w[1] <= w[0], "{mode} {use_enhancer}: {energies:?}");
            }
        }
    }
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let registry = tao_voice::default_codec_registry();
    let mut encoder = registry.create_encoder(CodecId::Ilbc).unwrap();
    let err = encoder
        .open(&CodecParameters::mono_s16(CodecId::Ilbc, 16000, 160))
        .unwrap_err();
    assert!(matches!(err, TaoError::InvalidArgument(_)));
    let err = encoder
        .open(&CodecParameters::mono_s16(CodecId::Ilbc, 8000, 200))
        .unwrap_err();
    assert!(matches!(err, TaoError::InvalidArgument(_)));

    let mut decoder = IlbcDecoder::new(Some(IlbcMode::Ms30), true);
    assert!(matches!(
        decoder.decode(&[0u8; 38]),
        Err(TaoError::InvalidArgument(_))
    ));
}
