//! WAV encoding for transcription requests
//!
//! The backend receives canonical 16-bit PCM WAV: a 44-byte header and
//! little-endian samples. The exact byte layout is part of the wire
//! contract, so the header is written by hand rather than delegated.

/// Encode normalized float samples as canonical 16-bit PCM WAV bytes
///
/// Each sample is clamped to [-1, 1] and scaled by 32767. `samples` is
/// interleaved when `channels > 1`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_pcm16(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * u32::from(channels) * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + samples.len() * 2);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM format tag
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_canonical() {
        let wav = encode_pcm16(&[0.0; 100], 16000, 1);

        assert_eq!(wav.len(), 44 + 200);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 200);
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(wav[24..28].try_into().unwrap()),
            16000
        );
        assert_eq!(
            u32::from_le_bytes(wav[28..32].try_into().unwrap()),
            32000
        );
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 200);
    }

    #[test]
    fn stereo_rates_scale_with_channels() {
        let wav = encode_pcm16(&[0.0; 8], 48000, 2);

        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 2);
        assert_eq!(
            u32::from_le_bytes(wav[28..32].try_into().unwrap()),
            192_000
        );
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 4);
    }

    #[test]
    fn samples_are_clamped_and_scaled() {
        let wav = encode_pcm16(&[1.0, -1.0, 0.5, 2.0, -2.0], 16000, 1);
        let data = &wav[44..];

        let read = |i: usize| i16::from_le_bytes(data[i * 2..i * 2 + 2].try_into().unwrap());
        assert_eq!(read(0), 32767);
        assert_eq!(read(1), -32767);
        assert_eq!(read(2), 16383);
        assert_eq!(read(3), 32767); // clamped
        assert_eq!(read(4), -32767); // clamped
    }

    #[test]
    fn empty_input_yields_header_only() {
        let wav = encode_pcm16(&[], 16000, 1);
        assert_eq!(wav.len(), 44);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 0);
    }
}
