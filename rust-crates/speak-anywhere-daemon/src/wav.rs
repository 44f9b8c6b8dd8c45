//! In-memory WAV encoding for the transcription upload.
//!
//! Canonical 44-byte PCM header followed by the raw little-endian samples:
//! mono, 16 bits, the session's sample rate.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

pub fn encode(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test]
    fn test_canonical_header_layout() {
        let samples: Vec<i16> = (0..100).collect();
        let wav = encode(&samples, 16_000).unwrap();

        let data_size = (samples.len() * 2) as u32;
        assert_eq!(wav.len(), 44 + data_size as usize);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + data_size);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16); // subchunk1 size
        assert_eq!(u16_at(&wav, 20), 1); // PCM
        assert_eq!(u16_at(&wav, 22), 1); // mono
        assert_eq!(u32_at(&wav, 24), 16_000); // sample rate
        assert_eq!(u32_at(&wav, 28), 32_000); // byte rate
        assert_eq!(u16_at(&wav, 32), 2); // block align
        assert_eq!(u16_at(&wav, 34), 16); // bits per sample
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), data_size);
    }

    #[test]
    fn test_roundtrip_reproduces_samples() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345, -12345];
        let wav = encode(&samples, 48_000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.spec().channels, 1);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_empty_input_is_header_only() {
        let wav = encode(&[], 16_000).unwrap();
        assert_eq!(wav.len(), 44);
        assert_eq!(u32_at(&wav, 40), 0);
    }
}
