use crate::media::PROVIDER_SAMPLE_RATE;
use crate::{PcmBuf, Sample};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{Resampler, SincFixedIn, SincInterpolationType, WindowFunction};
use std::io::Cursor;

/// Converts an uploaded WAV clip into the provider playback format:
/// 8 kHz mono 16-bit PCM WAV. Multi-channel input is downmixed by
/// averaging before resampling.
pub fn transcode_to_provider_wav(input: &[u8]) -> Result<Bytes> {
    let (samples, sample_rate) = decode_wav(input)?;
    let resampled = resample_mono(&samples, sample_rate, PROVIDER_SAMPLE_RATE);
    if resampled.is_empty() {
        return Err(anyhow!("resampling produced no audio"));
    }
    encode_wav(&resampled, PROVIDER_SAMPLE_RATE)
}

fn decode_wav(input: &[u8]) -> Result<(PcmBuf, u32)> {
    let mut reader = WavReader::new(Cursor::new(input))?;
    let spec = reader.spec();

    let interleaved: PcmBuf = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(anyhow!("unsupported wav format: {:?} {} bit", format, bits));
        }
    };

    if interleaved.is_empty() {
        return Err(anyhow!("audio clip contains no samples"));
    }

    let channels = spec.channels as usize;
    if channels <= 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    let mono: PcmBuf = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as Sample
        })
        .collect();
    Ok((mono, spec.sample_rate))
}

fn encode_wav(samples: &[Sample], sample_rate: u32) -> Result<Bytes> {
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
    Ok(Bytes::from(cursor.into_inner()))
}

pub fn resample_mono(input: &[Sample], input_sample_rate: u32, output_sample_rate: u32) -> PcmBuf {
    if input_sample_rate == output_sample_rate {
        return input.to_vec();
    }

    let frames = input.len();
    let expected_output_frames =
        (frames as f64 * output_sample_rate as f64 / input_sample_rate as f64).round() as usize;

    let params = rubato::SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::Blackman,
    };

    let mut resampler = match SincFixedIn::<f64>::new(
        output_sample_rate as f64 / input_sample_rate as f64,
        1.0,
        params,
        frames,
        1,
    ) {
        Ok(r) => r,
        Err(_) => {
            return Vec::new();
        }
    };

    let channel_data: Vec<Vec<f64>> = vec![input
        .iter()
        .map(|&sample| sample as f64 / i16::MAX as f64)
        .collect()];

    let resampled = match resampler.process(&channel_data, None) {
        Ok(res) => res,
        Err(_) => {
            return Vec::new();
        }
    };

    let actual_frames = resampled[0].len().min(expected_output_frames);
    let mut result: PcmBuf = resampled[0][..actual_frames]
        .iter()
        .map(|&value| {
            let clamped = value.clamp(-1.0, 1.0);
            (clamped * i16::MAX as f64) as Sample
        })
        .collect();

    while result.len() < expected_output_frames {
        result.push(0);
    }

    result
}
