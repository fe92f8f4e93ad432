//! Decoding source audio into stereo float waveforms, and writing them back out for inspection.

use std::{fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, warn};
use ndarray::{Array2, ArrayView1};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::config::CHANNELS;
use crate::error::{BakeError, Result};

/// Turns a file on disk into a `[CHANNELS, samples]` waveform at the requested rate.
pub trait AudioDecoder: Sync {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Array2<f32>>;
}

/// Decodes anything symphonia can probe, then resamples with rubato.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Array2<f32>> {
        let (interleaved, channel_count, original_sr) =
            read_interleaved(path).map_err(|e| BakeError::decode(path, e))?;
        if channel_count == 0 {
            return Err(BakeError::decode(path, "no audio channels"));
        }
        if channel_count == 1 {
            warn!("{:?} is mono, duplicating it into both channels", path);
        } else if channel_count > CHANNELS {
            warn!("{:?} has {} channels, keeping the first {}", path, channel_count, CHANNELS);
        }

        let frames = interleaved.len() / channel_count;
        let wave = Array2::from_shape_fn((CHANNELS, frames), |(ch, i)| {
            let src = if channel_count == 1 { 0 } else { ch };
            interleaved[i * channel_count + src]
        });
        debug!("decoded {:?}: {} frames at {} Hz", path, frames, original_sr);

        resample_to_target(wave, original_sr, sample_rate)
    }
}

/// Reads every packet of the first decodable track. Returns interleaved samples, the channel
/// count and the native sample rate.
fn read_interleaved(path: &Path) -> std::result::Result<(Vec<f32>, usize, u32), SymphoniaError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SymphoniaError::Unsupported("no supported audio track"))?;
    let track_id = track.id;

    let original_sr = track
        .codec_params
        .sample_rate
        .ok_or(SymphoniaError::Unsupported("missing sample rate"))?;
    let decode_options = DecoderOptions { verify: true };
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &decode_options)?;

    let mut pcm_f32 = Vec::new();
    let mut channel_count = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                let decoded = decoder.decode(&packet)?;
                channel_count = decoded.spec().channels.count();
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                sample_buf.copy_interleaved_ref(decoded);
                pcm_f32.extend_from_slice(sample_buf.samples());
            }
            // End of stream.
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e),
        }
    }

    Ok((pcm_f32, channel_count, original_sr))
}

/// Resamples every channel of a waveform to the target sample rate.
fn resample_to_target(wave: Array2<f32>, original_sr: u32, target_sr: u32) -> Result<Array2<f32>> {
    if original_sr == target_sr || wave.ncols() == 0 {
        return Ok(wave);
    }

    // Spectrograms are cut at n_fft resolution, so the cheaper end of the sinc settings is plenty.
    let params = SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.95,
        interpolation: rubato::SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: rubato::WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        target_sr as f64 / original_sr as f64,
        2.0,
        params,
        wave.ncols(),
        wave.nrows(),
    )
    .map_err(|e| BakeError::Resample(e.to_string()))?;

    // Rubato expects a Vec<Vec<f32>>.
    let waves_in: Vec<Vec<f32>> = wave.outer_iter().map(|ch| ch.to_vec()).collect();
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| BakeError::Resample(e.to_string()))?;

    let frames = waves_out.iter().map(Vec::len).min().unwrap_or(0);
    let mut resampled = Array2::zeros((waves_out.len(), frames));
    for (mut row, channel) in resampled.outer_iter_mut().zip(&waves_out) {
        row.assign(&ArrayView1::from(&channel[..frames]));
    }
    Ok(resampled)
}

/// Writes a `[channels, samples]` waveform as a 32-bit float WAV file.
pub fn write_wav(path: &Path, wave: &Array2<f32>, sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: wave.nrows() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for frame in wave.columns() {
        for &sample in frame {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}
