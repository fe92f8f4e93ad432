//! Writes what the cache would see for one pair, so the alignment can be checked by ear.
//!
//! Usage: `align_preview <mix> <inst>`. Produces `preview_X.wav` (aligned mix), `preview_y.wav`
//! (aligned target) and `preview_v.wav` (mix minus target), all passed through the same
//! transform round trip as the cached spectrograms.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;

use patchbake::align::align_waveforms;
use patchbake::audio::{AudioDecoder, SymphoniaDecoder, write_wav};
use patchbake::config::SpectrogramParams;
use patchbake::stft::Stft;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    let [mix_path, inst_path] = args.as_slice() else {
        bail!("usage: align_preview <mix> <inst>");
    };

    let params = SpectrogramParams::default();
    let sr = params.sample_rate;
    let mix = SymphoniaDecoder
        .decode(mix_path, sr)
        .with_context(|| format!("could not decode {:?}", mix_path))?;
    let inst = SymphoniaDecoder
        .decode(inst_path, sr)
        .with_context(|| format!("could not decode {:?}", inst_path))?;
    let (mix, inst) = align_waveforms(&mix, &inst, sr)?;
    info!("aligned to {} samples", mix.ncols());

    let stft = Stft::new(params.n_fft, params.hop_length);
    let x_spec = stft.spectrogram(&mix)?;
    let y_spec = stft.spectrogram(&inst)?;
    let v_spec = &x_spec - &y_spec;

    for (name, spec) in [("preview_X.wav", &x_spec), ("preview_y.wav", &y_spec), ("preview_v.wav", &v_spec)] {
        let wave = stft.waveform(spec)?;
        write_wav(Path::new(name), &wave, sr)?;
        println!("Wrote {}", name);
    }

    Ok(())
}
