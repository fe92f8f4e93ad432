//! The main baking script. See "config.rs" for the paths and parameters it runs with.
//!
//! Memory use is dominated by step 5, which holds `PATCHES_PER_FILE` complex patches per training
//! pair at once. With the default geometry that is about 8MB per patch, so size the file list
//! accordingly.

use std::{fs, path::Path, time::Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use ndarray_npy::write_npy;
use rand::{SeedableRng, rngs::StdRng};

use patchbake::config::{
    INST_DIR, MIX_DIR, MIXUP_ALPHA, MIXUP_RATE, OUTPUT_DIR, PatchParams, SEED, SpectrogramParams, VAL_FILELIST,
    VAL_RATE,
};
use patchbake::{SpectrogramCache, filelist, mixup, stats, training, validation};

fn step(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.blue} {msg}")?);
    pb.set_message(message);
    Ok(pb)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();

    let mut rng = match SEED {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let spec_params = SpectrogramParams::default();
    let patch_params = PatchParams::default();
    let out_root = Path::new(OUTPUT_DIR);
    fs::create_dir_all(out_root)?;

    // --- Step 1: List the pairs and split them ---
    let pb = step("Step 1: Listing file pairs...")?;
    let pairs = filelist::make_pairs(Path::new(MIX_DIR), Path::new(INST_DIR))
        .with_context(|| format!("could not pair up '{}' with '{}'", MIX_DIR, INST_DIR))?;
    let val_override = if Path::new(VAL_FILELIST).is_file() {
        info!("using the validation list in '{}'", VAL_FILELIST);
        filelist::load_pair_list(Path::new(VAL_FILELIST)).context("could not read the validation list")?
    } else {
        Vec::new()
    };
    let (train_pairs, val_pairs) = filelist::train_val_split(pairs, VAL_RATE, &val_override, &mut rng)?;
    pb.finish_with_message("Step 1: Pairs listed.");

    // --- Step 2: Make sure every pair has its spectrograms cached ---
    let pb = step("Step 2: Caching spectrograms...")?;
    let cache = SpectrogramCache::new(spec_params);
    let all_pairs: Vec<_> = train_pairs.iter().chain(&val_pairs).cloned().collect();
    cache.warm(&all_pairs).context("could not fill the spectrogram cache")?;
    pb.finish_with_message("Step 2: Spectrograms cached.");

    // --- Step 3: Normalization statistics ---
    let pb = step("Step 3: Measuring normalization statistics...")?;
    let norm = stats::compute_statistics(&cache, &all_pairs)?;
    write_npy(out_root.join("stats_mean.npy"), &norm.mean)?;
    write_npy(out_root.join("stats_scale.npy"), &norm.scale)?;
    pb.finish_with_message("Step 3: Statistics written.");

    // --- Step 4: Validation tiling ---
    let pb = step("Step 4: Tiling the validation set...")?;
    let val_set = validation::make_validation_set(&cache, &val_pairs, &patch_params, out_root)?;
    pb.finish_with_message("Step 4: Validation set tiled.");

    // --- Step 5: Training patches ---
    let pb = step("Step 5: Cutting training patches...")?;
    let mut train_set = training::make_training_set(&cache, &train_pairs, &patch_params, &mut rng)?;
    if MIXUP_RATE > 0.0 {
        mixup::mixup(&mut train_set.x, &mut train_set.y, MIXUP_RATE, MIXUP_ALPHA, &mut rng)?;
    }
    pb.finish_with_message("Step 5: Training patches ready.");

    println!("\n✅ Bake complete!");
    println!("Total time elapsed: {:?}", start_time.elapsed());
    println!(
        "Training set: {} patches of {:?}; validation set: {} patches in '{}'",
        train_set.len(),
        &train_set.x.shape()[1..],
        val_set.len(),
        out_root.join(patch_params.tiling_dir_name(&spec_params)).display()
    );

    Ok(())
}
