use ndarray::{Array3, Axis, s};

/// Tile geometry for a spectrogram `width` frames wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    pub roi_size: usize,
}

impl Padding {
    /// `left + width + right`.
    pub fn padded_width(&self, width: usize) -> usize {
        self.left + width + self.right
    }
}

/// Pads so that, without the `left` context frames on each side, the width is an exact multiple
/// of the inner region of a `cropsize` tile. When `offset` eats the whole tile, the inner region falls back to
/// the full `cropsize`.
pub fn make_padding(width: usize, cropsize: usize, offset: usize) -> Padding {
    let left = offset;
    let roi_size = match cropsize.saturating_sub(2 * left) {
        0 => cropsize,
        roi => roi,
    };
    let right = roi_size - (width % roi_size) + left;

    Padding { left, right, roi_size }
}

/// Zero-pads the time axis (the last one) of a spectrogram.
pub fn pad_time<A: Clone + Default>(spec: &Array3<A>, padding: &Padding) -> Array3<A> {
    let (channels, bins, width) = spec.dim();
    let mut padded = Array3::default((channels, bins, padding.padded_width(width)));
    padded
        .slice_mut(s![.., .., padding.left..padding.left + width])
        .assign(spec);
    debug_assert_eq!(padded.len_of(Axis(2)), padding.padded_width(width));
    padded
}
