//! Gain stage: volume on a base-2 scale plus a mute flag.
//!
//! Volume is stored in log2 units: `0.0` is unity, `-1.0` is half amplitude, `1.0` is
//! double. Muting never touches the stored volume, so un-muting restores the prior
//! loudness exactly.

/// Silent floor. A volume at this value produces no output.
pub const VOLUME_MIN: f64 = -8.0;
/// Loudest permitted volume (2x amplitude).
pub const VOLUME_MAX: f64 = 1.0;
/// Default step for volume up/down.
pub const VOLUME_STEP: f64 = 0.5;

/// Clamp `volume` to `[VOLUME_MIN, VOLUME_MAX]`. NaN maps to unity.
pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(VOLUME_MIN, VOLUME_MAX)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gain {
    volume: f64,
    muted: bool,
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Gain {
    pub fn new(volume: f64) -> Self {
        Self {
            volume: clamp_volume(volume),
            muted: false,
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = clamp_volume(volume);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Linear amplitude factor for the current state.
    pub fn factor(&self) -> f32 {
        if self.muted || self.volume <= VOLUME_MIN {
            0.0
        } else {
            self.volume.exp2() as f32
        }
    }

    /// Scale samples in place.
    pub fn apply(&self, samples: &mut [f32]) {
        let factor = self.factor();
        if factor == 1.0 {
            return;
        }
        for s in samples {
            *s *= factor;
        }
    }
}
