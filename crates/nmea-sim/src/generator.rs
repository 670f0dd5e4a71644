//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::f64::consts::PI;

use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Time-indexed value source bound to a scenario channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorSpec {
    Constant {
        base: f64,
    },
    #[serde(alias = "sineWave", alias = "sine")]
    SineWave {
        base: f64,
        amplitude: f64,
        #[serde(alias = "frequency_hz", alias = "frequencyHz")]
        frequency: f64,
    },
    Gaussian {
        mean: f64,
        #[serde(alias = "stdDev")]
        std_dev: f64,
        min: f64,
        max: f64,
    },
}

impl GeneratorSpec {
    /// Value at `elapsed` seconds.
    ///
    /// Pure in `(elapsed, seed, salt)`: the gaussian variant reseeds a fresh
    /// [`StdRng`] from all three on every call, so replaying a run reproduces it.
    pub fn evaluate(&self, elapsed: f64, seed: u64, salt: u64) -> f64 {
        match *self {
            GeneratorSpec::Constant { base } => base,
            GeneratorSpec::SineWave {
                base,
                amplitude,
                frequency,
            } => base + amplitude * (2.0 * PI * frequency * elapsed).sin(),
            GeneratorSpec::Gaussian {
                mean,
                std_dev,
                min,
                max,
            } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                let sample = match Normal::new(mean, std_dev) {
                    Ok(normal) => {
                        let mut rng = StdRng::seed_from_u64(mix(seed, salt, elapsed));
                        normal.sample(&mut rng)
                    }
                    Err(_) => mean,
                };
                if sample.is_nan() {
                    return lo;
                }
                sample.max(lo).min(hi)
            }
        }
    }

    /// Declared output range, where the variant has one.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            GeneratorSpec::Constant { base } => Some((base, base)),
            GeneratorSpec::SineWave {
                base, amplitude, ..
            } => Some((base - amplitude.abs(), base + amplitude.abs())),
            GeneratorSpec::Gaussian { min, max, .. } => Some((min, max)),
        }
    }

    /// Every numeric parameter with its name, for validation.
    pub fn parameters(&self) -> Vec<(&'static str, f64)> {
        match *self {
            GeneratorSpec::Constant { base } => vec![("base", base)],
            GeneratorSpec::SineWave {
                base,
                amplitude,
                frequency,
            } => vec![
                ("base", base),
                ("amplitude", amplitude),
                ("frequency", frequency),
            ],
            GeneratorSpec::Gaussian {
                mean,
                std_dev,
                min,
                max,
            } => vec![
                ("mean", mean),
                ("std_dev", std_dev),
                ("min", min),
                ("max", max),
            ],
        }
    }
}

/// Stable per-channel salt (FNV-1a) so channels sharing a seed draw independent streams.
pub fn channel_salt(channel: &str) -> u64 {
    channel.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn mix(seed: u64, salt: u64, elapsed: f64) -> u64 {
    let mut z = seed ^ salt.rotate_left(29) ^ elapsed.to_bits().wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
