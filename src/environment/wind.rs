use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::utils::rng::seeded_rng;

/// Wind field sampled once per tick at the vehicle position.
pub enum WindModel {
    None,
    Constant {
        velocity: Vector3<f32>,
    },
    /// Independent per-axis sinusoids.
    Sinusoidal {
        amplitude: Vector3<f32>,
        frequency: Vector3<f32>,
        phase: Vector3<f32>,
    },
    Dryden(Box<DrydenGust>),
}

impl WindModel {
    pub fn dryden(params: DrydenParameters, seed: u64) -> Self {
        WindModel::Dryden(Box::new(DrydenGust::new(params, seed)))
    }

    pub fn update(&mut self, time: f32, position: &Vector3<f32>) -> Vector3<f32> {
        match self {
            WindModel::None => Vector3::zeros(),
            WindModel::Constant { velocity } => *velocity,
            WindModel::Sinusoidal {
                amplitude,
                frequency,
                phase,
            } => {
                let two_pi = 2.0 * std::f32::consts::PI;
                Vector3::new(
                    amplitude.x * (two_pi * frequency.x * time + phase.x).sin(),
                    amplitude.y * (two_pi * frequency.y * time + phase.y).sin(),
                    amplitude.z * (two_pi * frequency.z * time + phase.z).sin(),
                )
            }
            WindModel::Dryden(gust) => gust.update(time, position),
        }
    }
}

impl Default for WindModel {
    fn default() -> Self {
        WindModel::None
    }
}

/// Dryden gust configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrydenParameters {
    /// Mean wind, world frame [m/s]; its magnitude sets the airspeed used in
    /// the turbulence transfer functions.
    pub mean_wind: Vector3<f32>,
    /// Altitude above ground [m].
    pub altitude: f32,
    /// Vehicle span [m].
    pub wingspan: f32,
    /// Light 0.1, moderate 0.4, severe 0.7.
    pub turbulence_level: f32,
}

impl Default for DrydenParameters {
    fn default() -> Self {
        Self {
            mean_wind: Vector3::new(10.0, 0.0, 0.0),
            altitude: 100.0,
            wingspan: 2.0,
            turbulence_level: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FirstOrderFilter {
    input_prev: f32,
    output_prev: f32,
}

impl FirstOrderFilter {
    /// Bilinear-transform discretization of `H(s) = K / (1 + T s)`.
    fn step(&mut self, input: f32, t: f32, k: f32, dt: f32) -> f32 {
        let alpha = dt / (2.0 * t);
        let denom = 1.0 + alpha;

        let b0 = k * alpha / denom;
        let b1 = b0;
        let a1 = -(1.0 - alpha) / denom;

        let output = b0 * input + b1 * self.input_prev - a1 * self.output_prev;
        self.input_prev = input;
        self.output_prev = output;
        output
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SecondOrderFilter {
    input_prev: f32,
    output_prev: f32,
    output_prev2: f32,
}

impl SecondOrderFilter {
    /// Bilinear-transform discretization of
    /// `H(s) = K (1 + sqrt(3) T s) / (1 + T s)^2`.
    fn step(&mut self, input: f32, t: f32, k: f32, dt: f32) -> f32 {
        let sqrt3 = 3.0_f32.sqrt();
        let alpha = dt / (2.0 * t);
        let denom = (1.0 + alpha) * (1.0 + alpha);

        let b0 = k * (1.0 + sqrt3 * alpha) / denom;
        let b1 = k * (1.0 - sqrt3 * alpha) / denom;
        let a1 = -2.0 * (1.0 - alpha) / (1.0 + alpha);
        let a2 = ((1.0 - alpha) * (1.0 - alpha)) / denom;

        let output =
            b0 * input + b1 * self.input_prev - a1 * self.output_prev - a2 * self.output_prev2;
        self.output_prev2 = self.output_prev;
        self.output_prev = output;
        self.input_prev = input;
        output
    }
}

/// Dryden turbulence per MIL-F-8785C: white noise shaped by a first-order
/// filter along the longitudinal axis and second-order filters on the
/// lateral and vertical axes, with altitude-dependent scale lengths and
/// intensities.
pub struct DrydenGust {
    params: DrydenParameters,
    scale_u: f32,
    scale_v: f32,
    scale_w: f32,
    sigma_u: f32,
    sigma_v: f32,
    sigma_w: f32,
    airspeed: f32,
    filter_u: FirstOrderFilter,
    filter_v: SecondOrderFilter,
    filter_w: SecondOrderFilter,
    rng: ChaCha8Rng,
    last_time: f32,
}

impl DrydenGust {
    const FT_PER_M: f32 = 3.28084;

    pub fn new(params: DrydenParameters, seed: u64) -> Self {
        let mut airspeed = params.mean_wind.norm();
        if airspeed < 0.1 {
            airspeed = 10.0;
        }

        let (scale_u, scale_v, scale_w, sigma) = Self::turbulence_parameters(&params);

        Self {
            params,
            scale_u,
            scale_v,
            scale_w,
            sigma_u: sigma,
            sigma_v: sigma,
            sigma_w: sigma,
            airspeed,
            filter_u: FirstOrderFilter::default(),
            filter_v: SecondOrderFilter::default(),
            filter_w: SecondOrderFilter::default(),
            rng: seeded_rng(seed, "dryden_gust"),
            last_time: 0.0,
        }
    }

    /// MIL-F-8785C scale lengths and intensity, split at 1000 ft.
    fn turbulence_parameters(params: &DrydenParameters) -> (f32, f32, f32, f32) {
        let h_ft = (params.altitude * Self::FT_PER_M).clamp(10.0, 10000.0);

        let (scale_u, scale_v, scale_w);
        if h_ft <= 1000.0 {
            scale_w = h_ft / Self::FT_PER_M;
            scale_u = h_ft / (0.177 + 0.000823 * h_ft).powf(0.4) / Self::FT_PER_M;
            scale_v = scale_u;
        } else {
            scale_u = 1750.0 / Self::FT_PER_M;
            scale_v = scale_u;
            scale_w = params.altitude;
        }

        let base = params.turbulence_level;
        let sigma = if h_ft <= 1000.0 {
            0.1 * base * (10.0 + h_ft / 100.0)
        } else if h_ft <= 2000.0 {
            base * 13.0
        } else {
            base * 15.0
        };

        (scale_u, scale_v, scale_w, sigma)
    }

    pub fn update(&mut self, time: f32, _position: &Vector3<f32>) -> Vector3<f32> {
        let mut dt = time - self.last_time;
        if dt <= 0.0 {
            dt = 0.01;
        }
        self.last_time = time;

        if self.params.turbulence_level <= 0.0 {
            return self.params.mean_wind;
        }

        let n_u: f32 = self.rng.sample(StandardNormal);
        let n_v: f32 = self.rng.sample(StandardNormal);
        let n_w: f32 = self.rng.sample(StandardNormal);

        let pi = std::f32::consts::PI;
        let v = self.airspeed;

        // G_u(s) = sigma_u sqrt(2 L_u / (pi V)) / (1 + L_u s / V)
        let k_u = self.sigma_u * (2.0 * self.scale_u / (pi * v)).sqrt();
        let t_u = self.scale_u / v;

        // G_v(s) = sigma_v sqrt(2 L_v / (pi V)) (1 + sqrt(3) 2 L_v s / V)
        //          / (1 + 2 L_v s / V)^2
        let k_v = self.sigma_v * (2.0 * self.scale_v / (pi * v)).sqrt();
        let t_v = 2.0 * self.scale_v / v;

        let k_w = self.sigma_w * (2.0 * self.scale_w / (pi * v)).sqrt();
        let t_w = 2.0 * self.scale_w / v;

        let gust_u = self.filter_u.step(n_u, t_u, k_u, dt);
        let gust_v = self.filter_v.step(n_v, t_v, k_v, dt);
        let gust_w = self.filter_w.step(n_w, t_w, k_w, dt);

        self.params.mean_wind + Vector3::new(gust_u, gust_v, gust_w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_no_wind_is_zero() {
        let mut wind = WindModel::None;
        assert_eq!(
            wind.update(3.2, &Vector3::new(10.0, -4.0, 2.0)),
            Vector3::zeros()
        );
    }

    #[test]
    fn test_constant_wind() {
        let mut wind = WindModel::Constant {
            velocity: Vector3::new(3.0, -1.0, 0.5),
        };
        assert_eq!(wind.update(0.0, &Vector3::zeros()), Vector3::new(3.0, -1.0, 0.5));
        assert_eq!(wind.update(9.0, &Vector3::zeros()), Vector3::new(3.0, -1.0, 0.5));
    }

    #[test]
    fn test_sinusoidal_wind_period() {
        let mut wind = WindModel::Sinusoidal {
            amplitude: Vector3::new(2.0, 0.0, 0.0),
            frequency: Vector3::new(0.5, 0.0, 0.0),
            phase: Vector3::zeros(),
        };

        // Quarter period of a 0.5 Hz sine peaks at t = 0.5 s.
        let peak = wind.update(0.5, &Vector3::zeros());
        assert_relative_eq!(peak.x, 2.0, epsilon = 1e-5);
        let zero = wind.update(2.0, &Vector3::zeros());
        assert_relative_eq!(zero.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_dryden_zero_turbulence_returns_mean() {
        let params = DrydenParameters {
            turbulence_level: 0.0,
            ..DrydenParameters::default()
        };
        let mut wind = WindModel::dryden(params, 1);
        for step in 1..50 {
            let sample = wind.update(step as f32 * 0.01, &Vector3::zeros());
            assert_eq!(sample, Vector3::new(10.0, 0.0, 0.0));
        }
    }

    #[test]
    fn test_dryden_deterministic_per_seed() {
        let run = |seed: u64| {
            let mut wind = WindModel::dryden(DrydenParameters::default(), seed);
            (1..100)
                .map(|i| wind.update(i as f32 * 0.01, &Vector3::zeros()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
        assert_ne!(run(3), run(4));
    }

    #[test]
    fn test_dryden_fluctuates_about_mean() {
        let mut wind = WindModel::dryden(DrydenParameters::default(), 11);
        let samples: Vec<Vector3<f32>> = (1..2000)
            .map(|i| wind.update(i as f32 * 0.01, &Vector3::zeros()))
            .collect();

        let mean: Vector3<f32> =
            samples.iter().sum::<Vector3<f32>>() / samples.len() as f32;
        // Light turbulence: the mean survives, with visible variance.
        assert_relative_eq!(mean.x, 10.0, epsilon = 1.0);

        let variance: f32 = samples
            .iter()
            .map(|s| (s.x - mean.x) * (s.x - mean.x))
            .sum::<f32>()
            / samples.len() as f32;
        assert!(variance > 1e-4, "turbulence produced no variance");
        assert!(variance < 10.0, "turbulence variance unreasonably large");
    }

    #[test]
    fn test_dryden_scale_lengths_by_altitude_regime() {
        let low = DrydenParameters {
            altitude: 50.0,
            ..DrydenParameters::default()
        };
        let high = DrydenParameters {
            altitude: 1000.0,
            ..DrydenParameters::default()
        };

        let (lu_low, _, lw_low, _) = DrydenGust::turbulence_parameters(&low);
        let (lu_high, _, lw_high, _) = DrydenGust::turbulence_parameters(&high);

        // Low altitude: vertical scale equals altitude, longitudinal larger.
        assert_relative_eq!(lw_low, 50.0, epsilon = 0.5);
        assert!(lu_low > lw_low);

        // Above the 1000 ft split the longitudinal length saturates.
        assert_relative_eq!(lu_high, 1750.0 / 3.28084, epsilon = 1.0);
        assert_relative_eq!(lw_high, 1000.0, epsilon = 1.0);
    }
}
