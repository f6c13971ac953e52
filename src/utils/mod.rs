/// Format duration as human-readable string
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Format number with commas
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

/// Random number utilities
pub mod random {
    use crate::error::{Result, WideDeepError};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    /// Create RNG with fixed seed
    pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    /// Draw `size` samples from N(0, std)
    pub fn normal_vector(rng: &mut ChaCha8Rng, size: usize, std: f64) -> Result<Vec<f32>> {
        if !(std.is_finite() && std > 0.0) {
            return Err(WideDeepError::config(format!(
                "initializer std must be a positive number, got {}",
                std
            )));
        }
        let normal = Normal::new(0.0, std).map_err(|e| {
            WideDeepError::config(format!("invalid initializer std {}: {}", std, e))
        })?;
        Ok((0..size).map(|_| normal.sample(rng) as f32).collect())
    }

    /// Glorot-style std used for dense layers: `sqrt(2 / (fan_in + fan_out))`
    pub fn glorot_std(fan_in: usize, fan_out: usize) -> f64 {
        (2.0 / (fan_in + fan_out) as f64).sqrt()
    }
}

/// Validation utilities
pub mod validation {
    use anyhow::{bail, Result};

    /// Validate that a required input file exists
    pub fn file_exists<P: AsRef<std::path::Path>>(path: P, what: &str) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("{} not found: {:?}", what, path);
        }
        Ok(())
    }

    /// Validate that labels match the row count of their table
    pub fn same_length(labels: usize, rows: usize, name: &str) -> Result<()> {
        if labels != rows {
            bail!("{} has {} labels for {} rows", name, labels, rows);
        }
        Ok(())
    }
}
