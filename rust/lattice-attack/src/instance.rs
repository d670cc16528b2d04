//! Instance data model: one generated key/ciphertext tuple per (parameters, seed).

use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

/// Cryptosystem parameter tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamSet {
    /// Vector length.
    pub n: usize,
    /// Required Hamming weight of the plaintext, 0 < t ≤ n.
    pub t: usize,
    /// Modulus scale; plaintext symbols live in [0, z-1].
    pub z: u64,
    /// Security parameter.
    pub beta: u32,
}

impl ParamSet {
    pub fn new(n: usize, t: usize, z: u64, beta: u32) -> Self {
        ParamSet { n, t, z, beta }
    }

    /// Default alphabet bound A = z - 1, the largest representable symbol.
    pub fn default_alphabet(&self) -> BigInt {
        if self.z == 0 {
            BigInt::zero()
        } else {
            BigInt::from(self.z) - BigInt::one()
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={} t={} z={} beta={}", self.n, self.t, self.z, self.beta)
    }
}

/// Size and timing metrics reported by (or derived from) the oracle.
///
/// Line-tagged output reports all of these; structured output only yields
/// what can be computed locally from the key material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleMetrics {
    /// Bit length of the secret key component.
    pub key_bits: Option<u64>,
    pub c1_bits: Option<u64>,
    pub c2_bits: Option<u64>,
    pub pubkey_bits: Option<u64>,
    pub keygen_secs: Option<f64>,
    pub encrypt_secs: Option<f64>,
    pub decrypt_secs: Option<f64>,
    /// Whether the oracle's own decrypt round-trip succeeded.
    pub ok: Option<bool>,
}

impl OracleMetrics {
    /// True if at least one metric was populated.
    pub fn any(&self) -> bool {
        self.key_bits.is_some()
            || self.c1_bits.is_some()
            || self.c2_bits.is_some()
            || self.pubkey_bits.is_some()
            || self.keygen_secs.is_some()
            || self.encrypt_secs.is_some()
            || self.decrypt_secs.is_some()
            || self.ok.is_some()
    }
}

/// One cryptosystem instance as produced by a single oracle call.
///
/// `h` is empty when the oracle only reported metrics (line-tagged mode);
/// such an instance cannot be attacked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub params: ParamSet,
    pub seed: u64,
    /// Public key weights.
    pub h: Vec<BigInt>,
    /// Weighted-sum ciphertext component, Σ xᵢhᵢ.
    pub c1: BigInt,
    /// Weight-sum ciphertext component, Σ xᵢ.
    pub c2: BigInt,
    /// Ground-truth plaintext, absent in black-box mode.
    pub plaintext: Option<Vec<BigInt>>,
    pub density: Option<f64>,
    pub metrics: OracleMetrics,
}

impl Instance {
    /// An instance carrying only oracle metrics, no key material.
    pub fn metrics_only(params: ParamSet, seed: u64, metrics: OracleMetrics) -> Self {
        Instance {
            params,
            seed,
            h: Vec::new(),
            c1: BigInt::zero(),
            c2: BigInt::zero(),
            plaintext: None,
            density: None,
            metrics,
        }
    }

    /// Build an instance whose ciphertext is computed from a chosen plaintext.
    pub fn planted(params: ParamSet, seed: u64, h: Vec<BigInt>, plaintext: Vec<BigInt>) -> Self {
        let c1: BigInt = h.iter().zip(&plaintext).map(|(hi, xi)| hi * xi).sum();
        let c2: BigInt = plaintext.iter().sum();
        let metrics = key_material_metrics(&h, &c1, &c2);
        Instance {
            params,
            seed,
            h,
            c1,
            c2,
            plaintext: Some(plaintext),
            density: None,
            metrics,
        }
    }

    pub fn has_key_material(&self) -> bool {
        !self.h.is_empty()
    }

    /// Check the disclosed plaintext against every constraint it must satisfy.
    ///
    /// Returns `None` when no plaintext was disclosed.
    pub fn plaintext_consistent(&self, alphabet: &BigInt) -> Option<bool> {
        let pt = self.plaintext.as_ref()?;
        if pt.len() != self.params.n || pt.len() != self.h.len() {
            return Some(false);
        }
        let in_range = pt.iter().all(|x| !x.is_negative() && x <= alphabet);
        let weight = pt.iter().filter(|x| !x.is_zero()).count();
        let sum: BigInt = pt.iter().sum();
        let dot: BigInt = self.h.iter().zip(pt).map(|(hi, xi)| hi * xi).sum();
        Some(in_range && weight == self.params.t && sum == self.c2 && dot == self.c1)
    }
}

/// Bit-size metrics derivable from key material alone.
pub fn key_material_metrics(h: &[BigInt], c1: &BigInt, c2: &BigInt) -> OracleMetrics {
    OracleMetrics {
        c1_bits: Some(c1.bits()),
        c2_bits: Some(c2.bits()),
        pubkey_bits: Some(h.iter().map(|hi| hi.bits()).sum()),
        ..OracleMetrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(v: &[i64]) -> Vec<BigInt> {
        v.iter().map(|&x| BigInt::from(x)).collect()
    }

    #[test]
    fn test_default_alphabet() {
        assert_eq!(ParamSet::new(8, 3, 256, 3).default_alphabet(), BigInt::from(255));
        assert_eq!(ParamSet::new(8, 3, 0, 3).default_alphabet(), BigInt::zero());
    }

    #[test]
    fn test_planted_instance_is_consistent() {
        let params = ParamSet::new(4, 2, 16, 3);
        let inst = Instance::planted(params, 7, big(&[3, 5, 11, 19]), big(&[0, 4, 0, 2]));
        assert_eq!(inst.c1, BigInt::from(5 * 4 + 19 * 2));
        assert_eq!(inst.c2, BigInt::from(6));
        assert_eq!(inst.plaintext_consistent(&params.default_alphabet()), Some(true));
        assert_eq!(inst.metrics.c2_bits, Some(3));
        assert_eq!(inst.metrics.pubkey_bits, Some(2 + 3 + 4 + 5));
    }

    #[test]
    fn test_plaintext_inconsistent_weight() {
        let params = ParamSet::new(4, 1, 16, 3);
        let inst = Instance::planted(params, 7, big(&[3, 5, 11, 19]), big(&[0, 4, 0, 2]));
        assert_eq!(inst.plaintext_consistent(&params.default_alphabet()), Some(false));
    }

    #[test]
    fn test_metrics_only_has_no_key_material() {
        let inst = Instance::metrics_only(ParamSet::new(8, 3, 256, 3), 1, OracleMetrics::default());
        assert!(!inst.has_key_material());
        assert_eq!(inst.plaintext_consistent(&BigInt::from(255)), None);
        assert!(!inst.metrics.any());
    }

    #[test]
    fn test_param_display() {
        assert_eq!(ParamSet::new(64, 8, 1024, 8).to_string(), "n=64 t=8 z=1024 beta=8");
    }
}
