//! Lattice basis construction for the low-density subset-sum attack.
//!
//! The constraint matrix has the identity block on top with a zero column,
//! followed by one row per linear constraint:
//!
//! ```text
//!   two-constraint              one-constraint
//!   [ I_n      | 0   ]          [ I_n   | 0   ]
//!   [ h1 .. hn | -c1 ]          [ h1 .. hn | -c1 ]
//!   [ 1  .. 1  | -c2 ]
//! ```
//!
//! The lattice is generated by the matrix's columns. Column i is
//! (eᵢ, hᵢ, 1) and the last column is (0, -c1, -c2), so a lattice point
//! x₁col₁ + … + xₙcolₙ + col_{n+1} equals (x, Σxᵢhᵢ − c1, Σxᵢ − c2): the
//! plaintext appears as a short vector whose trailing coordinates vanish.

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::instance::Instance;
use crate::AttackError;

/// Which constraints the basis encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BasisVariant {
    /// Weighted-sum and cardinality equations.
    TwoConstraint,
    /// Weighted-sum equation only.
    OneConstraint,
}

impl BasisVariant {
    /// Number of constraint rows appended below the identity block.
    pub fn constraints(&self) -> usize {
        match self {
            BasisVariant::TwoConstraint => 2,
            BasisVariant::OneConstraint => 1,
        }
    }
}

/// An exact integer constraint matrix of shape (n + k) × (n + 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeBasis {
    variant: BasisVariant,
    n: usize,
    rows: Vec<Vec<BigInt>>,
}

impl LatticeBasis {
    /// Build the requested variant from an instance.
    pub fn build(instance: &Instance, variant: BasisVariant) -> Result<Self, AttackError> {
        validate(instance)?;

        let n = instance.h.len();
        let mut rows = Vec::with_capacity(n + variant.constraints());

        for i in 0..n {
            let mut row = vec![BigInt::zero(); n + 1];
            row[i] = BigInt::one();
            rows.push(row);
        }

        let mut weighted: Vec<BigInt> = instance.h.clone();
        weighted.push(-&instance.c1);
        rows.push(weighted);

        if variant == BasisVariant::TwoConstraint {
            let mut cardinality = vec![BigInt::one(); n];
            cardinality.push(-&instance.c2);
            rows.push(cardinality);
        }

        Ok(LatticeBasis { variant, n, rows })
    }

    pub fn two_constraint(instance: &Instance) -> Result<Self, AttackError> {
        Self::build(instance, BasisVariant::TwoConstraint)
    }

    pub fn one_constraint(instance: &Instance) -> Result<Self, AttackError> {
        Self::build(instance, BasisVariant::OneConstraint)
    }

    pub fn variant(&self) -> BasisVariant {
        self.variant
    }

    /// Plaintext dimension n.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// The constraint matrix, (n + k) rows of length n + 1.
    pub fn rows(&self) -> &[Vec<BigInt>] {
        &self.rows
    }

    /// Lattice generators: the transpose of the constraint matrix, i.e.
    /// n + 1 rows of length n + k. This is what gets reduced.
    pub fn generators(&self) -> Vec<Vec<BigInt>> {
        let cols = self.n + 1;
        (0..cols)
            .map(|j| self.rows.iter().map(|row| row[j].clone()).collect())
            .collect()
    }
}

fn validate(instance: &Instance) -> Result<(), AttackError> {
    let n = instance.h.len();
    if n == 0 {
        return Err(AttackError::BasisConstruction(
            "instance carries no public key weights".to_string(),
        ));
    }
    if n != instance.params.n {
        return Err(AttackError::BasisConstruction(format!(
            "public key has {} weights but n={}",
            n, instance.params.n
        )));
    }
    let t = instance.params.t;
    if t == 0 || t > n {
        return Err(AttackError::BasisConstruction(format!(
            "weight t={} outside [1, {}]",
            t, n
        )));
    }
    if let Some(i) = instance.h.iter().position(|hi| hi.is_negative()) {
        return Err(AttackError::BasisConstruction(format!(
            "public key weight h[{}] is negative",
            i
        )));
    }
    Ok(())
}
