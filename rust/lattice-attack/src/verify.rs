//! Candidate verification against the plaintext constraints.
//!
//! A reduced row is accepted only if its first n coordinates:
//! - lie in the alphabet [0, A]
//! - have exactly t non-zero entries
//! - sum to c2 (when the cardinality constraint is active)
//! - have inner product c1 with the public weights
//!
//! Everything is exact integer arithmetic; there is no tolerance.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::instance::Instance;

/// The constraints a recovered plaintext must satisfy.
#[derive(Debug, Clone, Copy)]
pub struct Constraints<'a> {
    pub h: &'a [BigInt],
    pub c1: &'a BigInt,
    pub c2: &'a BigInt,
    pub t: usize,
    /// Alphabet bound A (inclusive).
    pub alphabet: &'a BigInt,
    /// Whether Σx = c2 is required for acceptance.
    pub check_sum: bool,
}

impl<'a> Constraints<'a> {
    pub fn from_instance(instance: &'a Instance, alphabet: &'a BigInt, check_sum: bool) -> Self {
        Constraints {
            h: &instance.h,
            c1: &instance.c1,
            c2: &instance.c2,
            t: instance.params.t,
            alphabet,
            check_sum,
        }
    }
}

/// Outcome of checking one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub alphabet_valid: bool,
    pub weight_ok: bool,
    pub sum_ok: bool,
    /// Whether `sum_ok` took part in the decision.
    pub sum_checked: bool,
    pub equation_ok: bool,
    pub accept: bool,
}

/// Check a candidate against the constraints.
///
/// `candidate` may be a full reduced row of length n + k; only its first
/// n coordinates are read. Rows shorter than n are rejected outright.
pub fn verify(candidate: &[BigInt], constraints: &Constraints<'_>) -> Verdict {
    let n = constraints.h.len();
    if candidate.len() < n {
        return Verdict {
            sum_checked: constraints.check_sum,
            ..Verdict::default()
        };
    }
    let x = &candidate[..n];

    let alphabet_valid = x
        .iter()
        .all(|xi| !xi.is_negative() && xi <= constraints.alphabet);
    let weight_ok = x.iter().filter(|xi| !xi.is_zero()).count() == constraints.t;
    let sum: BigInt = x.iter().sum();
    let sum_ok = &sum == constraints.c2;
    let dot: BigInt = x.iter().zip(constraints.h).map(|(xi, hi)| xi * hi).sum();
    let equation_ok = &dot == constraints.c1;

    let accept =
        alphabet_valid && weight_ok && (sum_ok || !constraints.check_sum) && equation_ok;

    Verdict {
        alphabet_valid,
        weight_ok,
        sum_ok,
        sum_checked: constraints.check_sum,
        equation_ok,
        accept,
    }
}

/// Return the first row the verifier accepts, in the order given.
pub fn first_accepted<'r>(
    rows: &'r [Vec<BigInt>],
    constraints: &Constraints<'_>,
) -> Option<(&'r [BigInt], Verdict)> {
    let n = constraints.h.len();
    rows.iter().find_map(|row| {
        let verdict = verify(row, constraints);
        verdict.accept.then(|| (&row[..n], verdict))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::ParamSet;

    fn big(v: &[i64]) -> Vec<BigInt> {
        v.iter().map(|&x| BigInt::from(x)).collect()
    }

    fn planted() -> Instance {
        Instance::planted(
            ParamSet::new(6, 3, 8, 3),
            1,
            big(&[13, 29, 71, 113, 199, 307]),
            big(&[0, 7, 0, 2, 0, 5]),
        )
    }

    #[test]
    fn test_accepts_planted_plaintext() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let v = verify(inst.plaintext.as_ref().unwrap(), &c);
        assert!(v.alphabet_valid && v.weight_ok && v.sum_ok && v.equation_ok);
        assert!(v.accept);
        assert!(v.sum_checked);
    }

    #[test]
    fn test_accepts_row_with_trailing_zeros() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let mut row = inst.plaintext.clone().unwrap();
        row.extend(big(&[0, 0]));
        assert!(verify(&row, &c).accept);
    }

    #[test]
    fn test_verify_is_idempotent() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let cand = big(&[1, 0, 0, 0, 0, 9]);
        assert_eq!(verify(&cand, &c), verify(&cand, &c));
        let pt = inst.plaintext.clone().unwrap();
        assert_eq!(verify(&pt, &c), verify(&pt, &c));
    }

    #[test]
    fn test_rejects_extra_weight() {
        // Same sum (14) but four non-zero entries.
        let h = big(&[13, 29, 71, 113, 199, 307]);
        let x = big(&[1, 6, 0, 2, 0, 5]);
        let inst = Instance::planted(ParamSet::new(6, 3, 8, 3), 1, h, x.clone());
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let v = verify(&x, &c);
        assert!(!v.weight_ok);
        assert!(v.sum_ok && v.equation_ok && v.alphabet_valid);
        assert!(!v.accept);
    }

    #[test]
    fn test_rejects_symbol_above_alphabet() {
        let h = big(&[13, 29, 71, 113, 199, 307]);
        let x = big(&[0, 8, 0, 2, 0, 5]);
        let inst = Instance::planted(ParamSet::new(6, 3, 8, 3), 1, h, x.clone());
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let v = verify(&x, &c);
        assert!(!v.alphabet_valid);
        assert!(v.weight_ok && v.sum_ok && v.equation_ok);
        assert!(!v.accept);
    }

    #[test]
    fn test_rejects_negative_entry() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let neg: Vec<BigInt> = inst.plaintext.as_ref().unwrap().iter().map(|x| -x).collect();
        let v = verify(&neg, &c);
        assert!(!v.alphabet_valid);
        assert!(!v.accept);
    }

    #[test]
    fn test_rejects_wrong_equation() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        // Right weight, sum and alphabet; different positions.
        let v = verify(&big(&[7, 0, 2, 0, 5, 0]), &c);
        assert!(v.alphabet_valid && v.weight_ok && v.sum_ok);
        assert!(!v.equation_ok);
        assert!(!v.accept);
    }

    #[test]
    fn test_sum_only_required_when_active() {
        let mut inst = planted();
        inst.c2 += 1;
        let a = inst.params.default_alphabet();
        let pt = inst.plaintext.clone().unwrap();

        let strict = verify(&pt, &Constraints::from_instance(&inst, &a, true));
        assert!(!strict.sum_ok);
        assert!(!strict.accept);

        let relaxed = verify(&pt, &Constraints::from_instance(&inst, &a, false));
        assert!(!relaxed.sum_ok);
        assert!(!relaxed.sum_checked);
        assert!(relaxed.accept);
    }

    #[test]
    fn test_short_row_rejected() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let v = verify(&big(&[0, 7, 0]), &c);
        assert!(!v.accept);
        assert!(!v.alphabet_valid);
    }

    #[test]
    fn test_first_accepted_scans_in_order() {
        let inst = planted();
        let a = inst.params.default_alphabet();
        let c = Constraints::from_instance(&inst, &a, true);
        let mut good = inst.plaintext.clone().unwrap();
        good.extend(big(&[0, 0]));
        let rows = vec![big(&[1, 1, 1, 1, 1, 1, 3, 4]), good.clone(), good];
        let (x, verdict) = first_accepted(&rows, &c).unwrap();
        assert_eq!(x, &inst.plaintext.as_ref().unwrap()[..]);
        assert!(verdict.accept);

        assert!(first_accepted(&rows[..1], &c).is_none());
    }
}
