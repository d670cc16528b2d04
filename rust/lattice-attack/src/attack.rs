//! Attack orchestration: two-constraint basis first, one-constraint fallback.
//!
//! Each stage builds its basis, hands the generators to the reducer, then
//! scans the reduced rows in the order returned. The first accepted row
//! ends the attack. Elapsed time accumulates over every stage tried.

use std::fmt;
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::basis::{BasisVariant, LatticeBasis};
use crate::instance::{Instance, ParamSet};
use crate::reduce::Reducer;
use crate::verify::{first_accepted, Constraints, Verdict};
use crate::AttackError;

/// Which basis produced the recovered plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Two,
    One,
    None,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Two => write!(f, "two"),
            Method::One => write!(f, "one"),
            Method::None => write!(f, "none"),
        }
    }
}

impl From<BasisVariant> for Method {
    fn from(variant: BasisVariant) -> Self {
        match variant {
            BasisVariant::TwoConstraint => Method::Two,
            BasisVariant::OneConstraint => Method::One,
        }
    }
}

/// Attack settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Use the cardinality constraint Σx = c2: try the two-constraint basis
    /// first and require the sum in every stage.
    pub use_sum: bool,
    /// Alphabet bound A; `None` means z - 1.
    pub alphabet: Option<BigInt>,
}

impl Default for AttackConfig {
    fn default() -> Self {
        AttackConfig {
            use_sum: true,
            alphabet: None,
        }
    }
}

impl AttackConfig {
    /// The effective alphabet bound for a parameter tuple.
    pub fn alphabet_for(&self, params: &ParamSet) -> BigInt {
        self.alphabet
            .clone()
            .unwrap_or_else(|| params.default_alphabet())
    }

    /// Stages to try, in order.
    pub fn stages(&self) -> &'static [BasisVariant] {
        if self.use_sum {
            &[BasisVariant::TwoConstraint, BasisVariant::OneConstraint]
        } else {
            &[BasisVariant::OneConstraint]
        }
    }
}

/// Result of one attack on one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    /// The accepted candidate, first n coordinates of the reduced row.
    pub recovered: Option<Vec<BigInt>>,
    pub method: Method,
    /// Total time spent over every stage tried.
    pub elapsed: Duration,
    /// Verifier flags for the recovered vector; all false on failure.
    pub verdict: Verdict,
    /// The alphabet bound that was enforced.
    pub alphabet: BigInt,
    /// Audit only: whether the recovered vector equals the disclosed
    /// plaintext. `None` when no plaintext was disclosed.
    pub matches_plaintext: Option<bool>,
}

impl AttackOutcome {
    pub fn success(&self) -> bool {
        self.recovered.is_some()
    }
}

/// Run the attack against an instance.
///
/// Basis construction and reduction failures are returned as errors; a
/// stage that simply finds nothing falls through to the next one.
pub fn run_attack(
    instance: &Instance,
    reducer: &dyn Reducer,
    config: &AttackConfig,
) -> Result<AttackOutcome, AttackError> {
    let alphabet = config.alphabet_for(&instance.params);
    let constraints = Constraints::from_instance(instance, &alphabet, config.use_sum);
    let mut elapsed = Duration::ZERO;

    for &variant in config.stages() {
        let start = Instant::now();
        let basis = LatticeBasis::build(instance, variant)?;
        let reduced = reducer.reduce(&basis.generators())?;
        let found = first_accepted(&reduced, &constraints).map(|(x, v)| (x.to_vec(), v));
        elapsed += start.elapsed();

        if let Some((recovered, verdict)) = found {
            log::debug!(
                "{} seed={}: {:?} basis recovered plaintext in {:.3}s",
                instance.params,
                instance.seed,
                variant,
                elapsed.as_secs_f64()
            );
            let matches_plaintext = instance.plaintext.as_ref().map(|pt| *pt == recovered);
            if matches_plaintext == Some(false) {
                log::warn!(
                    "{} seed={}: accepted vector differs from the disclosed plaintext",
                    instance.params,
                    instance.seed
                );
            }
            return Ok(AttackOutcome {
                recovered: Some(recovered),
                method: variant.into(),
                elapsed,
                verdict,
                alphabet,
                matches_plaintext,
            });
        }

        log::debug!(
            "{} seed={}: no valid row among {} from {:?} basis",
            instance.params,
            instance.seed,
            reduced.len(),
            variant
        );
    }

    Ok(AttackOutcome {
        recovered: None,
        method: Method::None,
        elapsed,
        verdict: Verdict {
            sum_checked: config.use_sum,
            ..Verdict::default()
        },
        alphabet,
        matches_plaintext: instance.plaintext.as_ref().map(|_| false),
    })
}
