use liefactor_core::Real;
use serde::{Deserialize, Serialize};

/// Robust loss applied to the squared norm of a whitened residual block.
///
/// The block cost is `½ ρ(s)` with `s = |r|²`. Losses are applied by iteratively
/// re-weighted least squares: residual and Jacobian rows of the block are scaled by
/// `sqrt(ρ'(s))` before the linear solve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustLoss {
    /// Pure L2: `ρ(s) = s`.
    #[default]
    None,
    /// Quadratic below `scale`, linear above.
    Huber { scale: Real },
    /// `ρ(s) = c² ln(1 + s / c²)` with `c = scale`.
    Cauchy { scale: Real },
    /// `ρ(s) = a atan(s / a)` with `a = scale²`; bounded above by `a π / 2`.
    Arctan { scale: Real },
}

impl RobustLoss {
    /// Return `ρ(s)` and the IRLS weight `ρ'(s)` for a squared residual norm `s`.
    pub fn rho_and_weight(self, s: Real) -> (Real, Real) {
        match self {
            RobustLoss::None => (s, 1.0),
            RobustLoss::Huber { scale } => {
                let r = s.sqrt();
                if r <= scale {
                    (s, 1.0)
                } else {
                    (2.0 * scale * r - scale * scale, scale / r)
                }
            }
            RobustLoss::Cauchy { scale } => {
                let c2 = scale * scale;
                let t = s / c2;
                (c2 * (1.0 + t).ln(), 1.0 / (1.0 + t))
            }
            RobustLoss::Arctan { scale } => {
                let a = scale * scale;
                let t = s / a;
                (a * t.atan(), 1.0 / (1.0 + t * t))
            }
        }
    }

    /// `true` when the loss parameters are usable.
    pub fn is_valid(self) -> bool {
        match self {
            RobustLoss::None => true,
            RobustLoss::Huber { scale }
            | RobustLoss::Cauchy { scale }
            | RobustLoss::Arctan { scale } => scale.is_finite() && scale > 0.0,
        }
    }
}
