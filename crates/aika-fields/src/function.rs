// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field combinators and their arity contracts.

/// Single-argument activation functions.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ActivationFn {
    /// Logistic sigmoid, input clamped to `±500` before exponentiation.
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
    /// `max(0, x)`.
    Relu,
    /// `x` for positive inputs, `alpha * x` otherwise.
    LeakyRelu {
        /// Slope applied to negative inputs.
        alpha: f64,
    },
}

impl ActivationFn {
    /// Leaky ReLU with the customary `0.01` slope.
    pub const LEAKY_RELU: Self = Self::LeakyRelu { alpha: 0.01 };

    /// Applies the function.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sigmoid => 1.0 / (1.0 + (-x.clamp(-500.0, 500.0)).exp()),
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.0),
            Self::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
        }
    }
}

/// Comparison used by [`Combinator::Threshold`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Comparison {
    /// `x > threshold`.
    Above,
    /// `x < threshold`.
    Below,
    /// `x <= threshold`.
    BelowOrEqual,
    /// `|x| > threshold`.
    AboveAbs,
}

/// How a field combines the contributions arriving on its input links.
#[derive(Clone, Copy, Debug)]
pub enum Combinator {
    /// Adds every incoming delta. Variable arity.
    Sum,
    /// Product of two arguments.
    Mul,
    /// `arg0 / arg1`; a zero divisor yields `0`.
    Div,
    /// Competitive argmax over all inputs. Variable arity.
    Max,
    /// Mirrors its single argument.
    Identity,
    /// `e^arg0`.
    Exp,
    /// Applies an activation function to its single argument.
    Activation(ActivationFn),
    /// Emits `1.0` when the comparison holds, else `0.0`.
    Threshold {
        /// Comparison boundary.
        threshold: f64,
        /// Comparison kind.
        comparison: Comparison,
        /// Once the output exceeds `0.5` it never changes again.
        is_final: bool,
    },
    /// Caller-supplied single-argument function.
    Custom(fn(f64) -> f64),
}

impl Combinator {
    /// Number of argument positions, or `None` for variable arity.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Sum | Self::Max => None,
            Self::Mul | Self::Div => Some(2),
            Self::Identity
            | Self::Exp
            | Self::Activation(_)
            | Self::Threshold { .. }
            | Self::Custom(_) => Some(1),
        }
    }

    /// Evaluates a fixed-arity combinator.
    ///
    /// `current` is the field's committed value, consulted by final
    /// thresholds. Variable-arity combinators are not evaluated here and
    /// return `current` unchanged.
    pub fn evaluate(&self, args: &[f64], current: f64) -> f64 {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0.0);
        match *self {
            Self::Sum | Self::Max => current,
            Self::Mul => arg(0) * arg(1),
            Self::Div => {
                let divisor = arg(1);
                if divisor == 0.0 {
                    0.0
                } else {
                    arg(0) / divisor
                }
            }
            Self::Identity => arg(0),
            Self::Exp => arg(0).exp(),
            Self::Activation(f) => f.apply(arg(0)),
            Self::Threshold {
                threshold,
                comparison,
                is_final,
            } => {
                if is_final && current > 0.5 {
                    return current;
                }
                let x = arg(0);
                let hit = match comparison {
                    Comparison::Above => x > threshold,
                    Comparison::Below => x < threshold,
                    Comparison::BelowOrEqual => x <= threshold,
                    Comparison::AboveAbs => x.abs() > threshold,
                };
                if hit {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Custom(f) => f(arg(0)),
        }
    }

    pub(crate) fn code(&self) -> u8 {
        match self {
            Self::Sum => 0,
            Self::Mul => 1,
            Self::Div => 2,
            Self::Max => 3,
            Self::Identity => 4,
            Self::Exp => 5,
            Self::Activation(_) => 6,
            Self::Threshold { .. } => 7,
            Self::Custom(_) => 8,
        }
    }
}
