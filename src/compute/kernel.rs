//! kernel.rs
//! Element-wise transforms and mixers over aligned series.

use super::ledger::Series;
use crate::data::MISSING;
use crate::error::{ForecastError, Result};
use crate::store::{MixerOp, TransformMethod};
use std::f64::consts::PI;

/// Applies a unary transform. Output length always equals input length.
pub fn apply_transform(x: &[f64], method: TransformMethod) -> Vec<f64> {
    match method {
        TransformMethod::Identity => x.to_vec(),
        TransformMethod::Sine { period } => x.iter().map(|v| (2.0 * PI * v / period).sin()).collect(),
        TransformMethod::Cosine { period } => x.iter().map(|v| (2.0 * PI * v / period).cos()).collect(),
        TransformMethod::Exponent => x.iter().map(|v| v.exp_m1()).collect(),
        TransformMethod::Log => x.iter().map(|v| v.ln_1p()).collect(),
        TransformMethod::Power { exponent } => x.iter().map(|v| v.powf(exponent)).collect(),
        TransformMethod::Lag { periods } => lag(x, periods),
    }
}

/// Shifts values `periods` positions later (earlier when negative); vacated
/// positions are missing.
pub fn lag(x: &[f64], periods: i64) -> Vec<f64> {
    let n = x.len();
    let shift = periods.unsigned_abs() as usize;
    let mut out = vec![MISSING; n];
    if shift >= n {
        return out;
    }
    if periods >= 0 {
        out[shift..].copy_from_slice(&x[..n - shift]);
    } else {
        out[..n - shift].copy_from_slice(&x[shift..]);
    }
    out
}

/// Combines operands in declared order. Add folds any number of operands
/// from zero; the others take exactly two. Division by zero is missing.
pub fn apply_mixer(node: &str, operator: MixerOp, operands: &[Series], len: usize) -> Result<Vec<f64>> {
    if let Some(expected) = operator.arity() {
        if operands.len() != expected {
            return Err(ForecastError::OperandCountMismatch {
                node: node.to_string(),
                operator: operator.name().to_string(),
                expected,
                actual: operands.len(),
            });
        }
    }

    let out = match operator {
        MixerOp::Add => {
            let mut acc = vec![0.0; len];
            for operand in operands {
                for (a, v) in acc.iter_mut().zip(operand.iter()) {
                    *a += v;
                }
            }
            acc
        }
        MixerOp::Subtract => zip_with(&operands[0], &operands[1], |a, b| a - b),
        MixerOp::Multiply => zip_with(&operands[0], &operands[1], |a, b| a * b),
        MixerOp::Divide => zip_with(&operands[0], &operands[1], |a, b| if b == 0.0 { MISSING } else { a / b }),
    };
    Ok(out)
}

fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}
