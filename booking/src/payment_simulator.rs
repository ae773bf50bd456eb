//! Payment code classifier (C7, §4.5).
//!
//! Lives outside the deterministic workflow boundary so it is free to use
//! wall-clock sleeps and a random source directly, unlike the reducer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;

use crate::errors::PaymentError;

/// Trait for payment code validation; a trait (rather than a free function)
/// so tests can substitute a deterministic double.
pub trait PaymentSimulator: Send + Sync {
    /// Validates a payment code, per the classification table in §4.5.
    fn validate(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<(), PaymentError>> + Send + '_>>;
}

/// Default simulator: five-digit format check, two special codes, and a
/// configurable transient-failure rate for everything else.
#[derive(Clone, Debug)]
pub struct DefaultPaymentSimulator {
    failure_probability: f64,
}

impl DefaultPaymentSimulator {
    /// Builds a simulator with the given transient-failure probability
    /// (canonical: 0.15).
    #[must_use]
    pub const fn new(failure_probability: f64) -> Self {
        Self { failure_probability }
    }

    /// Wraps in an `Arc` for sharing across the workflow environment.
    #[must_use]
    pub fn shared(failure_probability: f64) -> Arc<dyn PaymentSimulator> {
        Arc::new(Self::new(failure_probability))
    }
}

fn is_five_digit_code(code: &str) -> bool {
    code.len() == 5 && code.chars().all(|c| c.is_ascii_digit())
}

impl PaymentSimulator for DefaultPaymentSimulator {
    fn validate(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<(), PaymentError>> + Send + '_>> {
        let code = code.to_string();
        let failure_probability = self.failure_probability;
        Box::pin(async move {
            if !is_five_digit_code(&code) {
                return Err(PaymentError::InvalidFormat);
            }
            if code == "00000" {
                return Err(PaymentError::Declined);
            }
            if code == "99999" {
                return Ok(());
            }

            let delay_secs = rand::thread_rng().gen_range(1..=8);
            tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;

            if rand::thread_rng().gen_bool(failure_probability) {
                return Err(PaymentError::GatewayTransient);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_wrong_length_codes() {
        let sim = DefaultPaymentSimulator::new(0.0);
        assert_eq!(sim.validate("1234").await, Err(PaymentError::InvalidFormat));
        assert_eq!(sim.validate("123456").await, Err(PaymentError::InvalidFormat));
    }

    #[tokio::test]
    async fn zero_code_is_declined() {
        let sim = DefaultPaymentSimulator::new(0.0);
        assert_eq!(sim.validate("00000").await, Err(PaymentError::Declined));
    }

    #[tokio::test]
    async fn nines_code_is_instant_success() {
        let sim = DefaultPaymentSimulator::new(1.0);
        assert_eq!(sim.validate("99999").await, Ok(()));
    }

    #[tokio::test]
    async fn failure_probability_one_always_fails() {
        let sim = DefaultPaymentSimulator::new(1.0);
        assert_eq!(sim.validate("12345").await, Err(PaymentError::GatewayTransient));
    }

    #[tokio::test]
    async fn failure_probability_zero_always_succeeds() {
        let sim = DefaultPaymentSimulator::new(0.0);
        assert_eq!(sim.validate("12345").await, Ok(()));
    }
}
