use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// What happens to a message once its processing attempt is over. Both
/// outcomes end with the delivery being acknowledged on the source queue;
/// a rejected message is forwarded to the dead-letter sink first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Reject,
}

pub fn decide(handler_succeeded: bool, injected_failure: bool) -> Outcome {
    if handler_succeeded && !injected_failure {
        Outcome::Accept
    } else {
        Outcome::Reject
    }
}

/// Simulates an unavailable downstream. Consulted once per decoded message,
/// before the handler runs.
pub trait FailureInjector: Send {
    fn should_fail(&mut self) -> bool;
}

impl<F: FailureInjector + ?Sized> FailureInjector for Box<F> {
    fn should_fail(&mut self) -> bool {
        (**self).should_fail()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverFail;

impl FailureInjector for NeverFail {
    fn should_fail(&mut self) -> bool {
        false
    }
}

/// Fails each attempt independently with probability `rate`. The generator is
/// seeded explicitly so a run can be reproduced.
#[derive(Debug, Clone)]
pub struct RandomFailure {
    rng: StdRng,
    rate: f64,
}

impl RandomFailure {
    pub fn seeded(rate: f64, seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(Error::Config(format!(
                "failure rate must be within [0, 1], got {rate}"
            )));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            rate,
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl FailureInjector for RandomFailure {
    fn should_fail(&mut self) -> bool {
        self.rng.gen_bool(self.rate)
    }
}
