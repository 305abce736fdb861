//! Random generator handles. Both algorithm flavors draw from the OS
//! CSPRNG on this platform.

use crate::crypto::random;
use crate::error::SecResult;
use crate::types::RandomAlgorithm;

pub struct RandomHandle {
    algorithm: RandomAlgorithm,
}

impl RandomHandle {
    pub fn new(algorithm: RandomAlgorithm) -> RandomHandle {
        RandomHandle { algorithm }
    }

    pub fn algorithm(&self) -> RandomAlgorithm {
        self.algorithm
    }

    /// Fill `output` with random bytes.
    pub fn process(&mut self, output: &mut [u8]) -> SecResult<()> {
        random::fill_random(output);
        Ok(())
    }

    pub fn release(self) {}
}
