// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, warn};

use crate::{AppError, AppResult};

/// Small integer naming one live connection, independent of where its state
/// is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionToken(u32);

impl ConnectionToken {
    pub fn new(id: u32) -> Self {
        ConnectionToken(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed pool of connection tokens, always handing out the smallest free one.
#[derive(Debug)]
pub struct TokenGenerator {
    capacity: u32,
    free: BTreeSet<u32>,
}

impl TokenGenerator {
    pub fn new(capacity: u32) -> Self {
        TokenGenerator {
            capacity,
            free: (0..capacity).collect(),
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn acquire(&mut self) -> AppResult<ConnectionToken> {
        let id = self.free.pop_first().ok_or(AppError::OutOfTokens {
            capacity: self.capacity,
        })?;
        debug!("issued connection token {}", id);
        Ok(ConnectionToken(id))
    }

    /// Returns `token` to the pool. The caller owns the token until this call;
    /// releasing a token that is not held is a bookkeeping bug.
    pub fn release(&mut self, token: ConnectionToken) {
        let returned = token.0 < self.capacity && self.free.insert(token.0);
        if !returned {
            warn!("release of connection token {} that was not issued", token);
        }
        debug_assert!(returned, "token {} released while not held", token);
        debug!("released connection token {}", token.0);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::Rng;

    use super::*;

    #[test]
    fn test_acquire_smallest_first() -> AppResult<()> {
        let mut generator = TokenGenerator::new(4);
        assert_eq!(generator.acquire()?.id(), 0);
        assert_eq!(generator.acquire()?.id(), 1);
        generator.release(ConnectionToken::new(0));
        assert_eq!(generator.acquire()?.id(), 0);
        assert_eq!(generator.acquire()?.id(), 2);
        Ok(())
    }

    #[test]
    fn test_out_of_tokens() -> AppResult<()> {
        let mut generator = TokenGenerator::new(2);
        generator.acquire()?;
        generator.acquire()?;
        match generator.acquire() {
            Err(AppError::OutOfTokens { capacity }) => assert_eq!(capacity, 2),
            other => panic!("expected OutOfTokens, got {:?}", other),
        }
        assert_eq!(generator.available(), 0);
        Ok(())
    }

    #[test]
    fn test_held_tokens_stay_unique() -> AppResult<()> {
        let mut rng = rand::thread_rng();
        let mut generator = TokenGenerator::new(16);
        let mut held: Vec<ConnectionToken> = Vec::new();

        for _ in 0..2_000 {
            let acquire = held.is_empty() || (held.len() < 16 && rng.gen_bool(0.6));
            if acquire {
                held.push(generator.acquire()?);
            } else {
                let index = rng.gen_range(0..held.len());
                generator.release(held.swap_remove(index));
            }
            let distinct: HashSet<_> = held.iter().collect();
            assert_eq!(distinct.len(), held.len());
            assert_eq!(generator.available() + held.len(), 16);
        }
        Ok(())
    }
}
