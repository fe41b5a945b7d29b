use std::collections::VecDeque;

use crate::error::{NetplayError, Result};

/// Remote per-frame input samples waiting to be applied.
///
/// Holds up to `2 * delay + 2` samples and starts with `delay` neutral ones,
/// so the first `delay` frames can run before any remote input arrives.
#[derive(Debug, Clone)]
pub struct BattleInputBuffer {
    inputs: VecDeque<u8>,
    capacity: usize,
}

impl BattleInputBuffer {
    pub fn new(input_delay: u32) -> Self {
        let delay = input_delay as usize;
        let capacity = 2 * delay + 2;
        let mut inputs = VecDeque::with_capacity(capacity);
        inputs.extend(std::iter::repeat_n(0, delay));
        Self { inputs, capacity }
    }

    pub fn push(&mut self, input: u8) -> Result<()> {
        if self.inputs.len() >= self.capacity {
            return Err(NetplayError::InputBufferFull);
        }
        self.inputs.push_back(input);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.inputs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
