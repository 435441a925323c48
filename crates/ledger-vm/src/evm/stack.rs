//! # Word Stack
//!
//! Operand stack of one call frame. Index 0 is the top.

use crate::domain::value_objects::U256;
use crate::errors::VmError;

/// Depth limit of a frame's stack unless configured otherwise.
pub const MAX_STACK_SIZE: usize = 1024;

/// Bounded stack of words.
#[derive(Clone, Debug)]
pub struct Stack {
    words: Vec<U256>,
    limit: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self::with_limit(MAX_STACK_SIZE)
    }
}

impl Stack {
    /// Empty stack bounded by [`MAX_STACK_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty stack bounded by `limit`.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            words: Vec::with_capacity(limit.min(64)),
            limit,
        }
    }

    /// Words currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True with no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Fails with `StackUnderflow` unless `n` words are present.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn require(&self, n: usize) -> Result<(), VmError> {
        if self.words.len() < n {
            return Err(VmError::StackUnderflow);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `StackOverflow` at the limit.
    pub fn push(&mut self, word: U256) -> Result<(), VmError> {
        if self.words.len() == self.limit {
            return Err(VmError::StackOverflow);
        }
        self.words.push(word);
        Ok(())
    }

    /// Pushes the EVM boolean encoding of `flag`.
    ///
    /// # Errors
    ///
    /// `StackOverflow` at the limit.
    pub fn push_bool(&mut self, flag: bool) -> Result<(), VmError> {
        self.push(U256::from(u8::from(flag)))
    }

    /// # Errors
    ///
    /// `StackUnderflow` when empty.
    pub fn pop(&mut self) -> Result<U256, VmError> {
        self.words.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pops `N` words; element 0 of the result was the top.
    ///
    /// # Errors
    ///
    /// `StackUnderflow`, leaving the stack as it was.
    pub fn pop_n<const N: usize>(&mut self) -> Result<[U256; N], VmError> {
        self.require(N)?;
        let split = self.words.len() - N;
        let mut popped = [U256::zero(); N];
        for (slot, word) in popped.iter_mut().zip(self.words.drain(split..).rev()) {
            *slot = word;
        }
        Ok(popped)
    }

    /// Word `depth` positions below the top.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` past the bottom.
    pub fn peek_at(&self, depth: usize) -> Result<U256, VmError> {
        self.index(depth).map(|i| self.words[i])
    }

    /// SWAPn: exchanges the top with the word `n` below it.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` for `n == 0` or past the bottom.
    pub fn swap(&mut self, n: usize) -> Result<(), VmError> {
        if n == 0 {
            return Err(VmError::StackUnderflow);
        }
        let other = self.index(n)?;
        let top = self.words.len() - 1;
        self.words.swap(top, other);
        Ok(())
    }

    /// DUP(n+1): pushes a copy of the word at `depth`.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` past the bottom, `StackOverflow` at the limit.
    pub fn dup(&mut self, depth: usize) -> Result<(), VmError> {
        let word = self.peek_at(depth)?;
        self.push(word)
    }

    fn index(&self, depth: usize) -> Result<usize, VmError> {
        self.words
            .len()
            .checked_sub(depth + 1)
            .ok_or(VmError::StackUnderflow)
    }
}
