use crate::program::Value;

use super::{VmError, VmResult};

/// LIFO container. The data stack holds values, the return stack addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack<T = Value> {
    items: Vec<T>,
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Stack { items: Vec::new() }
    }
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Stack::default()
    }

    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    pub fn pop(&mut self) -> VmResult<T> {
        self.items.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn top(&self) -> VmResult<&T> {
        self.items.last().ok_or(VmError::StackUnderflow)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate from the most recently pushed element down.
    pub fn iter_top_first(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }

    /// Bottom-first view of the contents.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T> From<Vec<T>> for Stack<T> {
    fn from(items: Vec<T>) -> Self {
        Stack { items }
    }
}
