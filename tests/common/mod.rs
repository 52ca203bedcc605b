//! Shared helpers for the integration tests.
//!
//! The algorithm selector is process-wide, so every test binary pins one
//! algorithm before its first transaction and sticks with it.

#![allow(dead_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use petek::{abi, atomically, Abort};

static SELECT: Once = Once::new();

/// Pin the binary's algorithm. Safe to call from every test.
pub fn select_algorithm(name: &str) {
    SELECT.call_once(|| petek::set_algorithm(name).unwrap());
    assert_eq!(petek::current_algorithm(), name);
}

/// A heap array of words that transactions address by raw pointer.
pub struct SharedWords {
    cells: Box<[UnsafeCell<usize>]>,
}

unsafe impl Sync for SharedWords {}

impl SharedWords {
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| UnsafeCell::new(0)).collect(),
        }
    }

    pub fn with_value(len: usize, val: usize) -> Self {
        Self {
            cells: (0..len).map(|_| UnsafeCell::new(val)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn ptr(&self, i: usize) -> *mut usize {
        self.cells[i].get()
    }

    /// Non-transactional read for quiescent assertions.
    pub fn peek(&self, i: usize) -> usize {
        unsafe { (*(self.cells[i].get() as *const AtomicUsize)).load(Ordering::SeqCst) }
    }
}

pub fn tx_read(addr: *mut usize) -> Result<usize, Abort> {
    unsafe { abi::read_word(addr) }
}

pub fn tx_write(addr: *mut usize, val: usize) -> Result<(), Abort> {
    unsafe { abi::write_word(addr, val) }
}

/// Increment one shared word inside a transaction.
pub fn incr(addr: *mut usize) {
    atomically(|| {
        let v = tx_read(addr)?;
        tx_write(addr, v + 1)
    });
}

/// Transactional sum over the whole array.
pub fn sum(words: &SharedWords) -> usize {
    atomically(|| {
        let mut total = 0;
        for i in 0..words.len() {
            total += tx_read(words.ptr(i))?;
        }
        Ok(total)
    })
}
