// src/task/scratch.rs

//! Fixed-capacity per-task scratch region.
//!
//! The region serves two purposes at once:
//! - an embedded parameter block growing from the front of the buffer, and
//! - a LIFO stack growing from the back, used to carry transient state across
//!   the several invocations a body may get through `reinit`.
//!
//! All sizes are rounded up to 8 bytes. The two regions share the capacity and
//! may never overlap.

use crate::errors::{Result, SchedError};

const SCRATCH_ALIGN: usize = 8;

fn aligned(size: usize) -> usize {
    size.div_ceil(SCRATCH_ALIGN) * SCRATCH_ALIGN
}

#[derive(Debug)]
pub(crate) struct Scratch {
    buf: Box<[u8]>,
    embed_top: usize,
    stack_top: usize,
}

impl Scratch {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            embed_top: 0,
            stack_top: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn stack_top(&self) -> usize {
        self.stack_top
    }

    /// Size the embedded block to `size` bytes (rounded) and return it.
    pub(crate) fn embedded(&mut self, size: usize) -> Result<&mut [u8]> {
        let rounded = aligned(size);
        let available = self.capacity() - self.stack_top;
        if rounded > available {
            return Err(SchedError::InsufficientScratch {
                requested: rounded,
                available,
            });
        }
        self.embed_top = rounded;
        Ok(&mut self.buf[..size])
    }

    pub(crate) fn push(&mut self, data: &[u8]) -> Result<()> {
        let rounded = aligned(data.len());
        let available = self.capacity() - (self.stack_top + self.embed_top);
        if rounded > available {
            return Err(SchedError::InsufficientScratch {
                requested: rounded,
                available,
            });
        }

        self.stack_top += rounded;
        let start = self.capacity() - self.stack_top;
        self.buf[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn pop(&mut self, out: &mut [u8]) -> Result<()> {
        let rounded = aligned(out.len());
        if rounded > self.stack_top {
            return Err(SchedError::InsufficientScratch {
                requested: rounded,
                available: self.stack_top,
            });
        }

        let start = self.capacity() - self.stack_top;
        out.copy_from_slice(&self.buf[start..start + out.len()]);
        self.stack_top -= rounded;
        Ok(())
    }

    /// Drop everything on the stack, returning the previous stack size.
    pub(crate) fn reset_stack(&mut self) -> usize {
        std::mem::replace(&mut self.stack_top, 0)
    }
}
