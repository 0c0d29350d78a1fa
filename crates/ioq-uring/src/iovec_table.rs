/// Aligned array of I/O-vector structures, one entry per concurrently
/// submittable read/write op (§3). Capacity is fixed at construction;
/// slots are handed out with a free-list stack, matching the operation
/// pool's own stack discipline (§4.2).
#[repr(align(8))]
pub struct IovecTable {
    slots: Box<[libc::iovec]>,
    free: Vec<usize>,
}

// `libc::iovec` holds a raw pointer, which makes it `!Send` by default;
// the pointers only ever reference memory owned by `IoBuf`s that are
// themselves moved across threads via `Send` callbacks, and the table
// itself is only ever touched from the single I/O thread.
unsafe impl Send for IovecTable {}

impl IovecTable {
    pub fn new(capacity: usize) -> Self {
        let slots = vec![
            libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            };
            capacity
        ]
        .into_boxed_slice();
        let free = (0..capacity).rev().collect();
        Self { slots, free }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Reserve a slot and point it at `ptr[..len]`. The caller (the
    /// execution queue, while encoding a submission) is responsible for
    /// keeping the backing buffer alive until the slot is released.
    pub fn acquire(&mut self, ptr: *mut u8, len: usize) -> Option<usize> {
        let idx = self.free.pop()?;
        self.slots[idx] = libc::iovec {
            iov_base: ptr as *mut libc::c_void,
            iov_len: len,
        };
        Some(idx)
    }

    pub fn release(&mut self, idx: usize) {
        debug_assert!(idx < self.slots.len());
        self.free.push(idx);
    }

    /// Raw pointer to the iovec at `idx`, to embed directly into a
    /// `Readv`/`Writev` SQE.
    pub fn ptr(&self, idx: usize) -> *const libc::iovec {
        &self.slots[idx] as *const libc::iovec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_round_trip() {
        let mut table = IovecTable::new(2);
        assert_eq!(table.free_count(), 2);

        let mut buf = [0u8; 4];
        let a = table.acquire(buf.as_mut_ptr(), buf.len()).unwrap();
        assert_eq!(table.free_count(), 1);

        let b = table.acquire(buf.as_mut_ptr(), buf.len()).unwrap();
        assert_eq!(table.free_count(), 0);
        assert!(table.acquire(buf.as_mut_ptr(), buf.len()).is_none());

        table.release(a);
        assert_eq!(table.free_count(), 1);
        table.release(b);
        assert_eq!(table.free_count(), 2);
    }

    #[test]
    fn acquired_slot_reflects_pointer_and_len() {
        let mut table = IovecTable::new(1);
        let mut buf = [1u8, 2, 3];
        let idx = table.acquire(buf.as_mut_ptr(), buf.len()).unwrap();
        let iov = unsafe { &*table.ptr(idx) };
        assert_eq!(iov.iov_len, 3);
        assert_eq!(iov.iov_base as *const u8, buf.as_ptr());
    }
}
