use crate::operation::OperationRecord;

/// Stack-discipline free list for `OperationRecord`s (§4.2). `rent` pops or
/// allocates; `release` clears and pushes. No size cap: the pool is bounded
/// by peak concurrency, same as the source system.
#[derive(Default)]
pub struct OperationPool {
    free: Vec<OperationRecord>,
}

impl OperationPool {
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    pub fn rent(&mut self) -> OperationRecord {
        self.free.pop().unwrap_or_else(OperationRecord::empty)
    }

    pub fn release(&mut self, mut record: OperationRecord) {
        record.reset();
        self.free.push(record);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.free.len()
    }
}
