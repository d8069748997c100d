/// Hard cap on parts per transfer; the auto part size grows until the plan
/// fits.
pub(crate) const MAX_PART_COUNT: u64 = 10_000;

/// Base part size the auto selection doubles up from.
pub(crate) const DEFAULT_PART_SIZE: u64 = 1 << 20;

/// One contiguous byte range of a transfer.
///
/// A chunk is owned by its transfer; `done` and `etag` are written exactly
/// once, by the worker that completes the chunk, and only a checkpoint
/// mismatch resets them (all together, never one by one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based, contiguous chunk number.
    pub number: u32,
    /// First byte of the range.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
    /// Whether this chunk already completed.
    pub done: bool,
    /// Entity tag assigned by the service, once done.
    pub etag: Option<String>,
}

/// Pick the effective part size: the requested one (or the base size when
/// unset), doubled until the plan stays under [`MAX_PART_COUNT`] parts.
pub(crate) fn auto_part_size(total: u64, requested: u64) -> u64 {
    let mut size = if requested == 0 {
        DEFAULT_PART_SIZE
    } else {
        requested
    };
    while total.div_ceil(size) > MAX_PART_COUNT {
        size *= 2;
    }
    size
}

/// Deterministically split `total` bytes into ordered chunks of `part_size`,
/// the last chunk taking the remainder.
pub(crate) fn plan_chunks(total: u64, part_size: u64) -> Vec<Chunk> {
    debug_assert!(part_size > 0);

    let mut chunks = Vec::with_capacity(total.div_ceil(part_size.max(1)) as usize);
    let mut offset = 0;
    let mut number = 1;
    while offset < total {
        let size = part_size.min(total - offset);
        chunks.push(Chunk {
            number,
            offset,
            size,
            done: false,
            etag: None,
        });
        offset += size;
        number += 1;
    }
    chunks
}
