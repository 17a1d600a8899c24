//! # Command Buffer
//!
//! An append-only byte arena holding type-erased commands.
//!
//! ## Safety Note
//!
//! Commands are written in place into raw pages and later read back through
//! monomorphized thunks. All unsafe blocks are confined to this module.
//!
//! ## Record Layout
//!
//! ```text
//! page: ┌──────────────┬─────────────┬──────────────┬─────────────┬───
//!       │ RecordHeader │ payload (T) │ RecordHeader │ payload (U) │ ...
//!       └──────────────┴─────────────┴──────────────┴─────────────┴───
//!        stride, execute::<T>, discard::<T>
//! ```
//!
//! Every record starts on a 16-byte boundary. The header stores the record
//! stride and two function pointers that know the concrete payload type:
//! one moves the payload out and executes it, the other drops it in place.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::{self, NonNull};

use super::BufferConfig;
use crate::sync::BufferIndex;

/// Alignment (and granularity) of every record in a page.
const BLOCK_SIZE: usize = 16;

/// Storage unit of a page. Its alignment is what makes in-place
/// construction of payloads with `align <= 16` sound.
#[allow(dead_code)]
#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Block([u8; BLOCK_SIZE]);

/// Rounds a byte count up to the next block boundary.
const fn round_up(size: usize) -> usize {
    (size + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1)
}

/// Bytes reserved in front of every payload.
const HEADER_SIZE: usize = round_up(mem::size_of::<RecordHeader<()>>());

/// A unit of work executed once by the thread that drains the buffer.
///
/// Implemented for every `FnOnce(&mut C, BufferIndex) + Send` closure, so most
/// call sites never name this trait.
///
/// ```rust,ignore
/// buffer.push(move |scene: &mut SceneGraph, index| scene.connect_node(parent, child, index));
/// ```
pub trait Command<C>: Send {
    /// Consumes the command, applying it to the consumer's context.
    fn execute(self, context: &mut C, buffer_index: BufferIndex);
}

impl<C, F> Command<C> for F
where
    F: FnOnce(&mut C, BufferIndex) + Send,
{
    #[inline]
    fn execute(self, context: &mut C, buffer_index: BufferIndex) {
        self(context, buffer_index);
    }
}

/// Per-record header, written directly in front of the payload.
#[repr(C)]
struct RecordHeader<C> {
    /// Total record size (header + payload), a multiple of `BLOCK_SIZE`.
    stride: usize,
    /// Moves the payload out and runs it.
    execute: unsafe fn(NonNull<u8>, &mut C, BufferIndex),
    /// Drops the payload in place without running it.
    discard: unsafe fn(NonNull<u8>),
}

impl<C> Clone for RecordHeader<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for RecordHeader<C> {}

/// # Safety
///
/// `payload` must point to a live, properly aligned `T` that is never touched
/// again after this call.
unsafe fn execute_record<C, T: Command<C>>(
    payload: NonNull<u8>,
    context: &mut C,
    buffer_index: BufferIndex,
) {
    let command = ptr::read(payload.cast::<T>().as_ptr());
    command.execute(context, buffer_index);
}

/// # Safety
///
/// `payload` must point to a live, properly aligned `T` that is never touched
/// again after this call.
unsafe fn discard_record<T>(payload: NonNull<u8>) {
    ptr::drop_in_place(payload.cast::<T>().as_ptr());
}

/// One contiguous chunk of record storage.
struct Page {
    blocks: Box<[MaybeUninit<Block>]>,
    /// Bytes written so far.
    used: usize,
}

impl Page {
    fn with_capacity(bytes: usize) -> Self {
        let count = bytes.div_ceil(BLOCK_SIZE).max(1);
        Self {
            blocks: vec![MaybeUninit::<Block>::uninit(); count].into_boxed_slice(),
            used: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.blocks.len() * BLOCK_SIZE
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.capacity() - self.used
    }

    #[inline]
    fn base(&mut self) -> *mut u8 {
        self.blocks.as_mut_ptr().cast::<u8>()
    }
}

/// An ordered, paged arena of type-erased commands.
///
/// Written by exactly one thread and drained by exactly one (possibly
/// different) thread. Pages are never reallocated while they hold records, so
/// a record's address is stable from `push` until it is executed or discarded.
///
/// # Example
///
/// ```rust,ignore
/// let mut buffer: CommandBuffer<Vec<&str>> = CommandBuffer::new(BufferConfig::default());
/// buffer.push(|log: &mut Vec<&str>, _| log.push("a"));
/// buffer.push(|log: &mut Vec<&str>, _| log.push("b"));
///
/// let mut log = Vec::new();
/// buffer.process(&mut log, BufferIndex::ZERO);
/// assert_eq!(log, ["a", "b"]);
/// ```
pub struct CommandBuffer<C> {
    pages: Vec<Page>,
    /// Page currently receiving records. Pages after it are empty.
    write_page: usize,
    /// Number of live records.
    count: usize,
    config: BufferConfig,
    _context: PhantomData<fn(&mut C)>,
}

impl<C> CommandBuffer<C> {
    /// Creates a buffer with one baseline page.
    ///
    /// # Panics
    ///
    /// Panics if the page size is zero.
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        assert!(config.page_size > 0, "Page size must be greater than zero");
        Self {
            pages: vec![Page::with_capacity(config.page_size)],
            write_page: 0,
            count: 0,
            config,
            _context: PhantomData,
        }
    }

    /// Returns the sizing this buffer was created with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> BufferConfig {
        self.config
    }

    /// Returns the number of commands waiting to be drained.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true if no commands are waiting.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the bytes occupied by live records.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.pages.iter().map(|page| page.used).sum()
    }

    /// Returns the total bytes allocated across all pages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pages.iter().map(Page::capacity).sum()
    }

    /// Returns the number of allocated pages.
    #[inline]
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Appends a closure command.
    ///
    /// Ownership of everything the closure captures moves into the buffer. If
    /// the buffer is dropped before the command runs, the captures are
    /// dropped with it.
    ///
    /// # Panics
    ///
    /// Panics if the closure needs more than 16-byte alignment.
    #[inline]
    pub fn push<F>(&mut self, command: F)
    where
        F: FnOnce(&mut C, BufferIndex) + Send + 'static,
    {
        self.push_command(command);
    }

    /// Appends a typed command.
    ///
    /// # Panics
    ///
    /// Panics if the command type needs more than 16-byte alignment.
    pub fn push_command<T>(&mut self, command: T)
    where
        T: Command<C> + 'static,
    {
        assert!(
            mem::align_of::<T>() <= BLOCK_SIZE,
            "Command alignment exceeds the {BLOCK_SIZE}-byte record alignment"
        );

        let stride = HEADER_SIZE + round_up(mem::size_of::<T>());
        let slot = self.reserve_slot(stride);
        let header = RecordHeader::<C> {
            stride,
            execute: execute_record::<C, T>,
            discard: discard_record::<T>,
        };

        // SAFETY: `slot` is 16-byte aligned and has `stride` writable bytes,
        // enough for the header followed by a `T` at offset HEADER_SIZE.
        unsafe {
            slot.as_ptr().cast::<RecordHeader<C>>().write(header);
            slot.as_ptr().add(HEADER_SIZE).cast::<T>().write(command);
        }
        self.count += 1;
    }

    /// Reserves `size` bytes (rounded up to a block) at the end of the buffer.
    ///
    /// Moves to the next page, or inserts a new one, if the current page is
    /// too small. Existing records are never moved.
    fn reserve_slot(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(size > 0, "Reserving a zero-size command slot");
        let size = round_up(size.max(1));

        if self.pages.is_empty() {
            self.pages.push(Page::with_capacity(self.config.page_size.max(size)));
            self.write_page = 0;
        }

        while self.pages[self.write_page].remaining() < size {
            let next = self.write_page + 1;
            let next_fits = self
                .pages
                .get(next)
                .is_some_and(|page| page.remaining() >= size);
            if !next_fits {
                let page = Page::with_capacity(self.config.page_size.max(size));
                tracing::trace!(
                    "Command buffer growing by {} bytes (now {} pages)",
                    page.capacity(),
                    self.pages.len() + 1
                );
                self.pages.insert(next, page);
            }
            self.write_page = next;
        }

        let page = &mut self.pages[self.write_page];
        let offset = page.used;
        page.used += size;
        // SAFETY: `offset + size <= capacity`, so the pointer stays in bounds,
        // and a pointer into a live boxed slice is never null.
        unsafe { NonNull::new_unchecked(page.base().add(offset)) }
    }

    /// Starts draining the buffer in insertion order.
    ///
    /// Commands not executed through the returned [`Drain`] are discarded when
    /// it is dropped, after which the buffer is reset.
    pub fn drain(&mut self) -> Drain<'_, C> {
        Drain {
            remaining: self.count,
            buffer: self,
            page: 0,
            offset: 0,
            recycle: true,
        }
    }

    /// Executes every command in insertion order, then resets the buffer.
    ///
    /// Returns the number of commands executed.
    pub fn process(&mut self, context: &mut C, buffer_index: BufferIndex) -> usize {
        let mut drain = self.drain();
        let mut executed = 0;
        while let Some(command) = drain.next_command() {
            command.execute(context, buffer_index);
            executed += 1;
        }
        executed
    }

    /// Destroys every pending command without executing it, then resets.
    pub fn clear(&mut self) {
        drop(self.drain());
    }

    /// Empties the buffer after a drain, keeping its pages unless their
    /// total capacity is above the ceiling.
    fn recycle(&mut self) {
        for page in &mut self.pages {
            page.used = 0;
        }
        self.write_page = 0;
        self.count = 0;

        let capacity = self.capacity();
        if capacity > self.config.max_capacity {
            tracing::debug!(
                "Command buffer capacity {} exceeds ceiling {}, releasing to {}",
                capacity,
                self.config.max_capacity,
                self.config.page_size
            );
            self.pages.clear();
            self.pages.push(Page::with_capacity(self.config.page_size));
        }
    }
}

impl<C> Drop for CommandBuffer<C> {
    fn drop(&mut self) {
        let mut drain = self.drain();
        drain.recycle = false;
    }
}

/// Forward-only cursor over the records of a [`CommandBuffer`].
///
/// Holds the buffer exclusively; dropping it discards whatever was not
/// executed and resets the buffer.
pub struct Drain<'a, C> {
    buffer: &'a mut CommandBuffer<C>,
    page: usize,
    offset: usize,
    remaining: usize,
    recycle: bool,
}

impl<C> Drain<'_, C> {
    /// Returns the number of commands not yet visited.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.remaining
    }

    /// Returns true once every command has been visited.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Yields the next command in insertion order.
    ///
    /// The returned command must be executed or dropped before the next call.
    pub fn next_command(&mut self) -> Option<PendingCommand<'_, C>> {
        self.next_record().map(|(header, payload)| PendingCommand {
            header,
            payload,
            consumed: false,
            _drain: PhantomData,
        })
    }

    /// Advances past the next record, returning its header and payload.
    ///
    /// The cursor moves before the record is handed out, so a record is
    /// visited at most once even if its execution unwinds.
    fn next_record(&mut self) -> Option<(RecordHeader<C>, NonNull<u8>)> {
        while let Some(page) = self.buffer.pages.get_mut(self.page) {
            if self.offset < page.used {
                // SAFETY: `offset` is the start of a record written by `push`
                // and not yet visited; the header is followed by its payload.
                unsafe {
                    let record = page.base().add(self.offset);
                    let header = record.cast::<RecordHeader<C>>().read();
                    self.offset += header.stride;
                    self.remaining -= 1;
                    return Some((header, NonNull::new_unchecked(record.add(HEADER_SIZE))));
                }
            }
            self.page += 1;
            self.offset = 0;
        }
        None
    }
}

impl<C> Drop for Drain<'_, C> {
    fn drop(&mut self) {
        while let Some((header, payload)) = self.next_record() {
            // SAFETY: the record was never executed or discarded.
            unsafe { (header.discard)(payload) };
        }
        if self.recycle {
            self.buffer.recycle();
        } else {
            self.buffer.count = 0;
        }
    }
}

/// A command taken from a [`Drain`], not yet executed.
///
/// Dropping it destroys the command without running it.
pub struct PendingCommand<'d, C> {
    header: RecordHeader<C>,
    payload: NonNull<u8>,
    consumed: bool,
    _drain: PhantomData<&'d mut ()>,
}

impl<C> PendingCommand<'_, C> {
    /// Returns the size of the record in bytes, header included.
    #[inline]
    #[must_use]
    pub const fn record_size(&self) -> usize {
        self.header.stride
    }

    /// Runs the command against the consumer's context.
    pub fn execute(mut self, context: &mut C, buffer_index: BufferIndex) {
        self.consumed = true;
        // SAFETY: the payload is live and, with `consumed` set, is never
        // touched again by this handle.
        unsafe { (self.header.execute)(self.payload, context, buffer_index) };
    }
}

impl<C> Drop for PendingCommand<'_, C> {
    fn drop(&mut self) {
        if !self.consumed {
            // SAFETY: the payload is live and has not been executed.
            unsafe { (self.header.discard)(self.payload) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn small() -> BufferConfig {
        BufferConfig {
            page_size: 256,
            max_capacity: 1024,
        }
    }

    /// Counts how many times it is dropped.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_executes_in_insertion_order() {
        let mut buffer: CommandBuffer<Vec<char>> = CommandBuffer::new(small());
        for name in ['A', 'B', 'C'] {
            buffer.push(move |log: &mut Vec<char>, _| log.push(name));
        }
        assert_eq!(buffer.len(), 3);

        let capacity = buffer.capacity();
        let mut log = Vec::new();
        assert_eq!(buffer.process(&mut log, BufferIndex::ZERO), 3);

        assert_eq!(log, ['A', 'B', 'C']);
        assert!(buffer.is_empty());
        assert_eq!(buffer.byte_size(), 0);
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn test_buffer_index_is_forwarded() {
        let mut buffer: CommandBuffer<Vec<BufferIndex>> = CommandBuffer::new(small());
        buffer.push(|seen: &mut Vec<BufferIndex>, index| seen.push(index));

        let mut seen = Vec::new();
        buffer.process(&mut seen, BufferIndex::ONE);
        assert_eq!(seen, [BufferIndex::ONE]);
    }

    #[test]
    fn test_records_are_block_aligned() {
        let mut buffer: CommandBuffer<()> = CommandBuffer::new(small());
        buffer.push(|(): &mut (), _| {});
        assert_eq!(buffer.byte_size(), HEADER_SIZE);

        let payload = [7u8; 17];
        buffer.push(move |(): &mut (), _| {
            let _ = payload;
        });
        assert_eq!(buffer.byte_size(), 2 * HEADER_SIZE + 32);
        assert_eq!(buffer.byte_size() % BLOCK_SIZE, 0);
    }

    #[test]
    fn test_growth_adds_pages_without_reordering() {
        let mut buffer: CommandBuffer<Vec<usize>> = CommandBuffer::new(small());
        let blob = [0u64; 16];
        for i in 0..40 {
            buffer.push(move |log: &mut Vec<usize>, _| {
                let _ = blob;
                log.push(i);
            });
        }
        assert!(buffer.page_count() > 1);

        let mut log = Vec::new();
        buffer.process(&mut log, BufferIndex::ZERO);
        assert_eq!(log, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversized_record_gets_its_own_page() {
        let mut buffer: CommandBuffer<usize> = CommandBuffer::new(small());
        let big = [1u8; 600];
        buffer.push(move |sum: &mut usize, _| *sum += big.len());

        assert_eq!(buffer.page_count(), 2);
        let mut sum = 0;
        buffer.process(&mut sum, BufferIndex::ZERO);
        assert_eq!(sum, 600);
    }

    #[test]
    fn test_capacity_released_above_ceiling() {
        let mut buffer: CommandBuffer<()> = CommandBuffer::new(small());
        let blob = [0u8; 200];
        for _ in 0..10 {
            buffer.push(move |(): &mut (), _| {
                let _ = blob;
            });
        }
        assert!(buffer.capacity() > small().max_capacity);

        buffer.process(&mut (), BufferIndex::ZERO);
        assert_eq!(buffer.page_count(), 1);
        assert_eq!(buffer.capacity(), small().page_size);
    }

    #[test]
    fn test_capacity_kept_below_ceiling() {
        let mut buffer: CommandBuffer<()> = CommandBuffer::new(small());
        let blob = [0u8; 100];
        for _ in 0..4 {
            buffer.push(move |(): &mut (), _| {
                let _ = blob;
            });
        }
        let grown = buffer.capacity();
        assert!(grown > small().page_size && grown <= small().max_capacity);

        buffer.process(&mut (), BufferIndex::ZERO);
        assert_eq!(buffer.capacity(), grown);
    }

    #[test]
    fn test_capacity_converges_under_bursty_load() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let config = small();
        let mut rng = ChaCha8Rng::seed_from_u64(0xB0257);
        let mut buffer: CommandBuffer<usize> = CommandBuffer::new(config);
        let mut released = 0;

        for _ in 0..500 {
            let burst = if rng.gen_bool(0.2) {
                rng.gen_range(10..40)
            } else {
                rng.gen_range(0..4)
            };
            for _ in 0..burst {
                if rng.gen_bool(0.5) {
                    let blob = [1u8; 100];
                    buffer.push(move |sum: &mut usize, _| *sum += blob.len());
                } else {
                    buffer.push(|sum: &mut usize, _| *sum += 1);
                }
            }

            let before = buffer.capacity();
            let mut sum = 0;
            assert_eq!(buffer.process(&mut sum, BufferIndex::ZERO), burst);

            let after = buffer.capacity();
            if before > config.max_capacity {
                assert_eq!(after, config.page_size);
                assert_eq!(buffer.page_count(), 1);
                released += 1;
            } else {
                assert_eq!(after, before);
            }
            assert!(after <= config.max_capacity);
        }
        assert!(released > 0, "bursts never crossed the ceiling");
    }

    #[test]
    fn test_drop_discards_pending_commands() {
        let drops = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let mut buffer: CommandBuffer<()> = CommandBuffer::new(small());
            for _ in 0..5 {
                let guard = DropCounter(Arc::clone(&drops));
                let runs = Arc::clone(&runs);
                buffer.push(move |(): &mut (), _| {
                    let _guard = guard;
                    runs.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_partial_drain_discards_the_rest() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut buffer: CommandBuffer<usize> = CommandBuffer::new(small());
        for _ in 0..4 {
            let guard = DropCounter(Arc::clone(&drops));
            buffer.push(move |count: &mut usize, _| {
                let _guard = guard;
                *count += 1;
            });
        }

        let mut count = 0;
        {
            let mut drain = buffer.drain();
            drain
                .next_command()
                .expect("first command")
                .execute(&mut count, BufferIndex::ZERO);
            // Skipped: dropped without running.
            drop(drain.next_command());
            assert_eq!(drain.len(), 2);
        }

        assert_eq!(count, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_panicking_command_is_not_destroyed_twice() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut buffer: CommandBuffer<()> = CommandBuffer::new(small());
        for i in 0..3 {
            let guard = DropCounter(Arc::clone(&drops));
            buffer.push(move |(): &mut (), _| {
                let _guard = guard;
                assert!(i != 1, "command {i} failed");
            });
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            buffer.process(&mut (), BufferIndex::ZERO);
        }));

        assert!(result.is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_destroys_without_running() {
        let mut buffer: CommandBuffer<usize> = CommandBuffer::new(small());
        buffer.push(|count: &mut usize, _| *count += 1);
        buffer.clear();

        let mut count = 0;
        assert_eq!(buffer.process(&mut count, BufferIndex::ZERO), 0);
        assert_eq!(count, 0);
    }

    #[test]
    #[should_panic(expected = "Command alignment exceeds")]
    fn test_over_aligned_command_panics() {
        #[repr(align(32))]
        struct Wide([u8; 32]);

        let mut buffer: CommandBuffer<()> = CommandBuffer::new(small());
        let wide = Wide([0; 32]);
        buffer.push(move |(): &mut (), _| {
            let _ = &wide;
        });
    }
}
