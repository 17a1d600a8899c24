//! # Fixed-Size Pool
//!
//! Paged slot allocator for scene-graph objects (nodes, renderers).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::PoolConfig;

/// A pool allocator for objects of one type.
///
/// Slots are handed out from a LIFO free list first and from the unused tail
/// of the newest page second. When every page is full a new page is added
/// whose capacity doubles the previous one, up to
/// [`PoolConfig::max_block_capacity`]. Pages are never reallocated, so a live
/// object never moves.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It belongs to the update thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: FixedSizePool<Node> = FixedSizePool::new(PoolConfig::default());
///
/// let handle = pool.allocate(Node::new(id));
/// pool.free(handle);
/// assert!(pool.get(handle).is_none()); // stale handles resolve to nothing
/// ```
pub struct FixedSizePool<T> {
    /// Slot pages; page `i` holds global indices starting at `page_starts[i]`.
    pages: Vec<Box<[Slot<T>]>>,
    /// First global index of every page.
    page_starts: Vec<u32>,
    /// Indices of freed slots, reused most-recent first.
    free_list: Vec<u32>,
    /// First global index never handed out.
    next_unused: u32,
    /// Total slots across all pages.
    capacity: usize,
    /// Number of live objects.
    allocated_count: usize,
    /// Size of the next page to allocate.
    next_page_capacity: usize,
    config: PoolConfig,
}

/// One pool slot.
struct Slot<T> {
    value: Option<T>,
    /// Bumped on every free so old handles stop resolving.
    generation: u32,
}

impl<T> Slot<T> {
    const fn empty() -> Self {
        Self {
            value: None,
            generation: 0,
        }
    }
}

/// Generation-checked handle to an object in a [`FixedSizePool`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Null/invalid handle.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
        _marker: PhantomData,
    };

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation the slot had when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Checks if this handle is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> FixedSizePool<T> {
    /// Creates a pool with its first page pre-allocated.
    ///
    /// # Panics
    ///
    /// Panics if either capacity in `config` is zero.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        assert!(config.initial_capacity > 0, "Capacity must be greater than zero");
        assert!(
            config.max_block_capacity > 0,
            "Block capacity must be greater than zero"
        );

        let mut pool = Self {
            pages: Vec::new(),
            page_starts: Vec::new(),
            free_list: Vec::new(),
            next_unused: 0,
            capacity: 0,
            allocated_count: 0,
            next_page_capacity: config.initial_capacity.min(config.max_block_capacity),
            config,
        };
        pool.grow();
        pool
    }

    /// Returns the growth policy.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> PoolConfig {
        self.config
    }

    /// Returns the total number of slots across all pages.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of live objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns true if no objects are live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Returns the number of allocated pages.
    #[inline]
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Stores `value` in a free slot and returns its handle.
    ///
    /// This is **O(1)** amortized; a new page is allocated only when every
    /// existing slot is live.
    ///
    /// # Panics
    ///
    /// Panics if the pool would exceed `u32::MAX - 1` slots. Running out of
    /// slots is not recoverable.
    pub fn allocate(&mut self, value: T) -> Handle<T> {
        let index = if let Some(index) = self.free_list.pop() {
            index
        } else {
            if self.next_unused as usize == self.capacity {
                self.grow();
            }
            let index = self.next_unused;
            self.next_unused += 1;
            index
        };

        let slot = self.slot_mut(index);
        debug_assert!(slot.value.is_none(), "Pool slot {index} handed out twice");
        slot.value = Some(value);
        let generation = slot.generation;
        self.allocated_count += 1;

        Handle {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Allocates a slot holding `T::default()`.
    pub fn allocate_default(&mut self) -> Handle<T>
    where
        T: Default,
    {
        self.allocate(T::default())
    }

    /// Allocates a slot holding an all-zero `T`.
    pub fn allocate_zeroed(&mut self) -> Handle<T>
    where
        T: bytemuck::Zeroable,
    {
        self.allocate(T::zeroed())
    }

    /// Frees an object, invalidating every copy of its handle.
    ///
    /// Freeing a null, stale or foreign handle is a programmer error: it
    /// asserts in debug builds and returns `None` otherwise.
    pub fn free(&mut self, handle: Handle<T>) -> Option<T> {
        debug_assert!(
            self.contains(handle),
            "Freeing {handle:?}, which is not live in this pool"
        );
        if !self.contains(handle) {
            return None;
        }

        let slot = self.slot_mut(handle.index);
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.allocated_count -= 1;
        value
    }

    /// Returns true if `handle` refers to a live object.
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Gets a reference to a live object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.index >= self.next_unused {
            return None;
        }
        let slot = self.slot(handle.index);
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to a live object.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if handle.index >= self.next_unused {
            return None;
        }
        let slot = self.slot_mut(handle.index);
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Frees every object. Outstanding handles stop resolving.
    pub fn clear(&mut self) {
        for page in &mut self.pages {
            for slot in page.iter_mut() {
                if slot.value.take().is_some() {
                    slot.generation = slot.generation.wrapping_add(1);
                }
            }
        }
        self.free_list.clear();
        self.free_list.extend((0..self.next_unused).rev());
        self.allocated_count = 0;
    }

    /// Iterates over live objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.page_starts
            .iter()
            .zip(&self.pages)
            .flat_map(|(&start, page)| {
                page.iter().enumerate().filter_map(move |(offset, slot)| {
                    slot.value.as_ref().map(|value| {
                        (
                            Handle {
                                index: start + offset as u32,
                                generation: slot.generation,
                                _marker: PhantomData,
                            },
                            value,
                        )
                    })
                })
            })
    }

    /// Iterates mutably over live objects in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.page_starts
            .iter()
            .zip(&mut self.pages)
            .flat_map(|(&start, page)| {
                page.iter_mut().enumerate().filter_map(move |(offset, slot)| {
                    let generation = slot.generation;
                    slot.value.as_mut().map(|value| {
                        (
                            Handle {
                                index: start + offset as u32,
                                generation,
                                _marker: PhantomData,
                            },
                            value,
                        )
                    })
                })
            })
    }

    /// Adds a page of `next_page_capacity` slots.
    fn grow(&mut self) {
        let page_capacity = self.next_page_capacity;
        assert!(
            self.capacity + page_capacity < u32::MAX as usize,
            "Pool exhausted: cannot address more than {} slots",
            u32::MAX - 1
        );

        let page: Vec<Slot<T>> = (0..page_capacity).map(|_| Slot::empty()).collect();
        self.page_starts.push(self.capacity as u32);
        self.pages.push(page.into_boxed_slice());
        self.capacity += page_capacity;
        self.next_page_capacity = (page_capacity * 2).min(self.config.max_block_capacity);

        tracing::trace!(
            "Pool grew by {} slots to {} ({} pages)",
            page_capacity,
            self.capacity,
            self.pages.len()
        );
    }

    /// Maps a global index to `(page, offset)`.
    #[inline]
    fn locate(&self, index: u32) -> (usize, usize) {
        let page = self.page_starts.partition_point(|&start| start <= index) - 1;
        (page, (index - self.page_starts[page]) as usize)
    }

    #[inline]
    fn slot(&self, index: u32) -> &Slot<T> {
        let (page, offset) = self.locate(index);
        &self.pages[page][offset]
    }

    #[inline]
    fn slot_mut(&mut self, index: u32) -> &mut Slot<T> {
        let (page, offset) = self.locate(index);
        &mut self.pages[page][offset]
    }
}
