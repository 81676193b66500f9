//! Shared octree node arena.
//!
//! All ten per-resolution octrees draw nodes from one pool created at
//! engine construction. Child links are pool indices, never pointers, and
//! released nodes go onto a free list for reuse.

use parking_lot::Mutex;

/// Index of a node inside the pool arena.
pub type NodeId = u32;

/// Sentinel for "no child".
pub const NULL_NODE: NodeId = u32::MAX;

/// Default number of nodes reserved at startup.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// One octree node. Internal nodes use `children`; leaves (1 cm cells)
/// use `occupied`.
#[derive(Debug, Clone, Copy)]
pub struct OctreeNode {
    pub children: [NodeId; 8],
    pub occupied: bool,
}

impl OctreeNode {
    #[inline]
    pub fn empty() -> Self {
        Self {
            children: [NULL_NODE; 8],
            occupied: false,
        }
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.children.iter().any(|&c| c != NULL_NODE)
    }
}

/// Telemetry counters for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Nodes currently handed out.
    pub allocated: usize,
    /// High-water mark of `allocated`.
    pub peak: usize,
    /// Total arena slots (allocated + free).
    pub capacity: usize,
}

pub(crate) struct PoolInner {
    nodes: Vec<OctreeNode>,
    free_list: Vec<NodeId>,
    allocated: usize,
    peak: usize,
}

impl PoolInner {
    pub(crate) fn alloc(&mut self) -> NodeId {
        let id = match self.free_list.pop() {
            Some(id) => {
                self.nodes[id as usize] = OctreeNode::empty();
                id
            }
            None => {
                let id = self.nodes.len() as NodeId;
                self.nodes.push(OctreeNode::empty());
                id
            }
        };
        self.allocated += 1;
        self.peak = self.peak.max(self.allocated);
        id
    }

    pub(crate) fn release(&mut self, id: NodeId) {
        debug_assert!((id as usize) < self.nodes.len());
        self.allocated -= 1;
        self.free_list.push(id);
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id as usize]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        &mut self.nodes[id as usize]
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated,
            peak: self.peak,
            capacity: self.nodes.capacity(),
        }
    }
}

/// Thread-safe, growable node arena shared across octrees.
pub struct NodePool {
    inner: Mutex<PoolInner>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                nodes: Vec::with_capacity(capacity),
                free_list: Vec::new(),
                allocated: 0,
                peak: 0,
            }),
        }
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, PoolInner> {
        self.inner.lock()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    /// Size in bytes of one arena slot.
    #[inline]
    pub fn node_size_bytes() -> usize {
        std::mem::size_of::<OctreeNode>()
    }
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_release_reuse() {
        let pool = NodePool::with_capacity(4);
        let a = {
            let mut inner = pool.lock();
            let a = inner.alloc();
            let _b = inner.alloc();
            a
        };
        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.stats().peak, 2);

        {
            let mut inner = pool.lock();
            inner.release(a);
        }
        assert_eq!(pool.stats().allocated, 1);

        // Freed slots are reused before the arena grows.
        let c = pool.lock().alloc();
        assert_eq!(c, a);
        assert_eq!(pool.stats().peak, 2);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let pool = NodePool::with_capacity(2);
        let mut inner = pool.lock();
        for _ in 0..100 {
            inner.alloc();
        }
        assert_eq!(inner.stats().allocated, 100);
    }
}
