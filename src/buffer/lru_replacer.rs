use log::warn;
use parking_lot::Mutex;

use crate::common::{FrameId, INVALID_FRAME_ID};

/// Replacer tracks which frames are eligible for eviction and picks a victim
/// among them.
///
/// Frames enter the replacer when their pin count drops to zero (`unpin`) and
/// leave it when they are pinned again or chosen as a victim. Implementations
/// are internally synchronized.
pub trait Replacer: Send + Sync {
    /// Removes and returns the frame to evict, or None if nothing is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Marks a frame as in use. It is no longer a candidate for eviction.
    fn pin(&self, frame_id: FrameId);

    /// Marks a frame as evictable. A frame that is already tracked keeps its position.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    prev: u32,
    next: u32,
    linked: bool,
}

impl Node {
    const UNLINKED: Node = Node {
        prev: NIL,
        next: NIL,
        linked: false,
    };
}

/// Intrusive doubly linked list over frame ids. Nodes live in a fixed arena
/// indexed by frame id, so membership checks, unlinking and pushing are all O(1).
#[derive(Debug)]
struct LruList {
    nodes: Vec<Node>,
    /// Most recently unpinned
    head: u32,
    /// Least recently unpinned
    tail: u32,
    len: usize,
}

impl LruList {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: vec![Node::UNLINKED; capacity],
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    fn contains(&self, idx: u32) -> bool {
        self.nodes
            .get(idx as usize)
            .map_or(false, |node| node.linked)
    }

    fn push_front(&mut self, idx: u32) {
        self.nodes[idx as usize] = Node {
            prev: NIL,
            next: self.head,
            linked: true,
        };
        if self.head != NIL {
            self.nodes[self.head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
        self.len += 1;
    }

    fn unlink(&mut self, idx: u32) {
        let Node { prev, next, .. } = self.nodes[idx as usize];

        if prev != NIL {
            self.nodes[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }

        self.nodes[idx as usize] = Node::UNLINKED;
        self.len -= 1;
    }

    fn pop_back(&mut self) -> Option<u32> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        self.unlink(idx);
        Some(idx)
    }
}

/// Least-recently-unpinned replacement policy.
///
/// The victim is always the frame that has been evictable for the longest.
/// Re-unpinning a frame that is already tracked does not refresh its position.
pub struct LruReplacer {
    /// Maximum number of frames tracked at once
    capacity: usize,
    list: Mutex<LruList>,
}

impl LruReplacer {
    /// Creates a replacer that tracks at most `capacity` frames,
    /// normally the buffer pool size.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            list: Mutex::new(LruList::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        self.list.lock().pop_back().map(FrameId::new)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut list = self.list.lock();
        if list.contains(frame_id.as_u32()) {
            list.unlink(frame_id.as_u32());
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        if frame_id == INVALID_FRAME_ID {
            return;
        }

        if frame_id.as_usize() >= self.capacity {
            warn!(
                "{} is outside the replacer's {} frames, not tracking it",
                frame_id, self.capacity
            );
            return;
        }

        let mut list = self.list.lock();
        if list.contains(frame_id.as_u32()) {
            return;
        }
        if list.len >= self.capacity {
            warn!(
                "replacer full ({} frames), not tracking {}",
                self.capacity, frame_id
            );
            return;
        }
        list.push_front(frame_id.as_u32());
    }

    fn size(&self) -> usize {
        self.list.lock().len
    }
}
