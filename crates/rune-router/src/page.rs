//! Page instances and their lifecycle state.
//!
//! Instances live in a generation-checked arena. Callbacks from the render tree or the
//! script engine carry a [`PageHandle`]; a handle whose page has been destroyed no longer
//! resolves, so late callbacks for a dead page are dropped instead of touching a new one.

use crate::host::PageCommands;
use crate::page_id::PageId;

/// Progress of a page instance, and of the navigation intent currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Resolving,
    ScriptLoading,
    CommandsReady,
    LeaveCheck,
    Transitioning,
    Visible,
    Hidden,
    Destroyed,
}

impl LifecycleState {
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        if self == Destroyed {
            return false;
        }
        if next == Destroyed || next == Idle {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Idle, LeaveCheck)
                | (Idle, Transitioning)
                | (Resolving, ScriptLoading)
                | (ScriptLoading, CommandsReady)
                | (CommandsReady, Transitioning)
                | (LeaveCheck, Resolving)
                | (LeaveCheck, Transitioning)
                | (Transitioning, Visible)
                | (Visible, Hidden)
                | (Visible, Transitioning)
                | (Hidden, Visible)
                | (Hidden, Transitioning)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Destroyed
    }
}

/// Why a page instance is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPurpose {
    Push,
    Replace,
    /// Realizing a record restored from a snapshot.
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
pub struct PageInstance {
    pub page_id: PageId,
    /// Resolved script path.
    pub url: String,
    pub params: String,
    pub purpose: LoadPurpose,
    pub is_main: bool,
    pub recoverable: bool,
    pub is_named_route: bool,
    pub state: LifecycleState,
    /// Command buffers flushed so far.
    pub fragments: usize,
    pub commands: Option<PageCommands>,
}

impl PageInstance {
    pub fn new(page_id: PageId, url: impl Into<String>, params: impl Into<String>, purpose: LoadPurpose) -> Self {
        Self {
            page_id,
            url: url.into(),
            params: params.into(),
            purpose,
            is_main: false,
            recoverable: true,
            is_named_route: false,
            state: LifecycleState::ScriptLoading,
            fragments: 0,
            commands: None,
        }
    }

    /// Moves to `next` if the transition is legal.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if self.state == next {
            return true;
        }
        if self.state.can_advance_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

struct Slot {
    generation: u32,
    page: Option<PageInstance>,
}

#[derive(Default)]
pub struct PageArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl PageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: PageInstance) -> PageHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.page = Some(page);
            return PageHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            page: Some(page),
        });
        PageHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: PageHandle) -> Option<&PageInstance> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.page.as_ref())
    }

    pub fn get_mut(&mut self, handle: PageHandle) -> Option<&mut PageInstance> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.page.as_mut())
    }

    /// Removes the instance and invalidates every outstanding handle to it.
    pub fn remove(&mut self, handle: PageHandle) -> Option<PageInstance> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let mut page = slot.page.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        page.state = LifecycleState::Destroyed;
        Some(page)
    }

    pub fn find(&self, page_id: PageId) -> Option<PageHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            slot.page
                .as_ref()
                .filter(|page| page.page_id == page_id)
                .map(|_| PageHandle {
                    index: index as u32,
                    generation: slot.generation,
                })
        })
    }

    pub fn remove_page(&mut self, page_id: PageId) -> Option<PageInstance> {
        let handle = self.find(page_id)?;
        self.remove(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.page.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: u32) -> PageInstance {
        PageInstance::new(PageId(id), format!("pages/p{id}.js"), "", LoadPurpose::Push)
    }

    #[test]
    fn stale_handles_do_not_resolve_after_slot_reuse() {
        let mut arena = PageArena::new();
        let first = arena.insert(page(0));
        let removed = arena.remove(first).unwrap();
        assert_eq!(removed.state, LifecycleState::Destroyed);

        let second = arena.insert(page(1));
        assert!(arena.get(first).is_none());
        assert!(arena.remove(first).is_none());
        assert_eq!(arena.get(second).map(|p| p.page_id), Some(PageId(1)));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn find_by_page_id() {
        let mut arena = PageArena::new();
        arena.insert(page(4));
        let handle = arena.insert(page(7));
        assert_eq!(arena.find(PageId(7)), Some(handle));
        assert!(arena.remove_page(PageId(4)).is_some());
        assert_eq!(arena.find(PageId(4)), None);
    }

    #[test]
    fn lifecycle_follows_the_push_path() {
        let mut instance = page(0);
        assert!(instance.advance(LifecycleState::CommandsReady));
        assert!(instance.advance(LifecycleState::Transitioning));
        assert!(instance.advance(LifecycleState::Visible));
        assert!(instance.advance(LifecycleState::Hidden));
        assert!(instance.advance(LifecycleState::Visible));
        assert!(instance.advance(LifecycleState::Destroyed));
        assert!(!instance.advance(LifecycleState::Visible));
    }

    #[test]
    fn illegal_jumps_are_refused() {
        let mut instance = page(0);
        assert!(!instance.advance(LifecycleState::Visible));
        assert_eq!(instance.state, LifecycleState::ScriptLoading);
        assert!(!LifecycleState::Resolving.can_advance_to(LifecycleState::Visible));
        assert!(LifecycleState::LeaveCheck.can_advance_to(LifecycleState::Idle));
        assert!(LifecycleState::Destroyed.is_terminal());
    }
}
