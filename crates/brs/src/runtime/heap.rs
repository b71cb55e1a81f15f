use crate::components::Component;
use serde_json::json;
use std::collections::HashSet;
use ulid::Ulid;

/// Generational index into the heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SlotId {
    pub index: u32,
    pub generation: u32,
}

/// Identity of one run. Every heap gets a fresh one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a component owned by one run's heap. A handle never resolves
/// against the heap of another run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentRef {
    run: RunId,
    slot: SlotId,
}

impl ComponentRef {
    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

enum SlotState {
    Free,
    Occupied(Component),
    // Taken out while one of its methods runs
    Borrowed,
}

struct Slot {
    generation: u32,
    marked: bool,
    state: SlotState,
}

/// Allocations between automatic collections.
const COLLECTION_THRESHOLD: usize = 4096;

/// Per-run component storage. Dropping the heap releases every component of
/// the run, cycles included.
pub struct Heap {
    run: RunId,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
    allocated_since_collection: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            run: RunId::new(),
            slots: Vec::with_capacity(64),
            free_list: Vec::new(),
            live: 0,
            allocated_since_collection: 0,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run
    }

    pub fn alloc(&mut self, component: Component) -> ComponentRef {
        self.live += 1;
        self.allocated_since_collection += 1;
        let slot = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.state = SlotState::Occupied(component);
            SlotId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                marked: false,
                state: SlotState::Occupied(component),
            });
            SlotId {
                index,
                generation: 0,
            }
        };
        ComponentRef {
            run: self.run,
            slot,
        }
    }

    /// Checks run identity and generation.
    pub fn is_valid(&self, component: ComponentRef) -> bool {
        component.run == self.run
            && self
                .slots
                .get(component.slot.index as usize)
                .is_some_and(|slot| {
                    slot.generation == component.slot.generation
                        && !matches!(slot.state, SlotState::Free)
                })
    }

    fn slot(&self, component: ComponentRef) -> Option<&Slot> {
        if self.is_valid(component) {
            self.slots.get(component.slot.index as usize)
        } else {
            None
        }
    }

    fn slot_mut(&mut self, component: ComponentRef) -> Option<&mut Slot> {
        if self.is_valid(component) {
            self.slots.get_mut(component.slot.index as usize)
        } else {
            None
        }
    }

    pub fn get(&self, component: ComponentRef) -> Option<&Component> {
        match &self.slot(component)?.state {
            SlotState::Occupied(component) => Some(component),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, component: ComponentRef) -> Option<&mut Component> {
        match &mut self.slot_mut(component)?.state {
            SlotState::Occupied(component) => Some(component),
            _ => None,
        }
    }

    /// Moves a component out so it can be mutated alongside the heap.
    /// Must be paired with [`Heap::restore`].
    pub fn take(&mut self, component: ComponentRef) -> Option<Component> {
        let slot = self.slot_mut(component)?;
        match std::mem::replace(&mut slot.state, SlotState::Borrowed) {
            SlotState::Occupied(taken) => Some(taken),
            other => {
                slot.state = other;
                None
            }
        }
    }

    pub fn restore(&mut self, handle: ComponentRef, component: Component) {
        if let Some(slot) = self.slot_mut(handle)
            && matches!(slot.state, SlotState::Borrowed)
        {
            slot.state = SlotState::Occupied(component);
        }
    }

    pub fn free(&mut self, component: ComponentRef) {
        if let Some(slot) = self.slot_mut(component) {
            slot.generation += 1;
            slot.state = SlotState::Free;
            slot.marked = false;
            self.free_list.push(component.slot.index);
            self.live -= 1;
        }
    }

    /// Number of live components.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn should_collect(&self) -> bool {
        self.allocated_since_collection >= COLLECTION_THRESHOLD
    }

    /// Mark-and-sweep from `roots`. Returns the number of freed components.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ComponentRef>) -> usize {
        let mut pending: Vec<ComponentRef> = roots.into_iter().collect();
        while let Some(component) = pending.pop() {
            let Some(slot) = self.slot_mut(component) else {
                continue;
            };
            if slot.marked {
                continue;
            }
            slot.marked = true;
            if let SlotState::Occupied(component) = &slot.state {
                pending.extend(component.references());
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let unreachable = !slot.marked && matches!(slot.state, SlotState::Occupied(_));
            slot.marked = false;
            if unreachable {
                slot.generation += 1;
                slot.state = SlotState::Free;
                self.free_list.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        self.allocated_since_collection = 0;
        if freed > 0 {
            log::debug!("Collected {freed} unreachable components in run {}", self.run);
        }
        freed
    }

    /// JSON snapshot of a value, for results that outlive the run.
    pub fn snapshot(&self, value: &super::Value) -> serde_json::Value {
        self.snapshot_inner(value, &mut HashSet::new())
    }

    fn snapshot_inner(
        &self,
        value: &super::Value,
        visiting: &mut HashSet<ComponentRef>,
    ) -> serde_json::Value {
        use super::Value;
        match value {
            Value::Invalid => serde_json::Value::Null,
            Value::Boolean(value) => json!(value),
            Value::Integer(value) => json!(value),
            Value::Float(value) => json!(value),
            Value::String(text) => json!(text),
            Value::Object(handle) => {
                let Some(component) = self.get(*handle) else {
                    return json!("<released component>");
                };
                if !visiting.insert(*handle) {
                    return json!("<cycle>");
                }
                let snapshot = component.snapshot(|nested| self.snapshot_inner(nested, visiting));
                visiting.remove(handle);
                snapshot
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
