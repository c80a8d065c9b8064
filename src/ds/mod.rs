pub mod slot_arena;

pub use slot_arena::{ConcurrentSlotArena, SlotArena, SlotId};
