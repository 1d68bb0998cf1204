pub mod checks;

pub use checks::{
    classify_deref, classify_free, leaked_heap_roots, leaked_heap_roots_from, reachable_heap_roots,
    reachable_heap_roots_from, DerefOutcome, FreeOutcome,
};
