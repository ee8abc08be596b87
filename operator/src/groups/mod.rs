pub mod reconcile;

pub use reconcile::{build_context, run};
