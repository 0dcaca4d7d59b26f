//! Rune runtime facade.

pub use rune_config as config;
pub use rune_router as router;
