//! Utilities shared by Kiln tests.
//!
//! - [`ClassWriter`] synthesises compiled artifacts without a real compiler.
//! - [`fixture`] helpers lay out source and build trees on disk.

mod class_writer;
pub mod fixture;

pub use class_writer::{ClassWriter, MemberSpec};

/// Installs a test-friendly `tracing` subscriber once per process.
pub fn init_test_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
