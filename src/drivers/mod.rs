//! Hardware drivers.
//!
//! Each driver wraps one peripheral behind a small API and compiles to
//! either real ESP-IDF register access (`target_os = "espidf"`) or a
//! host-side simulation stub.

pub mod button;
pub mod hw_init;
pub mod servo;
