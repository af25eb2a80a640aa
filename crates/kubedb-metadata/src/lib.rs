pub mod api;
pub mod archiver;
pub mod defaults;
pub mod mongodb;
pub mod quantity;

pub use k8_types;

pub(crate) fn is_false(b: &bool) -> bool {
    !b
}
