//! UUID generation.

use uuid::Uuid;

/// Generates a new UUID v4, used for operation ids.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}
