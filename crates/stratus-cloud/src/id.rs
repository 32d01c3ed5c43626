//! Composite entity ids (`instance:database`, `instance:account:privilege`)

use crate::error::{CloudError, Result};

pub const ID_SEPARATOR: char = ':';

/// Split `id` into exactly `parts` components.
pub fn parse_composite_id(id: &str, parts: usize) -> Result<Vec<&str>> {
    let split: Vec<&str> = id.split(ID_SEPARATOR).collect();
    if split.len() != parts || split.iter().any(|p| p.is_empty()) {
        return Err(CloudError::InvalidId {
            id: id.to_string(),
            expected: parts,
        });
    }
    Ok(split)
}

pub fn composite_id(parts: &[&str]) -> String {
    parts.join(":")
}
