//! Record identifier generation.

use std::fmt::Debug;

use uuid::Uuid;

/// Produces identifiers for records created without one.
///
/// The repository facade owns the generator; backends never synthesize
/// identifiers.
pub trait IdGenerator: Send + Sync + Debug {
    /// Returns a new identifier.
    fn generate(&self) -> String;
}

/// Random (version 4) UUIDs in hyphenated lower-case form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_generator_is_unique() {
        let generator = UuidGenerator;
        let ids: HashSet<String> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_uuid_format() {
        let id = UuidGenerator.generate();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(id, id.to_lowercase());
    }
}
