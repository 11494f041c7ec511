//! ID generation utilities.

use ulid::Ulid;

/// Length of a ULID in its canonical text form.
const ULID_TEXT_LEN: usize = 26;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are:
    /// - Lexicographically sortable
    /// - Monotonically increasing within the same millisecond
    /// - Shorter than UUIDs when represented as strings
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Check that a string is a reference this generator could have produced.
    ///
    /// Accepts either case, since ULIDs are case-insensitive.
    #[must_use]
    pub fn is_well_formed(id: &str) -> bool {
        id.len() == ULID_TEXT_LEN && Ulid::from_string(id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_eq!(id2.len(), 26);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generated_ids_are_well_formed() {
        let id = IdGenerator::new().generate();
        assert!(IdGenerator::is_well_formed(&id));
        assert!(IdGenerator::is_well_formed(&id.to_uppercase()));
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert!(!IdGenerator::is_well_formed(""));
        assert!(!IdGenerator::is_well_formed("not-an-id"));
        assert!(!IdGenerator::is_well_formed("01hzx3k5m9n8p7q6r5s4t3v2w"));
        // 'u' is outside the Crockford alphabet
        assert!(!IdGenerator::is_well_formed("01hzx3k5m9n8p7q6r5s4t3v2wu"));
    }
}
