//! Layer naming by operation history.

use sha2::{Digest, Sha256};

use super::operation::Operation;

/// Name of the layer produced by applying `op` on top of `parent`.
///
/// Hex SHA-256 over the parent name and the operation signature, separated
/// by a NUL byte. Because the parent name is itself a fingerprint, a layer's
/// name covers every operation back to the base image.
pub fn fingerprint(parent: &str, op: &Operation) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update([0u8]);
    hasher.update(op.signature().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let name = fingerprint("fedora-23", &Operation::RunCommand("echo hi".into()));
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_variant_is_part_of_identity() {
        let run = fingerprint("base", &Operation::RunCommand("true".into()));
        let cmd = fingerprint("base", &Operation::SetDefaultCommand("true".into()));
        assert_ne!(run, cmd);
    }

    #[test]
    fn test_separator_prevents_ambiguity() {
        // Moving text between parent and argument must change the name
        let a = fingerprint("ab", &Operation::RunCommand("c".into()));
        let b = fingerprint("a", &Operation::RunCommand("bc".into()));
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_deterministic(parent in "[a-z0-9-]{1,40}", args in ".{0,80}") {
            let op = Operation::RunCommand(args);
            prop_assert_eq!(fingerprint(&parent, &op), fingerprint(&parent, &op.clone()));
        }

        #[test]
        fn prop_parent_changes_name(
            p1 in "[a-f0-9]{8}",
            p2 in "[a-f0-9]{8}",
            args in "[ -~]{1,40}",
        ) {
            prop_assume!(p1 != p2);
            let op = Operation::SetEnvironment(args);
            prop_assert_ne!(fingerprint(&p1, &op), fingerprint(&p2, &op));
        }

        #[test]
        fn prop_argument_changes_name(a1 in "[ -~]{1,40}", a2 in "[ -~]{1,40}") {
            prop_assume!(a1 != a2);
            prop_assert_ne!(
                fingerprint("base", &Operation::RunCommand(a1)),
                fingerprint("base", &Operation::RunCommand(a2))
            );
        }
    }
}
