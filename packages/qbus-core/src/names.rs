//! Topic naming grammar.
//!
//! Two grammars over the same alphabet:
//!
//! - **Publication names** (request/publish targets): letters, digits, and
//!   the `.` segment separator. No wildcards — a publication always
//!   addresses one concrete subject.
//! - **Server names** (subscription patterns): additionally allow the
//!   single-token wildcard `*` and the tail wildcard `>`. A `>` must be the
//!   final character; nothing may follow it.

/// Returns true if `name` is a valid publication (request) name.
///
/// Valid characters are Unicode letters, digits, and `.`. The empty string
/// is not a valid name.
#[must_use]
pub fn is_valid_publication_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.')
}

/// Returns true if `name` is a valid server (subscription) name.
///
/// Server names extend the publication grammar with `*` and `>`; a `>`
/// terminates the name, so `a.>` is valid and `a.>.b` is not.
#[must_use]
pub fn is_valid_server_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut tail_seen = false;
    for c in name.chars() {
        if tail_seen {
            return false;
        }
        if !c.is_alphanumeric() && c != '.' && c != '*' && c != '>' {
            return false;
        }
        if c == '>' {
            tail_seen = true;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn plain_names_are_valid_everywhere() {
        for name in ["a", "a.b", "123", "orders.created.eu1"] {
            assert!(is_valid_publication_name(name), "{name}");
            assert!(is_valid_server_name(name), "{name}");
        }
    }

    #[test]
    fn empty_is_invalid() {
        assert!(!is_valid_publication_name(""));
        assert!(!is_valid_server_name(""));
    }

    #[test]
    fn dash_is_invalid_everywhere() {
        assert!(!is_valid_publication_name("a-b"));
        assert!(!is_valid_server_name("a-b"));
    }

    #[test]
    fn wildcards_are_server_only() {
        assert!(!is_valid_publication_name("a.*"));
        assert!(!is_valid_publication_name("a.>"));
        assert!(is_valid_server_name("a.*"));
        assert!(is_valid_server_name("a.*.b"));
        assert!(is_valid_server_name("a.>"));
        assert!(is_valid_server_name(">"));
    }

    #[test]
    fn tail_wildcard_must_be_last() {
        assert!(!is_valid_server_name("a.>.b"));
        assert!(!is_valid_server_name(">a"));
        assert!(!is_valid_server_name("a.>>"));
    }

    proptest! {
        /// Any non-empty ASCII alphanumeric-dot string satisfies both grammars.
        #[test]
        fn alphanumeric_dot_is_valid(name in "[a-zA-Z0-9.]{1,40}") {
            prop_assert!(is_valid_publication_name(&name));
            prop_assert!(is_valid_server_name(&name));
        }

        /// Inserting a character outside the alphabet invalidates both grammars.
        #[test]
        fn foreign_char_invalidates(
            name in "[a-zA-Z0-9.]{1,20}",
            bad in "[-_/ :,@#]",
            at in 0usize..20,
        ) {
            let at = at.min(name.len());
            let mut mutated = name.clone();
            mutated.insert_str(at, &bad);
            prop_assert!(!is_valid_publication_name(&mutated));
            prop_assert!(!is_valid_server_name(&mutated));
        }
    }
}
