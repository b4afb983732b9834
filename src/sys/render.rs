// src/sys/render.rs
//
// pgbouncer auth_file format: one `"principal" "secret"` line per role.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::sys::secrets::{CredentialRecord, CredentialSet};

/// Rendered userlist bytes. Contains password hashes, so the buffer is wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct RenderedArtifact {
    bytes: Vec<u8>,
}

impl RenderedArtifact {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for RenderedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderedArtifact([REDACTED {} bytes])", self.bytes.len())
    }
}

/// Renders the set into its canonical file content.
///
/// Lines are sorted by their full rendered text, never by input order, and the
/// output always ends with exactly one newline (an empty set renders as `"\n"`).
pub fn render(set: &CredentialSet) -> RenderedArtifact {
    let mut lines: Vec<String> = set.iter().map(render_line).collect();
    lines.sort_unstable();

    let mut body = lines.join("\n");
    body.push('\n');
    lines.zeroize();

    RenderedArtifact {
        bytes: body.into_bytes(),
    }
}

pub(crate) fn render_line(record: &CredentialRecord) -> String {
    record.use_secret(|secret| format!("{} {}", quote(record.principal()), quote(secret)))
}

// auth_file escapes an embedded double quote by doubling it.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set_of(pairs: &[(&str, &str)]) -> CredentialSet {
        CredentialSet::new(
            pairs
                .iter()
                .map(|(p, s)| CredentialRecord::new(*p, s.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_two_roles_render_exactly() {
        let out = render(&set_of(&[("alice", "pw1"), ("bob", "pw2")]));
        assert_eq!(out.as_bytes(), b"\"alice\" \"pw1\"\n\"bob\" \"pw2\"\n");
    }

    #[test]
    fn test_empty_set_renders_single_newline() {
        let out = render(&set_of(&[]));
        assert_eq!(out.as_bytes(), b"\n");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_sort_is_by_rendered_line() {
        // '!' (0x21) sorts before the closing '"' (0x22), so "a!" lands ahead of "a".
        let out = render(&set_of(&[("a", "y"), ("a!", "x")]));
        assert_eq!(out.as_bytes(), b"\"a!\" \"x\"\n\"a\" \"y\"\n");
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        let out = render(&set_of(&[("we\"ird", "p\"w")]));
        assert_eq!(out.as_bytes(), b"\"we\"\"ird\" \"p\"\"w\"\n");
    }

    #[test]
    fn test_debug_is_redacted() {
        let out = render(&set_of(&[("alice", "pw1")]));
        assert!(!format!("{:?}", out).contains("pw1"));
    }

    proptest! {
        #[test]
        fn prop_render_ignores_input_order(
            mut roles in proptest::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,24}", 0..16)
                .prop_map(|m| m.into_iter().collect::<Vec<(String, String)>>()),
            seed in any::<u64>(),
        ) {
            let build = |pairs: &[(String, String)]| {
                CredentialSet::new(pairs.iter().map(|(p, s)| CredentialRecord::new(p.clone(), s.clone())).collect())
            };
            let first = render(&build(&roles));
            let again = render(&build(&roles));
            prop_assert_eq!(first.as_bytes(), again.as_bytes());

            let len = roles.len().max(1);
            roles.rotate_left((seed as usize) % len);
            roles.reverse();
            let permuted = render(&build(&roles));
            prop_assert_eq!(first.as_bytes(), permuted.as_bytes());
            prop_assert!(first.as_bytes().ends_with(b"\n"));
            prop_assert!(!first.as_bytes().ends_with(b"\n\n"));
        }
    }
}
