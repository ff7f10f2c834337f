//! Call-stack signatures
//!
//! A signature is a full string key built from the ordered
//! (image, function, address) tuples of a stack. Every field is length
//! prefixed, so the encoding is reversible and two different stacks can never
//! collide the way a hash could.

use crate::sample::StackFrame;
use std::fmt;
use std::fmt::Write as _;

/// Marker for an absent field; cannot be confused with a length prefix
const ABSENT: char = '~';

/// Deduplication key for an ordered list of stack frames
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallStackSignature(String);

impl CallStackSignature {
    /// Derive the signature of a stack
    ///
    /// Returns `None` for an empty stack; empty stacks never take part in
    /// stack aggregation.
    pub fn from_frames(frames: &[StackFrame]) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }

        let mut key = String::with_capacity(frames.len() * 48);
        for frame in frames {
            push_field(&mut key, frame.image());
            push_field(&mut key, frame.function());
            // Infallible for String
            let _ = write!(key, "@{:x};", frame.address());
        }
        Some(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallStackSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_field(key: &mut String, value: Option<&str>) {
    match value {
        Some(value) => {
            let _ = write!(key, "{}:{}", value.len(), value);
        }
        None => key.push(ABSENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> Vec<StackFrame> {
        vec![
            StackFrame::resolved("ntoskrnl.exe", "KiSwapContext", 0x10),
            StackFrame::resolved("chrome.dll", "base::WaitableEvent::Wait", 0x20),
            StackFrame::unresolved(Some("chrome.dll"), 0x30),
        ]
    }

    #[test]
    fn test_empty_stack_has_no_signature() {
        assert!(CallStackSignature::from_frames(&[]).is_none());
    }

    #[test]
    fn test_equal_stacks_equal_signatures() {
        let a = CallStackSignature::from_frames(&stack()).unwrap();
        let b = CallStackSignature::from_frames(&stack()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_address_difference_changes_signature() {
        let mut other = stack();
        other[2] = StackFrame::unresolved(Some("chrome.dll"), 0x31);
        assert_ne!(
            CallStackSignature::from_frames(&stack()),
            CallStackSignature::from_frames(&other)
        );
    }

    #[test]
    fn test_order_matters() {
        let mut reversed = stack();
        reversed.reverse();
        assert_ne!(
            CallStackSignature::from_frames(&stack()),
            CallStackSignature::from_frames(&reversed)
        );
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        // "ab" + "c" must differ from "a" + "bc"
        let a = vec![StackFrame::resolved("ab", "c", 0)];
        let b = vec![StackFrame::resolved("a", "bc", 0)];
        assert_ne!(
            CallStackSignature::from_frames(&a),
            CallStackSignature::from_frames(&b)
        );
    }

    #[test]
    fn test_missing_image_differs_from_empty_image() {
        let a = vec![StackFrame::unresolved(None, 1)];
        let b = vec![StackFrame::unresolved(Some(""), 1)];
        assert_ne!(
            CallStackSignature::from_frames(&a),
            CallStackSignature::from_frames(&b)
        );
    }

    #[test]
    fn test_resolved_differs_from_unresolved_at_same_address() {
        let a = vec![StackFrame::resolved("x.dll", "", 5)];
        let b = vec![StackFrame::unresolved(Some("x.dll"), 5)];
        assert_ne!(
            CallStackSignature::from_frames(&a),
            CallStackSignature::from_frames(&b)
        );
    }
}
