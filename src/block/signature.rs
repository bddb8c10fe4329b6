//! Deferred signatures (spec.md §4.2, §9): "Signing is deferred: updates
//! record a thunk that will sign asynchronously; readers block on the
//! thunk's value. This lets multiple mutations batch their signatures."
//!
//! Mapped per spec.md §9's guidance ("Replace with explicit futures: store
//! a handle that signs on first observation; document that observing is a
//! suspension point") to a memoizing thunk over a closure, rather than a
//! literal `std::future::Future` — the crate's scheduling model (§5) is a
//! cooperative loop with explicit suspension points, not an async runtime,
//! so the thunk's `resolve()` is itself the documented suspension point.

use std::sync::Mutex;

/// A signature that is computed lazily, at most once, the first time it is
/// observed.
pub struct SignatureThunk {
    inner: Mutex<ThunkState>,
}

enum ThunkState {
    Pending(Box<dyn FnOnce() -> Vec<u8> + Send>),
    Resolved(Vec<u8>),
    /// Placeholder swapped in while the closure runs, so a thunk can never
    /// be invoked twice even if `resolve` is called concurrently from two
    /// threads racing on the same mutex (the second blocks on the mutex,
    /// not on a second signing operation).
    InProgress,
}

impl SignatureThunk {
    /// Defer `sign` until the first call to [`resolve`].
    pub fn new<F>(sign: F) -> Self
    where
        F: FnOnce() -> Vec<u8> + Send + 'static,
    {
        SignatureThunk {
            inner: Mutex::new(ThunkState::Pending(Box::new(sign))),
        }
    }

    /// Resolve the thunk, signing on first observation. This is a
    /// suspension point: it may perform real cryptographic work.
    pub fn resolve(&self) -> Vec<u8> {
        let mut guard = self.inner.lock().expect("signature thunk poisoned");
        let state = std::mem::replace(&mut *guard, ThunkState::InProgress);
        match state {
            ThunkState::Resolved(sig) => {
                *guard = ThunkState::Resolved(sig.clone());
                sig
            }
            ThunkState::Pending(sign) => {
                let sig = sign();
                *guard = ThunkState::Resolved(sig.clone());
                sig
            }
            ThunkState::InProgress => {
                unreachable!("resolve() re-entered while signing the same thunk")
            }
        }
    }

    /// Already-resolved value, without forcing computation.
    pub fn peek(&self) -> Option<Vec<u8>> {
        match &*self.inner.lock().expect("signature thunk poisoned") {
            ThunkState::Resolved(sig) => Some(sig.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let thunk = SignatureThunk::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            vec![1, 2, 3]
        });

        assert_eq!(thunk.peek(), None);
        assert_eq!(thunk.resolve(), vec![1, 2, 3]);
        assert_eq!(thunk.resolve(), vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
