use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hard cap on retained output
pub const MAX_OUTPUT_BUFFER: usize = 100 * 1024;
/// Size the buffer is cut back to once the cap is exceeded
pub const TRIMMED_OUTPUT_BUFFER: usize = 50 * 1024;

/// Bounded byte log of a session's output, shared between the reader task and
/// whoever renders it.
#[derive(Clone, Debug, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes`, keeping only the newest `TRIMMED_OUTPUT_BUFFER` bytes
    /// whenever the total would pass `MAX_OUTPUT_BUFFER`.
    pub fn append(&self, bytes: &[u8]) {
        let mut buffer = self.lock();
        buffer.extend_from_slice(bytes);
        if buffer.len() > MAX_OUTPUT_BUFFER {
            let excess = buffer.len() - TRIMMED_OUTPUT_BUFFER;
            buffer.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // a panic while holding the lock cannot leave the Vec half-written
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn small_appends_are_kept_verbatim() {
        let buffer = OutputBuffer::new();
        buffer.append(b"hello ");
        buffer.append(b"world");
        assert_eq!(buffer.snapshot(), b"hello world");
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn overflow_keeps_newest_half() {
        let buffer = OutputBuffer::new();
        buffer.append(&vec![b'a'; MAX_OUTPUT_BUFFER]);
        assert_eq!(buffer.len(), MAX_OUTPUT_BUFFER);

        buffer.append(b"xyz");
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), TRIMMED_OUTPUT_BUFFER);
        assert!(snapshot.ends_with(b"aaxyz"));
    }

    #[test]
    fn random_appends_never_exceed_cap_and_keep_the_tail() {
        let mut rng = rand::thread_rng();
        let buffer = OutputBuffer::new();
        let mut everything = Vec::new();

        for _ in 0..500 {
            let len = rng.gen_range(0..40 * 1024);
            let chunk: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            buffer.append(&chunk);
            everything.extend_from_slice(&chunk);

            let snapshot = buffer.snapshot();
            assert!(snapshot.len() <= MAX_OUTPUT_BUFFER);
            assert!(everything.ends_with(&snapshot));
            if everything.len() > MAX_OUTPUT_BUFFER {
                assert!(snapshot.len() >= TRIMMED_OUTPUT_BUFFER.min(chunk.len()));
            }
        }
    }

    #[test]
    fn concurrent_appends_stay_bounded() {
        let buffer = OutputBuffer::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        buffer.append(&[i as u8; 1024]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let len = buffer.len();
        assert!(len <= MAX_OUTPUT_BUFFER);
        assert!(len >= TRIMMED_OUTPUT_BUFFER);
    }
}
