use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Process-wide stop signal shared by the acceptor and every session.
///
/// Clones observe the same flag. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_signal() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();

        assert!(!observer.is_triggered());
        shutdown.trigger();
        assert!(observer.is_triggered());
    }
}
