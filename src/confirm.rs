//! Majority confirmation of noisy decode candidates.
//!
//! - `ConfirmationWindow`: bounded ring buffer of the most recent codes.
//! - `ScanConfirmationFilter`: accepts a code once it fills `threshold` slots
//!   of the window.
//!
//! Acceptance is checked after every push, so the first code to reach the
//! threshold wins.

use std::collections::VecDeque;

use crate::config::ConfirmationSettings;

/// Hard cap on the window size accepted from configuration.
pub const MAX_WINDOW: usize = 64;

/// The single accepted barcode value of a scan session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScanResult {
    pub code: String,
}

/// Bounded ring buffer of recent codes, oldest evicted first.
#[derive(Clone, Debug)]
pub struct ConfirmationWindow {
    buffer: VecDeque<String>,
    capacity: usize,
}

impl ConfirmationWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_WINDOW);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a code. Evicts the oldest entry when full.
    pub fn push(&mut self, code: String) {
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(code);
    }

    /// Occurrences of `code` within the window.
    pub fn frequency(&self, code: &str) -> usize {
        self.buffer.iter().filter(|entry| entry.as_str() == code).count()
    }

    /// Per-code counts, in order of first appearance.
    pub fn frequencies(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for entry in &self.buffer {
            match counts.iter_mut().find(|(code, _)| code == entry) {
                Some((_, count)) => *count += 1,
                None => counts.push((entry.clone(), 1)),
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.buffer.iter().map(String::as_str)
    }
}

/// Turns a stream of decode candidates into at most one trusted code.
#[derive(Clone, Debug)]
pub struct ScanConfirmationFilter {
    window: ConfirmationWindow,
    threshold: usize,
}

impl ScanConfirmationFilter {
    pub fn new(settings: &ConfirmationSettings) -> Self {
        let window = ConfirmationWindow::new(settings.window);
        let threshold = settings.threshold.clamp(1, window.capacity());
        Self { window, threshold }
    }

    /// Record one candidate; returns the code once it reaches the threshold.
    pub fn observe(&mut self, code: &str) -> Option<ScanResult> {
        self.window.push(code.to_string());
        // Only the code just pushed can have newly reached the threshold.
        if self.window.frequency(code) >= self.threshold {
            Some(ScanResult {
                code: code.to_string(),
            })
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn window(&self) -> &ConfirmationWindow {
        &self.window
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for ScanConfirmationFilter {
    fn default() -> Self {
        Self::new(&ConfirmationSettings::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
