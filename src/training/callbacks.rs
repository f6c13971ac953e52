use crate::training::{EpochReport, TrainingState};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Training callback trait
///
/// Callbacks allow custom actions to be performed at various points during training.
pub trait TrainingCallback: Send + Sync {
    /// Called at the start of training
    fn on_train_begin(&mut self, _epochs: usize, _batches_per_epoch: usize) {}

    /// Called at the end of training
    fn on_train_end(&mut self, _state: &TrainingState) {}

    /// Called at the start of each epoch (1-based)
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    /// Called at the end of each epoch
    fn on_epoch_end(&mut self, _report: &EpochReport, _state: &TrainingState) {}

    /// Called after each gradient step
    fn on_batch_end(&mut self, _batch: usize, _loss: f64) {}
}

/// Callback manager that handles multiple callbacks
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackManager {
    /// Create new callback manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn add_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn on_train_begin(&mut self, epochs: usize, batches_per_epoch: usize) {
        for callback in &mut self.callbacks {
            callback.on_train_begin(epochs, batches_per_epoch);
        }
    }

    pub fn on_train_end(&mut self, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_train_end(state);
        }
    }

    pub fn on_epoch_begin(&mut self, epoch: usize) {
        for callback in &mut self.callbacks {
            callback.on_epoch_begin(epoch);
        }
    }

    pub fn on_epoch_end(&mut self, report: &EpochReport, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_epoch_end(report, state);
        }
    }

    pub fn on_batch_end(&mut self, batch: usize, loss: f64) {
        for callback in &mut self.callbacks {
            callback.on_batch_end(batch, loss);
        }
    }
}

/// Progress bar over all gradient steps of a run
#[derive(Default)]
pub struct ProgressBarCallback {
    bar: Option<ProgressBar>,
}

impl ProgressBarCallback {
    /// Create new progress bar callback
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingCallback for ProgressBarCallback {
    fn on_train_begin(&mut self, epochs: usize, batches_per_epoch: usize) {
        let bar = ProgressBar::new((epochs * batches_per_epoch) as u64);
        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} batches {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        self.bar = Some(bar);
    }

    fn on_epoch_begin(&mut self, epoch: usize) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("epoch {}", epoch));
        }
    }

    fn on_batch_end(&mut self, _batch: usize, loss: f64) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            if !loss.is_finite() {
                bar.set_message("non-finite loss");
            }
        }
    }

    fn on_train_end(&mut self, _state: &TrainingState) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Timer callback that tracks training time
#[derive(Default)]
pub struct TimerCallback {
    start_time: Option<Instant>,
    epoch_start: Option<Instant>,
    epoch_times: Vec<Duration>,
}

impl TimerCallback {
    /// Create new timer callback
    pub fn new() -> Self {
        Self::default()
    }

    /// Get average epoch time
    pub fn average_epoch_time(&self) -> Option<Duration> {
        if self.epoch_times.is_empty() {
            None
        } else {
            let total: Duration = self.epoch_times.iter().sum();
            Some(total / self.epoch_times.len() as u32)
        }
    }

    /// Get total training time
    pub fn total_time(&self) -> Option<Duration> {
        self.start_time.map(|t| t.elapsed())
    }

    /// Completed epochs timed so far
    pub fn epochs_timed(&self) -> usize {
        self.epoch_times.len()
    }
}

impl TrainingCallback for TimerCallback {
    fn on_train_begin(&mut self, _epochs: usize, _batches_per_epoch: usize) {
        self.start_time = Some(Instant::now());
        tracing::info!("Training started");
    }

    fn on_epoch_begin(&mut self, _epoch: usize) {
        self.epoch_start = Some(Instant::now());
    }

    fn on_epoch_end(&mut self, report: &EpochReport, _state: &TrainingState) {
        if let Some(start) = self.epoch_start.take() {
            let elapsed = start.elapsed();
            self.epoch_times.push(elapsed);
            tracing::debug!("Epoch {} completed in {:.2?}", report.epoch, elapsed);
        }
    }

    fn on_train_end(&mut self, state: &TrainingState) {
        if let Some(start) = self.start_time {
            tracing::info!(
                "Training completed in {:.2?} ({} epochs, {} steps)",
                start.elapsed(),
                state.epoch,
                state.global_step
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCallback {
        batches: Arc<AtomicUsize>,
    }

    impl TrainingCallback for CountingCallback {
        fn on_batch_end(&mut self, _batch: usize, _loss: f64) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn report(epoch: usize) -> EpochReport {
        EpochReport {
            epoch,
            cost: 0.5,
            metric: 0.7,
            batches: 3,
        }
    }

    #[test]
    fn test_timer_records_epochs() {
        let mut timer = TimerCallback::new();
        let state = TrainingState::new();

        timer.on_train_begin(2, 3);
        for epoch in 1..=2 {
            timer.on_epoch_begin(epoch);
            timer.on_epoch_end(&report(epoch), &state);
        }
        timer.on_train_end(&state);

        assert_eq!(timer.epochs_timed(), 2);
        assert!(timer.average_epoch_time().is_some());
        assert!(timer.total_time().is_some());
    }

    #[test]
    fn test_callback_manager() {
        let batches = Arc::new(AtomicUsize::new(0));
        let mut manager = CallbackManager::new();
        manager.add_callback(TimerCallback::new());
        manager.add_callback(ProgressBarCallback::new());
        manager.add_callback(CountingCallback {
            batches: Arc::clone(&batches),
        });
        assert_eq!(manager.len(), 3);

        let state = TrainingState::new();
        manager.on_train_begin(1, 2);
        manager.on_epoch_begin(1);
        manager.on_batch_end(0, 0.9);
        manager.on_batch_end(1, 0.8);
        manager.on_epoch_end(&report(1), &state);
        manager.on_train_end(&state);

        assert_eq!(batches.load(Ordering::SeqCst), 2);
    }
}
