use super::SignalFilter;

/// Largest buffer a channel may ask for.
pub const MAX_MOVING_AVERAGE_DEPTH: usize = 40;

/// Arithmetic mean of the most recent `depth` samples.
///
/// Samples live in a ring buffer allocated once at construction. Until the
/// buffer is full the mean is taken over the samples received so far, so the
/// first outputs are not dragged towards zero.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: Vec<f32>,
    head: usize,
    count: usize,
    average: f32,
}

impl MovingAverage {
    /// `depth` is clamped to `1..=MAX_MOVING_AVERAGE_DEPTH`; config validation
    /// rejects anything outside that range before we get here.
    pub fn new(depth: usize) -> Self {
        let depth = depth.clamp(1, MAX_MOVING_AVERAGE_DEPTH);
        Self {
            samples: vec![0.0; depth],
            head: 0,
            count: 0,
            average: 0.0,
        }
    }

    pub fn depth(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_count(&self) -> usize {
        self.count
    }
}

impl SignalFilter for MovingAverage {
    fn update(&mut self, sample: f32) -> f32 {
        self.samples[self.head] = sample;
        self.head = (self.head + 1) % self.samples.len();
        if self.count < self.samples.len() {
            self.count += 1;
        }

        // Slots past `count` are still zero while filling, so summing all is fine
        let sum: f32 = self.samples.iter().sum();
        self.average = sum / self.count as f32;
        self.average
    }

    fn output(&self) -> f32 {
        self.average
    }

    fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.head = 0;
        self.count = 0;
        self.average = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_while_filling() {
        let mut filter = MovingAverage::new(5);
        assert_eq!(filter.update(10.0), 10.0);
        assert_eq!(filter.update(20.0), 15.0);
        assert_eq!(filter.update(30.0), 20.0);
        assert_eq!(filter.sample_count(), 3);
    }

    #[test]
    fn test_mean_of_most_recent_samples_once_full() {
        let mut filter = MovingAverage::new(3);
        for sample in [1.0, 2.0, 3.0, 4.0, 5.0] {
            filter.update(sample);
        }
        // only 3, 4 and 5 are still in the window
        assert_eq!(filter.output(), 4.0);
        assert_eq!(filter.sample_count(), 3);
    }

    #[test]
    fn test_signed_samples() {
        let mut filter = MovingAverage::new(4);
        filter.update(-150.0);
        assert_eq!(filter.update(50.0), -50.0);
    }

    #[test]
    fn test_depth_is_clamped() {
        assert_eq!(MovingAverage::new(0).depth(), 1);
        assert_eq!(MovingAverage::new(500).depth(), MAX_MOVING_AVERAGE_DEPTH);
    }

    #[test]
    fn test_reset_empties_buffer() {
        let mut filter = MovingAverage::new(2);
        filter.update(8.0);
        filter.update(8.0);
        filter.reset();
        assert_eq!(filter.sample_count(), 0);
        assert_eq!(filter.update(2.0), 2.0);
    }
}
