use crate::error::{HarnessError, Result};

/// One batch pulled from a stream: a `count x channels` sample matrix, one
/// source timestamp per sample, and a single local receive timestamp.
///
/// Empty chunks (count == 0) are valid. They still carry a receive time.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    samples: Vec<f32>, // row-major
    channel_count: usize,
    source_timestamps: Vec<f64>,
    receive_timestamp: f64,
}

impl Chunk {
    pub fn new(
        samples: Vec<f32>,
        channel_count: usize,
        source_timestamps: Vec<f64>,
        receive_timestamp: f64,
    ) -> Result<Self> {
        if samples.len() != source_timestamps.len() * channel_count {
            return Err(HarnessError::MalformedChunk {
                samples: samples.len(),
                timestamps: source_timestamps.len(),
                channels: channel_count,
            });
        }
        Ok(Self {
            samples,
            channel_count,
            source_timestamps,
            receive_timestamp,
        })
    }

    /// Chunk without sample values. Timing analysis only needs the clocks.
    pub fn from_timestamps(source_timestamps: Vec<f64>, receive_timestamp: f64) -> Self {
        Self {
            samples: Vec::new(),
            channel_count: 0,
            source_timestamps,
            receive_timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.source_timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_timestamps.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample values of row `index`, one per channel.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.channel_count;
        Some(&self.samples[start..start + self.channel_count])
    }

    pub fn source_timestamps(&self) -> &[f64] {
        &self.source_timestamps
    }

    pub fn receive_timestamp(&self) -> f64 {
        self.receive_timestamp
    }

    /// Per-sample receive times, assuming the chunk's receive time belongs to
    /// its last sample and the receive-to-source offset is constant within
    /// the chunk: `recv_i = recv - (ts_last - ts_i)`.
    pub fn reconstructed_receive_times(&self) -> Vec<f64> {
        match self.source_timestamps.last() {
            Some(&ts_last) => self
                .source_timestamps
                .iter()
                .map(|&ts| self.receive_timestamp - (ts_last - ts))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mismatched_matrix_is_rejected() {
        let result = Chunk::new(vec![0.0; 5], 2, vec![1.0, 2.0], 3.0);
        assert!(matches!(result, Err(HarnessError::MalformedChunk { samples: 5, .. })));
    }

    #[test]
    fn test_rows() {
        let chunk = Chunk::new(vec![1.0, 2.0, 3.0, 4.0], 2, vec![0.1, 0.2], 42.0).unwrap();
        assert_eq!(chunk.row(0), Some(&[1.0, 2.0][..]));
        assert_eq!(chunk.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(chunk.row(2), None);
    }

    #[test]
    fn test_reconstruction_anchors_last_sample() {
        let chunk = Chunk::from_timestamps(vec![1000.0, 1000.1], 1000.105);
        let recv = chunk.reconstructed_receive_times();
        assert_abs_diff_eq!(recv[0], 1000.005, epsilon = 1e-9);
        assert_abs_diff_eq!(recv[1], 1000.105, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_chunk_reconstructs_nothing() {
        let chunk = Chunk::from_timestamps(Vec::new(), 5.0);
        assert!(chunk.is_empty());
        assert!(chunk.reconstructed_receive_times().is_empty());
    }
}
