use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// One capture tick: a dB spectrum and the matching time-domain samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Capture time in milliseconds
    pub timestamp: u64,
    /// Frequency bins in dB (N values)
    pub frequency: Vec<f32>,
    /// Time-domain samples in [-1, 1] (M values)
    pub amplitude: Vec<f32>,
}

impl AudioFrame {
    pub fn new(timestamp: u64, frequency: Vec<f32>, amplitude: Vec<f32>) -> Self {
        Self {
            timestamp,
            frequency,
            amplitude,
        }
    }

    /// Parse one frame from its JSON wire form.
    pub fn from_json(line: &str) -> Result<Self, InputError> {
        serde_json::from_str(line).map_err(|e| InputError::Malformed(e.to_string()))
    }
}

/// Array sizes fixed for a capture session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameShape {
    pub bins: usize,
    pub samples: usize,
}

impl FrameShape {
    pub fn new(bins: usize, samples: usize) -> Self {
        Self { bins, samples }
    }

    /// Shape produced by an FFT of `fft_size` samples.
    pub fn from_fft_size(fft_size: usize) -> Self {
        Self::new(fft_size / 2, fft_size)
    }

    pub fn validate(&self, frame: &AudioFrame) -> Result<(), InputError> {
        if frame.frequency.len() != self.bins {
            return Err(InputError::WrongLength {
                field: "frequency",
                expected: self.bins,
                actual: frame.frequency.len(),
            });
        }
        if frame.amplitude.len() != self.samples {
            return Err(InputError::WrongLength {
                field: "amplitude",
                expected: self.samples,
                actual: frame.amplitude.len(),
            });
        }
        if let Some(index) = frame.frequency.iter().position(|v| !v.is_finite()) {
            return Err(InputError::NonFinite {
                field: "frequency",
                index,
            });
        }
        for (index, &value) in frame.amplitude.iter().enumerate() {
            if !value.is_finite() {
                return Err(InputError::NonFinite {
                    field: "amplitude",
                    index,
                });
            }
            if !(-1.0..=1.0).contains(&value) {
                return Err(InputError::OutOfRange { index, value });
            }
        }
        Ok(())
    }
}

/// Two fixed slots with an explicit hand-off: the producer fills the back
/// slot while readers see the front slot, then `swap` publishes it.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    slots: [T; 2],
    front: usize,
}

impl<T: Clone> DoubleBuffer<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slots: [initial.clone(), initial],
            front: 0,
        }
    }
}

impl<T> DoubleBuffer<T> {
    pub fn front(&self) -> &T {
        &self.slots[self.front]
    }

    pub fn back_mut(&mut self) -> &mut T {
        &mut self.slots[1 - self.front]
    }

    /// Borrow the published slot and the writable slot together.
    pub fn split(&mut self) -> (&T, &mut T) {
        let (a, b) = self.slots.split_at_mut(1);
        if self.front == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bins: usize, samples: usize) -> AudioFrame {
        AudioFrame::new(0, vec![-60.0; bins], vec![0.0; samples])
    }

    #[test]
    fn accepts_well_formed_frame() {
        let shape = FrameShape::from_fft_size(2048);
        assert_eq!(shape, FrameShape::new(1024, 2048));
        assert!(shape.validate(&frame(1024, 2048)).is_ok());
    }

    #[test]
    fn rejects_wrong_lengths() {
        let shape = FrameShape::new(8, 16);
        assert_eq!(
            shape.validate(&frame(7, 16)),
            Err(InputError::WrongLength {
                field: "frequency",
                expected: 8,
                actual: 7
            })
        );
        assert!(matches!(
            shape.validate(&frame(8, 15)),
            Err(InputError::WrongLength { field: "amplitude", .. })
        ));
    }

    #[test]
    fn rejects_nan_and_clipped_samples() {
        let shape = FrameShape::new(4, 4);
        let mut f = frame(4, 4);
        f.frequency[2] = f32::NAN;
        assert!(matches!(
            shape.validate(&f),
            Err(InputError::NonFinite { field: "frequency", index: 2 })
        ));

        let mut f = frame(4, 4);
        f.frequency[0] = f32::NEG_INFINITY;
        assert!(shape.validate(&f).is_err());

        let mut f = frame(4, 4);
        f.amplitude[3] = 1.5;
        assert!(matches!(
            shape.validate(&f),
            Err(InputError::OutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn parses_wire_json() {
        let f = AudioFrame::from_json(r#"{"timestamp":120,"frequency":[-40.0,-50.5],"amplitude":[0.1,-0.2]}"#)
            .unwrap();
        assert_eq!(f.timestamp, 120);
        assert_eq!(f.frequency, vec![-40.0, -50.5]);

        let err = AudioFrame::from_json(r#"{"timestamp":"soon","frequency":[],"amplitude":[]}"#);
        assert!(matches!(err, Err(InputError::Malformed(_))));
    }

    #[test]
    fn double_buffer_publishes_on_swap() {
        let mut buf = DoubleBuffer::new(vec![0u8; 2]);
        buf.back_mut()[0] = 7;
        assert_eq!(buf.front()[0], 0);
        buf.swap();
        assert_eq!(buf.front()[0], 7);

        let (front, back) = buf.split();
        back[1] = front[0] + 1;
        buf.swap();
        assert_eq!(buf.front()[1], 8);
    }
}
