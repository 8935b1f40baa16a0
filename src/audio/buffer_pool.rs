// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Moves captured audio from the device callback to the analysis thread
// without allocating or locking on the callback side.
//
// Architecture:
// - DATA_QUEUE: capture thread pushes filled buffers, analysis thread consumes
// - POOL_QUEUE: analysis thread returns drained buffers, capture thread recycles
//
// Buffer flow:
// 1. Capture thread pops an empty buffer from POOL_QUEUE
// 2. Capture thread copies the first channel of the callback data into it
// 3. Capture thread pushes it to DATA_QUEUE
// 4. Analysis thread pops it, feeds the frame assembler, and pushes it back
//
// When POOL_QUEUE is empty the capture thread drops the callback data: the
// analysis side is behind and a dropped frame beats a blocked audio thread.

use rtrb::{Consumer, Producer};

/// Pool size used by the default capture configuration
pub const DEFAULT_BUFFER_COUNT: usize = 16;
/// Samples per buffer (one analysis frame) by default
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// Queue ends owned by the capture (device callback) thread
pub struct AudioThreadChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Queue ends owned by the analysis thread
pub struct AnalysisThreadChannels {
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
}

/// All four queue ends before they are handed to their threads
pub struct BufferPoolChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

impl BufferPoolChannels {
    /// Split into the halves owned by the capture and analysis threads
    pub fn split_for_threads(self) -> (AudioThreadChannels, AnalysisThreadChannels) {
        (
            AudioThreadChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            AnalysisThreadChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// # Example
/// ```ignore
/// let (mut audio, mut analysis) = BufferPool::new(16, 2048).split_for_threads();
///
/// // Capture thread
/// if let Ok(mut buffer) = audio.pool_consumer.pop() {
///     buffer.clear();
///     buffer.extend_from_slice(&samples);
///     let _ = audio.data_producer.push(buffer);
/// }
///
/// // Analysis thread
/// if let Ok(buffer) = analysis.data_consumer.pop() {
///     // process
///     let _ = analysis.pool_producer.push(buffer);
/// }
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create the queues and pre-allocate `buffer_count` buffers
    ///
    /// Both counts are raised to at least 1. Buffers start empty with
    /// `buffer_size` capacity, so filling up to that size never allocates.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        let buffer_count = buffer_count.max(1);
        let buffer_size = buffer_size.max(1);

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // The pool queue has exactly buffer_count slots, so every push fits
        for _ in 0..buffer_count {
            if pool_producer
                .push(Vec::with_capacity(buffer_size))
                .is_err()
            {
                break;
            }
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}
