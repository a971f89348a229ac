// src/batch.rs
//
// Data-parallel batch execution for the wheel and vehicle passes. Each call
// maps one closure over a mutable output slice: slot i is written by exactly
// one worker, inputs are shared read-only, so the passes stay contention
// free. When the pool cannot be built (or the `parallel` feature is off) the
// same interface runs a plain sequential loop; a failed pool is a degraded
// tick, never a failed one.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub struct BatchExecutor {
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl BatchExecutor {
    /// `threads = 0` lets the pool pick its own width.
    pub fn new(threads: usize) -> Self {
        #[cfg(feature = "parallel")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("physics-batch-{i}"))
                .build();
            let pool = match pool {
                Ok(p) => Some(p),
                Err(e) => {
                    log::warn!("batch pool unavailable, running sequential: {e}");
                    None
                }
            };
            Self { pool }
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = threads;
            Self {}
        }
    }

    pub fn is_parallel(&self) -> bool {
        #[cfg(feature = "parallel")]
        {
            self.pool.is_some()
        }
        #[cfg(not(feature = "parallel"))]
        {
            false
        }
    }

    /// Run `f(i, &mut outputs[i])` for every index, joining before return.
    pub fn run<T, F>(&self, outputs: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            pool.install(|| {
                outputs
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, out)| f(i, out));
            });
            return;
        }

        for (i, out) in outputs.iter_mut().enumerate() {
            f(i, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_slot_is_written_exactly_once() {
        let exec = BatchExecutor::new(0);
        let mut outputs = vec![0u32; 256];
        exec.run(&mut outputs, |i, out| *out = i as u32 + 1);
        for (i, v) in outputs.iter().enumerate() {
            assert_eq!(*v, i as u32 + 1);
        }
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let exec = BatchExecutor::new(2);
        let inputs: Vec<f32> = (0..128).map(|i| i as f32 * 0.5).collect();

        let mut parallel = vec![0.0f32; 128];
        exec.run(&mut parallel, |i, out| *out = inputs[i].sqrt() + 1.0);

        let mut sequential = vec![0.0f32; 128];
        for (i, out) in sequential.iter_mut().enumerate() {
            *out = inputs[i].sqrt() + 1.0;
        }
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let exec = BatchExecutor::new(0);
        let mut outputs: Vec<u8> = Vec::new();
        exec.run(&mut outputs, |_, _| unreachable!());
    }
}
